//! Apigee discovery agent - Scheduled, dependency-ordered catalog sync.
//!
//! This crate runs the recurring jobs that list Apigee proxies, specs,
//! products, portals and API docs, and turns every change into a catalog
//! action for a downstream consumer.
//!
//! # Architecture
//!
//! ```text
//!   JobScheduler (one task per job, own interval)
//!          ↓  gates done?
//! ┌─────────────────────────────────────────┐
//! │       PollJob<K>                         │
//! │  - current_token() from the             │
//! │    CredentialManager                     │
//! │  - Poller<K> follows page cursors        │
//! │  - SyncDiff against last cycle           │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       Reconciler                         │
//! │  - cross-links from CatalogIndex         │
//! │  - selection filters                     │
//! │  - create / update / delete actions      │
//! └─────────────────────────────────────────┘
//!          ↓
//!   CatalogConsumer        first success → ReadinessGate flipped
//! ```
//!
//! # Core Types
//!
//! - [`Job`] - Trait every scheduled job implements
//! - [`JobScheduler`] - Interval loop with readiness gating
//! - [`Poller`] - Paginated listing over a [`ResourceKind`]
//! - [`Reconciler`] - Diff to catalog actions
//! - [`DiscoveryManager`] - Starts, inspects and stops all jobs
//!
//! # Running discovery
//!
//! ```no_run
//! use apigee_discovery::{CredentialManager, DiscoveryConfig};
//! use discovery_agent::connectors::apigee::ApigeeClient;
//! use discovery_agent::jobs::ProxyValidator;
//! use discovery_agent::registry::{build, Wiring};
//! use discovery_agent::LoggingConsumer;
//! use std::sync::Arc;
//!
//! # async fn run(config: DiscoveryConfig) -> anyhow::Result<()> {
//! let wiring = Wiring {
//!     credentials: CredentialManager::from_config(&config.auth),
//!     fetcher: Arc::new(ApigeeClient::new()),
//!     consumer: Arc::new(LoggingConsumer),
//!     register_validator: Arc::new(|validator: ProxyValidator| {
//!         println!("orders discovered: {}", validator.is_discovered("orders"));
//!     }),
//! };
//!
//! let mut discovery = build(&config, wiring)?;
//! discovery.manager.start();
//! tokio::signal::ctrl_c().await?;
//! discovery.manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod job;
pub mod connectors;
pub mod consumer;
pub mod jobs;
pub mod manager;
pub mod poller;
pub mod reconciler;
pub mod registry;
pub mod runners;

// Re-export public types
pub use consumer::{CatalogConsumer, ChannelConsumer, LoggingConsumer};
pub use job::{Job, JobState, JobStatus};
pub use manager::{DiscoveryManager, JobTopology};
pub use poller::{PageFetcher, Poller, ResourceKind};
pub use reconciler::{Reconciler, Reconciliation};
pub use runners::scheduler::JobScheduler;
