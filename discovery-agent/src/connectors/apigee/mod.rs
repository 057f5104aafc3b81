//! Apigee Edge listing endpoints.
//!
//! [`ApigeeClient`] is the HTTP [`PageFetcher`](crate::poller::PageFetcher),
//! [`Endpoints`] builds the listing URLs of one organization and the
//! `*Kind` types map listing items onto catalog records.

pub mod api;
pub mod config;
pub mod transformer;

pub use api::ApigeeClient;
pub use config::Endpoints;
pub use transformer::{ApiDocKind, PortalKind, ProductKind, ProxyKind, SpecKind};
