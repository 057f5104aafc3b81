// Discovered asset model, diffing and selection filters
pub mod catalog;

// Configuration loading and validation
pub mod config;

// Bearer credential cache and refresh
pub mod credentials;

// Error classification
pub mod error;

// Readiness latches between jobs
pub mod gate;

pub use catalog::{CatalogAction, RecordKind, RemoteRecord};
pub use config::DiscoveryConfig;
pub use credentials::{Credential, CredentialManager};
pub use error::{SyncError, SyncResult};
pub use gate::ReadinessGate;
