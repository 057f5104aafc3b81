//! Error classification for discovery cycles.
//!
//! Every failure a poll cycle can hit maps onto one of these kinds. Only
//! [`SyncError::ConfigurationInvalid`] is fatal, and only at startup; the rest
//! fail the current cycle and leave the job scheduled.

use thiserror::Error;

/// Result alias used across the discovery core.
pub type SyncResult<T> = Result<T, SyncError>;

/// Classified discovery error.
///
/// `Clone` so that a single in-flight credential refresh can hand the same
/// outcome to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A required setting is missing or unusable
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// The credential exchange failed or was rejected
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// Network error or non-success status while fetching a page
    #[error("transient fetch failure: {0}")]
    TransientFetchFailure(String),

    /// The remote answered with a payload we cannot interpret
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Shutdown was requested at a cooperative checkpoint
    #[error("cancelled")]
    Cancelled,
}

impl SyncError {
    /// True for the errors that abort a single cycle but keep the job scheduled.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SyncError::ConfigurationInvalid(_) | SyncError::Cancelled)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::MalformedResponse(err.to_string())
        } else {
            SyncError::TransientFetchFailure(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::MalformedResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(SyncError::AuthFailure("x".into()).is_recoverable());
        assert!(SyncError::TransientFetchFailure("x".into()).is_recoverable());
        assert!(SyncError::MalformedResponse("x".into()).is_recoverable());
        assert!(!SyncError::ConfigurationInvalid("x".into()).is_recoverable());
        assert!(!SyncError::Cancelled.is_recoverable());
    }

    #[test]
    fn test_json_error_is_malformed() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(SyncError::from(err), SyncError::MalformedResponse(_)));
    }

    #[test]
    fn test_display() {
        let err = SyncError::ConfigurationInvalid("url is not configured".into());
        assert_eq!(err.to_string(), "invalid configuration: url is not configured");
    }
}
