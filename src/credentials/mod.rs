//! Bearer credential handling for the Apigee management and data APIs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CredentialManager                  │
//! │  - current_token() accessor              │
//! │  - single-flight refresh                 │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (grant)              (token response)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       TokenExchange                      │
//! │  - password grant (initial login)        │
//! │  - refresh_token grant (renewal)         │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use apigee_discovery::config::AuthConfig;
//! use apigee_discovery::credentials::CredentialManager;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let auth = AuthConfig {
//!     username: "user@example.com".to_string(),
//!     password: "secret".to_string(),
//!     ..AuthConfig::default()
//! };
//! let manager = CredentialManager::from_config(&auth);
//!
//! // Logs in on first use, refreshes shortly before expiry afterwards
//! let token = manager.current_token().await?;
//! println!("Bearer {}", token);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

mod exchange;
mod manager;

pub use exchange::{ApigeeTokenEndpoint, TokenExchange, TokenGrant, TokenResponse};
pub use manager::{CredentialManager, REFRESH_MARGIN_SECS};

/// OAuth grant used to obtain a credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Username/password login
    Password,
    /// Renewal with the stored refresh token
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::Password => "password",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The bearer credential currently in use.
///
/// Replaced wholesale on refresh, never mutated in place.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token sent on every API request
    pub access_token: String,

    /// Token kind reported by the endpoint (normally "bearer")
    pub token_type: String,

    /// Used to renew the access token without the password
    pub refresh_token: Option<String>,

    /// When the access token expires (UTC); `None` when the endpoint did not say
    pub expires_at: Option<DateTime<Utc>>,

    /// Scope granted by the endpoint
    pub scope: Option<String>,
}

impl Credential {
    /// Build a credential from a token response received at `now`.
    ///
    /// Keeps `previous_refresh` when the endpoint did not rotate the refresh token.
    pub fn from_response(
        response: TokenResponse,
        previous_refresh: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            refresh_token: response.refresh_token.or(previous_refresh),
            expires_at: response.expires_in.map(|secs| now + Duration::seconds(secs)),
            scope: response.scope,
        }
    }

    /// True when the token is expired or will be within `margin` of `now`.
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now + margin,
            None => false,
        }
    }
}

// Tokens never reach the logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token_type", &self.token_type)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
