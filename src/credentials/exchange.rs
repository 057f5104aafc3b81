//! Token exchange against the Apigee OAuth endpoint.

use super::GrantType;
use crate::config::AuthConfig;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde::Deserialize;

/// Apigee token response
#[derive(Deserialize, Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub jti: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// What the exchange is asked to trade for a new token.
#[derive(Clone)]
pub enum TokenGrant {
    Password { username: String, password: String },
    RefreshToken(String),
}

impl TokenGrant {
    pub fn grant_type(&self) -> GrantType {
        match self {
            TokenGrant::Password { .. } => GrantType::Password,
            TokenGrant::RefreshToken(_) => GrantType::RefreshToken,
        }
    }

    fn form(&self) -> Vec<(&'static str, &str)> {
        match self {
            TokenGrant::Password { username, password } => vec![
                ("grant_type", GrantType::Password.as_str()),
                ("username", username.as_str()),
                ("password", password.as_str()),
            ],
            TokenGrant::RefreshToken(token) => vec![
                ("grant_type", GrantType::RefreshToken.as_str()),
                ("refresh_token", token.as_str()),
            ],
        }
    }
}

/// Trades a grant for a token response.
///
/// Implementations report a refused grant (HTTP 4xx) as
/// [`SyncError::AuthFailure`] and an unreachable or failing endpoint as
/// [`SyncError::TransientFetchFailure`].
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, grant: &TokenGrant) -> SyncResult<TokenResponse>;
}

/// HTTP token endpoint (`https://login.apigee.com/oauth/token`).
///
/// Authenticates the OAuth client with HTTP Basic and posts the grant as a
/// form body.
pub struct ApigeeTokenEndpoint {
    http_client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl ApigeeTokenEndpoint {
    pub fn new(token_url: String, client_id: String, client_secret: String) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            token_url,
            client_id,
            client_secret,
        }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(
            auth.token_url.clone(),
            auth.client_id.clone(),
            auth.client_secret.clone(),
        )
    }
}

#[async_trait]
impl TokenExchange for ApigeeTokenEndpoint {
    async fn exchange(&self, grant: &TokenGrant) -> SyncResult<TokenResponse> {
        tracing::debug!(
            grant_type = %grant.grant_type(),
            "Requesting token from {}",
            self.token_url
        );

        let response = self
            .http_client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("Accept", "application/json")
            .form(&grant.form())
            .send()
            .await
            .map_err(|e| {
                SyncError::TransientFetchFailure(format!("token request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            let message = format!("token endpoint returned {}: {}", status, body);
            return Err(if status.is_client_error() {
                SyncError::AuthFailure(message)
            } else {
                SyncError::TransientFetchFailure(message)
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| SyncError::MalformedResponse(format!("token response: {}", e)))
    }
}
