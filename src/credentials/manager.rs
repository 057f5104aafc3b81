//! Owner of the single bearer credential shared by every discovery job.

use super::exchange::{ApigeeTokenEndpoint, TokenExchange, TokenGrant};
use super::Credential;
use crate::config::AuthConfig;
use crate::error::{SyncError, SyncResult};
use chrono::{Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Refresh this many seconds before the token actually expires.
pub const REFRESH_MARGIN_SECS: i64 = 90;

type RefreshFlight = Shared<BoxFuture<'static, SyncResult<Arc<Credential>>>>;

/// Thread-safe credential cache with single-flight refresh.
///
/// - `current_token()` returns a token that is not within the refresh margin
///   of expiry, logging in or refreshing first when needed
/// - Only one exchange is ever in flight; concurrent callers await it and
///   share its outcome
/// - A failed exchange leaves the previous credential in place
/// - A refused `refresh_token` grant makes the next exchange use the password
///
/// Cloning is cheap and every clone shares the same cache.
#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<Inner>,
}

struct Inner {
    exchange: Arc<dyn TokenExchange>,
    username: String,
    password: String,
    margin: Duration,
    /// Swapped as a whole `Arc`, so readers never see a half-written credential
    current: RwLock<Option<Arc<Credential>>>,
    /// Set when the API rejected the current token before its expiry
    force_refresh: AtomicBool,
    /// Set when the endpoint refused the stored refresh token
    refresh_rejected: AtomicBool,
    inflight: Mutex<Option<(u64, RefreshFlight)>>,
    next_flight: AtomicU64,
    exchange_count: AtomicU64,
}

impl CredentialManager {
    /// Creates a manager that logs in with `username`/`password` on first use.
    pub fn new(exchange: Arc<dyn TokenExchange>, username: String, password: String) -> Self {
        Self::with_margin(
            exchange,
            username,
            password,
            Duration::seconds(REFRESH_MARGIN_SECS),
        )
    }

    /// Same as [`CredentialManager::new`] with a custom refresh margin.
    pub fn with_margin(
        exchange: Arc<dyn TokenExchange>,
        username: String,
        password: String,
        margin: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                exchange,
                username,
                password,
                margin,
                current: RwLock::new(None),
                force_refresh: AtomicBool::new(false),
                refresh_rejected: AtomicBool::new(false),
                inflight: Mutex::new(None),
                next_flight: AtomicU64::new(0),
                exchange_count: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a manager backed by the configured Apigee token endpoint.
    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(
            Arc::new(ApigeeTokenEndpoint::from_config(auth)),
            auth.username.clone(),
            auth.password.clone(),
        )
    }

    /// Installs a credential obtained elsewhere (e.g. restored at startup).
    pub async fn seed(&self, credential: Credential) {
        *self.inner.current.write().await = Some(Arc::new(credential));
        self.inner.force_refresh.store(false, Ordering::SeqCst);
    }

    /// Returns the cached credential without refreshing it.
    pub async fn current(&self) -> Option<Arc<Credential>> {
        self.inner.current.read().await.clone()
    }

    /// Number of token exchanges attempted so far.
    pub fn exchange_count(&self) -> u64 {
        self.inner.exchange_count.load(Ordering::SeqCst)
    }

    /// Forces the next `current_token()` call to refresh.
    ///
    /// Called when the API answers 401 for a token we still considered valid.
    /// The credential itself stays cached so its refresh token can be used.
    pub fn mark_expired(&self) {
        self.inner.force_refresh.store(true, Ordering::SeqCst);
    }

    /// Returns a valid bearer token, refreshing first when needed.
    ///
    /// # Errors
    /// [`SyncError::AuthFailure`] when the exchange fails. The caller decides
    /// whether and when to retry.
    pub async fn current_token(&self) -> SyncResult<String> {
        if let Some(credential) = self.fresh_credential().await {
            return Ok(credential.access_token.clone());
        }

        let (flight_id, flight) = {
            let mut slot = self.inner.inflight.lock().await;

            // Another caller may have finished a refresh while we waited
            if let Some(credential) = self.fresh_credential().await {
                return Ok(credential.access_token.clone());
            }

            match slot.as_ref() {
                Some((id, flight)) => (*id, flight.clone()),
                None => {
                    let id = self.inner.next_flight.fetch_add(1, Ordering::SeqCst);
                    let inner = Arc::clone(&self.inner);
                    let flight = async move { inner.refresh().await }.boxed().shared();
                    *slot = Some((id, flight.clone()));
                    (id, flight)
                }
            }
        };

        let outcome = flight.await;

        {
            let mut slot = self.inner.inflight.lock().await;
            if matches!(slot.as_ref(), Some((id, _)) if *id == flight_id) {
                *slot = None;
            }
        }

        outcome.map(|credential| credential.access_token.clone())
    }

    async fn fresh_credential(&self) -> Option<Arc<Credential>> {
        if self.inner.force_refresh.load(Ordering::SeqCst) {
            return None;
        }
        let current = self.inner.current.read().await;
        current
            .as_ref()
            .filter(|c| !c.expires_within(self.inner.margin, Utc::now()))
            .cloned()
    }
}

impl Inner {
    /// Performs one exchange and installs its result.
    async fn refresh(self: Arc<Self>) -> SyncResult<Arc<Credential>> {
        let previous = self.current.read().await.clone();
        let previous_refresh = previous.as_ref().and_then(|c| c.refresh_token.clone());

        let grant = match &previous_refresh {
            Some(token) if !self.refresh_rejected.load(Ordering::SeqCst) => {
                TokenGrant::RefreshToken(token.clone())
            }
            _ => TokenGrant::Password {
                username: self.username.clone(),
                password: self.password.clone(),
            },
        };

        info!(grant_type = %grant.grant_type(), "Refreshing Apigee access token");
        self.exchange_count.fetch_add(1, Ordering::SeqCst);

        match self.exchange.exchange(&grant).await {
            Ok(response) => {
                let credential = Arc::new(Credential::from_response(
                    response,
                    previous_refresh,
                    Utc::now(),
                ));
                *self.current.write().await = Some(Arc::clone(&credential));
                self.force_refresh.store(false, Ordering::SeqCst);
                self.refresh_rejected.store(false, Ordering::SeqCst);

                info!(
                    grant_type = %grant.grant_type(),
                    expires_at = ?credential.expires_at,
                    "Apigee access token refreshed"
                );
                Ok(credential)
            }
            Err(e) => {
                if matches!(grant, TokenGrant::RefreshToken(_))
                    && matches!(e, SyncError::AuthFailure(_))
                {
                    self.refresh_rejected.store(true, Ordering::SeqCst);
                    warn!("Refresh token rejected, next attempt will use the password grant");
                }
                warn!(grant_type = %grant.grant_type(), error = %e, "Token refresh failed");

                Err(match e {
                    SyncError::AuthFailure(_) => e,
                    other => SyncError::AuthFailure(other.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{GrantType, TokenResponse};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Exchange double that records every grant and answers from a script.
    struct ScriptedExchange {
        grants: StdMutex<Vec<GrantType>>,
        fail_with: StdMutex<Option<SyncError>>,
        delay: std::time::Duration,
        expires_in: i64,
    }

    impl ScriptedExchange {
        fn new() -> Self {
            Self {
                grants: StdMutex::new(Vec::new()),
                fail_with: StdMutex::new(None),
                delay: std::time::Duration::ZERO,
                expires_in: 3600,
            }
        }

        fn grants(&self) -> Vec<GrantType> {
            self.grants.lock().unwrap().clone()
        }

        fn fail_next(&self, err: SyncError) {
            *self.fail_with.lock().unwrap() = Some(err);
        }
    }

    #[async_trait]
    impl TokenExchange for ScriptedExchange {
        async fn exchange(&self, grant: &TokenGrant) -> SyncResult<TokenResponse> {
            let n = {
                let mut grants = self.grants.lock().unwrap();
                grants.push(grant.grant_type());
                grants.len()
            };
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(err) = self.fail_with.lock().unwrap().take() {
                return Err(err);
            }
            Ok(TokenResponse {
                access_token: format!("token-{}", n),
                token_type: "bearer".to_string(),
                refresh_token: Some(format!("refresh-{}", n)),
                expires_in: Some(self.expires_in),
                scope: None,
                jti: None,
            })
        }
    }

    fn manager(exchange: Arc<ScriptedExchange>) -> CredentialManager {
        CredentialManager::new(exchange, "user".to_string(), "pass".to_string())
    }

    fn expired_credential() -> Credential {
        Credential {
            access_token: "stale".to_string(),
            token_type: "bearer".to_string(),
            refresh_token: Some("stored-refresh".to_string()),
            expires_at: Some(Utc::now() - Duration::seconds(1)),
            scope: None,
        }
    }

    #[tokio::test]
    async fn test_first_call_uses_password_grant() {
        let exchange = Arc::new(ScriptedExchange::new());
        let manager = manager(Arc::clone(&exchange));

        assert_eq!(manager.current_token().await.unwrap(), "token-1");
        assert_eq!(exchange.grants(), vec![GrantType::Password]);

        // Cached afterwards
        assert_eq!(manager.current_token().await.unwrap(), "token-1");
        assert_eq!(manager.exchange_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_credential_uses_refresh_grant_once() {
        let exchange = Arc::new(ScriptedExchange::new());
        let manager = manager(Arc::clone(&exchange));
        manager.seed(expired_credential()).await;

        assert_eq!(manager.current_token().await.unwrap(), "token-1");
        assert_eq!(manager.current_token().await.unwrap(), "token-1");
        assert_eq!(exchange.grants(), vec![GrantType::RefreshToken]);
    }

    #[tokio::test]
    async fn test_token_within_margin_is_refreshed() {
        let exchange = Arc::new(ScriptedExchange::new());
        let manager = manager(Arc::clone(&exchange));
        let mut credential = expired_credential();
        credential.expires_at = Some(Utc::now() + Duration::seconds(30));
        manager.seed(credential).await;

        assert_eq!(manager.current_token().await.unwrap(), "token-1");
        assert_eq!(exchange.grants(), vec![GrantType::RefreshToken]);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let mut exchange = ScriptedExchange::new();
        exchange.delay = std::time::Duration::from_millis(50);
        let exchange = Arc::new(exchange);
        let manager = manager(Arc::clone(&exchange));

        let calls = (0..16).map(|_| {
            let manager = manager.clone();
            async move { manager.current_token().await }
        });
        let tokens = futures::future::join_all(calls).await;

        assert_eq!(exchange.grants().len(), 1);
        for token in tokens {
            assert_eq!(token.unwrap(), "token-1");
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failure() {
        let mut exchange = ScriptedExchange::new();
        exchange.delay = std::time::Duration::from_millis(50);
        let exchange = Arc::new(exchange);
        exchange.fail_next(SyncError::TransientFetchFailure("connection reset".to_string()));
        let manager = manager(Arc::clone(&exchange));

        let calls = (0..8).map(|_| {
            let manager = manager.clone();
            async move { manager.current_token().await }
        });
        let results = futures::future::join_all(calls).await;

        assert_eq!(exchange.grants().len(), 1);
        for result in results {
            assert!(matches!(result, Err(SyncError::AuthFailure(_))));
        }

        // The next call starts a fresh exchange
        assert_eq!(manager.current_token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_credential() {
        let exchange = Arc::new(ScriptedExchange::new());
        exchange.fail_next(SyncError::TransientFetchFailure("timeout".to_string()));
        let manager = manager(Arc::clone(&exchange));
        manager.seed(expired_credential()).await;

        let err = manager.current_token().await.unwrap_err();
        assert!(matches!(err, SyncError::AuthFailure(_)));

        let kept = manager.current().await.unwrap();
        assert_eq!(kept.access_token, "stale");

        // Transient failures do not give up on the refresh token
        manager.current_token().await.unwrap();
        assert_eq!(
            exchange.grants(),
            vec![GrantType::RefreshToken, GrantType::RefreshToken]
        );
    }

    #[tokio::test]
    async fn test_rejected_refresh_token_falls_back_to_password() {
        let exchange = Arc::new(ScriptedExchange::new());
        exchange.fail_next(SyncError::AuthFailure("invalid_grant".to_string()));
        let manager = manager(Arc::clone(&exchange));
        manager.seed(expired_credential()).await;

        assert!(manager.current_token().await.is_err());
        assert_eq!(manager.current_token().await.unwrap(), "token-2");
        assert_eq!(
            exchange.grants(),
            vec![GrantType::RefreshToken, GrantType::Password]
        );

        // Back on the refresh grant once a new refresh token is stored
        manager.mark_expired();
        manager.current_token().await.unwrap();
        assert_eq!(exchange.grants()[2], GrantType::RefreshToken);
    }

    #[tokio::test]
    async fn test_mark_expired_forces_refresh() {
        let exchange = Arc::new(ScriptedExchange::new());
        let manager = manager(Arc::clone(&exchange));

        assert_eq!(manager.current_token().await.unwrap(), "token-1");
        manager.mark_expired();
        assert_eq!(manager.current_token().await.unwrap(), "token-2");
        assert_eq!(
            exchange.grants(),
            vec![GrantType::Password, GrantType::RefreshToken]
        );
    }
}
