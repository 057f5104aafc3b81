//! Recurring listing job for one resource kind.

use crate::consumer::CatalogConsumer;
use crate::job::Job;
use crate::poller::{PageFetcher, Poller, ResourceKind};
use crate::reconciler::Reconciler;
use apigee_discovery::catalog::{snapshot, Snapshot, SyncDiff};
use apigee_discovery::{CredentialManager, SyncError, SyncResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// Produces the endpoints to list on each cycle.
///
/// Usually a single fixed URL; API docs list one endpoint per known portal.
pub type EndpointSource = Arc<dyn Fn() -> Vec<String> + Send + Sync>;

/// Returns an [`EndpointSource`] that always lists `endpoint`.
pub fn fixed_endpoint(endpoint: String) -> EndpointSource {
    Arc::new(move || vec![endpoint.clone()])
}

struct CycleState {
    /// Listing of the last successful cycle
    known: Snapshot,
    reconciler: Reconciler,
}

/// Lists kind `K`, diffs against the previous cycle and hands the reconciled
/// actions to the catalog consumer.
///
/// The last-known listing, the reconciler state and the shared index advance
/// only after the consumer accepted the actions; a failed or cancelled cycle
/// leaves all three untouched.
pub struct PollJob<K: ResourceKind> {
    name: String,
    interval: Duration,
    credentials: CredentialManager,
    poller: Poller<K>,
    endpoints: EndpointSource,
    consumer: Arc<dyn CatalogConsumer>,
    state: Mutex<CycleState>,
}

impl<K: ResourceKind> PollJob<K> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        credentials: CredentialManager,
        fetcher: Arc<dyn PageFetcher>,
        page_size: usize,
        endpoints: EndpointSource,
        reconciler: Reconciler,
        consumer: Arc<dyn CatalogConsumer>,
    ) -> Self {
        Self {
            name: name.into(),
            interval,
            credentials,
            poller: Poller::new(fetcher, page_size),
            endpoints,
            consumer,
            state: Mutex::new(CycleState {
                known: Snapshot::new(),
                reconciler,
            }),
        }
    }

    /// Number of records in the last successful listing.
    pub async fn known_count(&self) -> usize {
        self.state.lock().await.known.len()
    }

    async fn list(&self, cancel: &CancellationToken) -> SyncResult<Snapshot> {
        let token = self.credentials.current_token().await?;

        let mut listing = Vec::new();
        for endpoint in (self.endpoints)() {
            match self.poller.poll(&token, &endpoint, cancel).await {
                Ok(records) => listing.extend(records),
                Err(e @ SyncError::AuthFailure(_)) => {
                    self.credentials.mark_expired();
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(snapshot(listing))
    }

    async fn cycle(&self, cancel: &CancellationToken) -> SyncResult<()> {
        let current = self.list(cancel).await?;

        let mut state = self.state.lock().await;
        let diff = SyncDiff::between(K::KIND, &state.known, &current);

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        // No cancellation checkpoint past this point; delivery and commit
        // run to completion.
        let plan = state.reconciler.plan(&diff);
        if plan.is_empty() {
            debug!(kind = %K::KIND, count = current.len(), "No catalog changes");
        } else {
            self.consumer.apply(plan.actions()).await?;
            info!(
                kind = %K::KIND,
                added = diff.added.len(),
                updated = diff.updated.len(),
                removed = diff.removed.len(),
                actions = plan.actions().len(),
                "Catalog synchronized"
            );
        }

        state.reconciler.commit(plan);
        state.known = current;
        Ok(())
    }
}

#[async_trait]
impl<K: ResourceKind> Job for PollJob<K> {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self, cancel: &CancellationToken) -> SyncResult<()> {
        let span = info_span!("cycle", job = %self.name, cycle_id = %Uuid::now_v7());
        self.cycle(cancel).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::apigee::{ProductKind, ProxyKind};
    use crate::consumer::ChannelConsumer;
    use crate::poller::PageRequest;
    use crate::runners::scheduler::JobScheduler;
    use apigee_discovery::catalog::{CatalogIndex, RecordFilter};
    use apigee_discovery::credentials::{TokenExchange, TokenGrant, TokenResponse};
    use apigee_discovery::{CatalogAction, RecordKind, RemoteRecord};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    struct StaticExchange;

    #[async_trait]
    impl TokenExchange for StaticExchange {
        async fn exchange(&self, _grant: &TokenGrant) -> SyncResult<TokenResponse> {
            Ok(TokenResponse {
                access_token: "tok".to_string(),
                token_type: "bearer".to_string(),
                refresh_token: Some("r".to_string()),
                expires_in: Some(3600),
                scope: None,
                jti: None,
            })
        }
    }

    /// Single-page listings keyed by endpoint, swappable between cycles.
    #[derive(Default)]
    struct FakeApi {
        bodies: StdMutex<HashMap<String, SyncResult<String>>>,
        calls: AtomicU32,
    }

    impl FakeApi {
        fn serve(&self, endpoint: &str, body: SyncResult<&str>) {
            self.bodies
                .lock()
                .unwrap()
                .insert(endpoint.to_string(), body.map(str::to_string));
        }
    }

    #[async_trait]
    impl PageFetcher for FakeApi {
        async fn fetch_page(&self, _: &str, endpoint: &str, _: &PageRequest) -> SyncResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bodies
                .lock()
                .unwrap()
                .get(endpoint)
                .cloned()
                .unwrap_or_else(|| Err(SyncError::TransientFetchFailure("404".into())))
        }
    }

    fn credentials() -> CredentialManager {
        CredentialManager::new(Arc::new(StaticExchange), "u".into(), "p".into())
    }

    fn proxy_job(
        api: Arc<FakeApi>,
        credentials: CredentialManager,
    ) -> (PollJob<ProxyKind>, tokio::sync::mpsc::Receiver<CatalogAction>) {
        let (consumer, rx) = ChannelConsumer::new(64);
        let job = PollJob::<ProxyKind>::new(
            "proxies",
            Duration::from_secs(30),
            credentials,
            api,
            100,
            fixed_endpoint("apis".to_string()),
            Reconciler::new(
                RecordKind::Proxy,
                Arc::new(CatalogIndex::new()),
                RecordFilter::allow_all(),
            ),
            Arc::new(consumer),
        );
        (job, rx)
    }

    fn drain(rx: &mut tokio::sync::mpsc::Receiver<CatalogAction>) -> Vec<(String, &'static str)> {
        let mut out = Vec::new();
        while let Ok(action) = rx.try_recv() {
            out.push((action.id().to_string(), action.verb()));
        }
        out
    }

    #[tokio::test]
    async fn test_cycles_emit_only_changes() {
        let api = Arc::new(FakeApi::default());
        let (job, mut rx) = proxy_job(api.clone(), credentials());
        let cancel = CancellationToken::new();

        api.serve("apis", Ok(r#"{"data":["orders","payments"]}"#));
        job.execute(&cancel).await.unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![
                ("orders".to_string(), "create"),
                ("payments".to_string(), "create")
            ]
        );

        job.execute(&cancel).await.unwrap();
        assert!(drain(&mut rx).is_empty());

        api.serve("apis", Ok(r#"{"data":["orders","refunds"]}"#));
        job.execute(&cancel).await.unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![
                ("payments".to_string(), "delete"),
                ("refunds".to_string(), "create")
            ]
        );
        assert_eq!(job.known_count().await, 2);
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_last_known_listing() {
        let api = Arc::new(FakeApi::default());
        let (job, mut rx) = proxy_job(api.clone(), credentials());
        let cancel = CancellationToken::new();

        api.serve("apis", Ok(r#"{"data":["orders"]}"#));
        job.execute(&cancel).await.unwrap();
        drain(&mut rx);

        api.serve("apis", Err(SyncError::TransientFetchFailure("502".into())));
        assert!(job.execute(&cancel).await.is_err());
        assert_eq!(job.known_count().await, 1);
        assert!(drain(&mut rx).is_empty());

        api.serve("apis", Ok(r#"{"data":["orders"]}"#));
        job.execute(&cancel).await.unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_auth_failure_forces_token_refresh() {
        let api = Arc::new(FakeApi::default());
        let creds = credentials();
        let (job, _rx) = proxy_job(api.clone(), creds.clone());
        let cancel = CancellationToken::new();

        api.serve("apis", Err(SyncError::AuthFailure("401".into())));
        let err = job.execute(&cancel).await.unwrap_err();
        assert!(matches!(err, SyncError::AuthFailure(_)));
        assert_eq!(creds.exchange_count(), 1);

        api.serve("apis", Ok(r#"{"data":[]}"#));
        job.execute(&cancel).await.unwrap();
        assert_eq!(creds.exchange_count(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_cycle_commits_nothing() {
        let api = Arc::new(FakeApi::default());
        let (job, mut rx) = proxy_job(api.clone(), credentials());
        let cancel = CancellationToken::new();
        cancel.cancel();

        api.serve("apis", Ok(r#"{"data":["orders"]}"#));
        assert_eq!(job.execute(&cancel).await.unwrap_err(), SyncError::Cancelled);
        assert_eq!(job.known_count().await, 0);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_per_portal_endpoints() {
        let api = Arc::new(FakeApi::default());
        api.serve("portals/p1/apidocs", Ok(r#"{"data":["a"]}"#));
        api.serve("portals/p2/apidocs", Ok(r#"{"data":["b"]}"#));

        let index = Arc::new(CatalogIndex::new());
        index.record_portal("p1", "One");
        index.record_portal("p2", "Two");

        let source_index = index.clone();
        let endpoints: EndpointSource = Arc::new(move || {
            source_index
                .portal_ids()
                .into_iter()
                .map(|id| format!("portals/{}/apidocs", id))
                .collect()
        });

        let (consumer, mut rx) = ChannelConsumer::new(16);
        let job = PollJob::<ProxyKind>::new(
            "fanout",
            Duration::from_secs(30),
            credentials(),
            api.clone(),
            100,
            endpoints,
            Reconciler::new(RecordKind::Proxy, index, RecordFilter::allow_all()),
            Arc::new(consumer),
        );

        job.execute(&CancellationToken::new()).await.unwrap();
        assert_eq!(drain(&mut rx).len(), 2);
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    /// Fails the next `fail_next` deliveries, then records everything.
    #[derive(Default)]
    struct FlakyConsumer {
        failures: AtomicU32,
        delivered: StdMutex<Vec<CatalogAction>>,
    }

    impl FlakyConsumer {
        fn fail_next(&self, times: u32) {
            self.failures.store(times, Ordering::SeqCst);
        }

        fn delivered(&self) -> Vec<CatalogAction> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CatalogConsumer for FlakyConsumer {
        async fn apply(&self, actions: &[CatalogAction]) -> SyncResult<()> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(SyncError::TransientFetchFailure("catalog unavailable".into()));
            }
            self.delivered.lock().unwrap().extend(actions.iter().cloned());
            Ok(())
        }
    }

    fn job_on<K: ResourceKind>(
        api: Arc<FakeApi>,
        endpoint: &str,
        index: Arc<CatalogIndex>,
        consumer: Arc<dyn CatalogConsumer>,
    ) -> PollJob<K> {
        PollJob::<K>::new(
            K::KIND.as_str(),
            Duration::from_secs(30),
            credentials(),
            api,
            100,
            fixed_endpoint(endpoint.to_string()),
            Reconciler::new(K::KIND, index, RecordFilter::allow_all()),
            consumer,
        )
    }

    fn verbs(actions: &[CatalogAction]) -> Vec<(String, &'static str)> {
        actions
            .iter()
            .map(|a| (a.id().to_string(), a.verb()))
            .collect()
    }

    #[tokio::test]
    async fn test_link_update_survives_failed_delivery() {
        let api = Arc::new(FakeApi::default());
        api.serve(
            "apiproducts",
            Ok(r#"{"data":[{"name":"gold","proxies":["orders"]}]}"#),
        );
        let index = Arc::new(CatalogIndex::new());
        let consumer = Arc::new(FlakyConsumer::default());
        let job = job_on::<ProductKind>(api, "apiproducts", index.clone(), consumer.clone());
        let cancel = CancellationToken::new();

        job.execute(&cancel).await.unwrap();

        // The spec shows up, but the cycle carrying the new link fails
        index.record_spec("s-1", "orders");
        consumer.fail_next(1);
        assert!(job.execute(&cancel).await.is_err());

        job.execute(&cancel).await.unwrap();
        job.execute(&cancel).await.unwrap();

        let delivered = consumer.delivered();
        assert_eq!(
            verbs(&delivered),
            vec![("gold".to_string(), "create"), ("gold".to_string(), "update")]
        );
        match &delivered[1] {
            CatalogAction::Update { record: RemoteRecord::Product(p) } => {
                assert_eq!(p.spec_ids, vec!["s-1"])
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_delivery_leaves_index_untouched() {
        let api = Arc::new(FakeApi::default());
        api.serve("apis", Ok(r#"{"data":["orders"]}"#));
        let index = Arc::new(CatalogIndex::new());
        let consumer = Arc::new(FlakyConsumer::default());
        let job = job_on::<ProxyKind>(api.clone(), "apis", index.clone(), consumer.clone());
        let cancel = CancellationToken::new();

        job.execute(&cancel).await.unwrap();
        assert!(index.has_proxy("orders"));

        api.serve("apis", Ok(r#"{"data":[]}"#));
        consumer.fail_next(1);
        assert!(job.execute(&cancel).await.is_err());
        assert!(index.has_proxy("orders"));
        assert_eq!(job.known_count().await, 1);

        job.execute(&cancel).await.unwrap();
        assert!(!index.has_proxy("orders"));
        assert_eq!(
            verbs(&consumer.delivered()),
            vec![("orders".to_string(), "create"), ("orders".to_string(), "delete")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_delivery_completes_the_cycle() {
        let api = Arc::new(FakeApi::default());
        api.serve("apis", Ok(r#"{"data":["a","b","c"]}"#));
        let index = Arc::new(CatalogIndex::new());
        let (consumer, mut rx) = ChannelConsumer::new(1);
        let job = Arc::new(job_on::<ProxyKind>(api, "apis", index.clone(), Arc::new(consumer)));

        let cancel = CancellationToken::new();
        let handle = JobScheduler::new(job.clone()).start(cancel.clone());

        // The first action fills the channel; delivery waits on the second
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(rx.recv().await.unwrap().id().to_string());
        }
        handle.await.unwrap();

        assert_eq!(received, vec!["a", "b", "c"]);
        assert_eq!(job.known_count().await, 3);
        assert!(index.has_proxy("c"));
    }
}
