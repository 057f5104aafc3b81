use crate::job::Job;
use apigee_discovery::catalog::CatalogIndex;
use apigee_discovery::SyncResult;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Answers whether a proxy is still part of the discovered catalog.
#[derive(Clone)]
pub struct ProxyValidator {
    index: Arc<CatalogIndex>,
}

impl ProxyValidator {
    pub fn new(index: Arc<CatalogIndex>) -> Self {
        Self { index }
    }

    pub fn is_discovered(&self, proxy_name: &str) -> bool {
        self.index.has_proxy(proxy_name)
    }

    pub fn discovered_count(&self) -> usize {
        self.index.proxy_count()
    }
}

impl fmt::Debug for ProxyValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyValidator")
            .field("proxies", &self.index.proxy_count())
            .finish()
    }
}

/// Callback receiving the validator once proxies have been listed.
pub type RegisterValidator = Arc<dyn Fn(ProxyValidator) + Send + Sync>;

/// Single-run job handing a [`ProxyValidator`] to the host once the first
/// proxy listing has completed.
pub struct RegisterValidatorJob {
    interval: Duration,
    index: Arc<CatalogIndex>,
    developer_id: String,
    register: RegisterValidator,
}

impl RegisterValidatorJob {
    pub fn new(
        interval: Duration,
        index: Arc<CatalogIndex>,
        developer_id: String,
        register: RegisterValidator,
    ) -> Self {
        Self {
            interval,
            index,
            developer_id,
            register,
        }
    }
}

#[async_trait]
impl Job for RegisterValidatorJob {
    fn name(&self) -> &str {
        "register_validator"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run_once(&self) -> bool {
        true
    }

    async fn execute(&self, _cancel: &CancellationToken) -> SyncResult<()> {
        let validator = ProxyValidator::new(Arc::clone(&self.index));
        info!(
            developer_id = %self.developer_id,
            proxies = validator.discovered_count(),
            "Registering API validator"
        );
        (self.register)(validator);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runners::scheduler::JobScheduler;
    use apigee_discovery::ReadinessGate;
    use std::sync::Mutex;

    #[tokio::test(start_paused = true)]
    async fn test_registers_once_after_gate() {
        let index = Arc::new(CatalogIndex::new());
        index.record_proxy("orders");

        let received: Arc<Mutex<Vec<ProxyValidator>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let register: RegisterValidator = Arc::new(move |v: ProxyValidator| sink.lock().unwrap().push(v));

        let gate = ReadinessGate::new("proxies");
        let job = RegisterValidatorJob::new(Duration::from_secs(1), index.clone(), "dev-1".into(), register);
        let cancel = CancellationToken::new();
        let handle = JobScheduler::new(Arc::new(job))
            .depends_on(gate.clone())
            .start(cancel.clone());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(received.lock().unwrap().is_empty());

        for _ in 0..3 {
            gate.mark_done();
        }
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let validators = received.lock().unwrap();
        assert_eq!(validators.len(), 1);
        assert!(validators[0].is_discovered("orders"));
        assert!(!validators[0].is_discovered("payments"));

        // The validator reads the live index
        index.record_proxy("payments");
        assert!(validators[0].is_discovered("payments"));
    }
}
