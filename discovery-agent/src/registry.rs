//! Job registry - Wires the discovery jobs and their readiness gates.
//!
//! ```text
//! proxies ──(proxies)──▶ register_validator (single run)
//! specs   ──(specs)────▶ products
//! portals ──(portals)──▶ api_docs
//! ```

use crate::connectors::apigee::{
    ApiDocKind, Endpoints, PortalKind, ProductKind, ProxyKind, SpecKind,
};
use crate::consumer::CatalogConsumer;
use crate::jobs::{fixed_endpoint, EndpointSource, PollJob, RegisterValidator, RegisterValidatorJob};
use crate::manager::DiscoveryManager;
use crate::poller::PageFetcher;
use crate::reconciler::Reconciler;
use crate::runners::scheduler::JobScheduler;
use apigee_discovery::catalog::{CatalogIndex, RecordFilter};
use apigee_discovery::{CredentialManager, DiscoveryConfig, ReadinessGate, RecordKind, SyncResult};
use std::sync::Arc;

/// Gates flipped by the first successful cycle of their owning job.
#[derive(Clone, Debug)]
pub struct DiscoveryGates {
    pub proxies: ReadinessGate,
    pub specs: ReadinessGate,
    pub portals: ReadinessGate,
}

impl DiscoveryGates {
    pub fn new() -> Self {
        Self {
            proxies: ReadinessGate::new("proxies"),
            specs: ReadinessGate::new("specs"),
            portals: ReadinessGate::new("portals"),
        }
    }
}

impl Default for DiscoveryGates {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the jobs share, plus the host callbacks.
pub struct Wiring {
    pub credentials: CredentialManager,
    pub fetcher: Arc<dyn PageFetcher>,
    pub consumer: Arc<dyn CatalogConsumer>,
    pub register_validator: RegisterValidator,
}

/// Result of [`build`]: the manager plus the shared index and gates.
pub struct Discovery {
    pub manager: DiscoveryManager,
    pub index: Arc<CatalogIndex>,
    pub gates: DiscoveryGates,
}

/// Builds every discovery job from `config`.
///
/// # Errors
/// `ConfigurationInvalid` when a selection expression does not parse.
pub fn build(config: &DiscoveryConfig, wiring: Wiring) -> SyncResult<Discovery> {
    let product_filter = RecordFilter::parse(&config.filter)?;
    let spec_filter = RecordFilter::parse(&config.spec_filter)?;

    let index = Arc::new(CatalogIndex::new());
    let gates = DiscoveryGates::new();
    let endpoints = Endpoints::from_config(config);
    let intervals = &config.intervals;

    let reconciler = |kind: RecordKind, filter: RecordFilter| {
        Reconciler::new(kind, Arc::clone(&index), filter)
    };

    let proxies = PollJob::<ProxyKind>::new(
        "proxies",
        intervals.proxy(),
        wiring.credentials.clone(),
        Arc::clone(&wiring.fetcher),
        config.page_size,
        fixed_endpoint(endpoints.proxies()),
        reconciler(RecordKind::Proxy, RecordFilter::allow_all()),
        Arc::clone(&wiring.consumer),
    );

    let specs = PollJob::<SpecKind>::new(
        "specs",
        intervals.spec(),
        wiring.credentials.clone(),
        Arc::clone(&wiring.fetcher),
        config.page_size,
        fixed_endpoint(endpoints.specs()),
        reconciler(RecordKind::Spec, spec_filter),
        Arc::clone(&wiring.consumer),
    );

    let products = PollJob::<ProductKind>::new(
        "products",
        intervals.product(),
        wiring.credentials.clone(),
        Arc::clone(&wiring.fetcher),
        config.page_size,
        fixed_endpoint(endpoints.products()),
        reconciler(RecordKind::Product, product_filter),
        Arc::clone(&wiring.consumer),
    );

    let portals = PollJob::<PortalKind>::new(
        "portals",
        intervals.portal(),
        wiring.credentials.clone(),
        Arc::clone(&wiring.fetcher),
        config.page_size,
        fixed_endpoint(endpoints.portals()),
        reconciler(RecordKind::Portal, RecordFilter::allow_all()),
        Arc::clone(&wiring.consumer),
    );

    let portal_index = Arc::clone(&index);
    let doc_endpoints = endpoints.clone();
    let per_portal: EndpointSource = Arc::new(move || {
        portal_index
            .portal_ids()
            .iter()
            .map(|id| doc_endpoints.api_docs(id))
            .collect()
    });

    let api_docs = PollJob::<ApiDocKind>::new(
        "api_docs",
        intervals.api(),
        wiring.credentials.clone(),
        Arc::clone(&wiring.fetcher),
        config.page_size,
        per_portal,
        reconciler(RecordKind::ApiDoc, RecordFilter::allow_all()),
        Arc::clone(&wiring.consumer),
    );

    let register = RegisterValidatorJob::new(
        intervals.proxy(),
        Arc::clone(&index),
        config.developer_id.clone(),
        wiring.register_validator,
    );

    let mut manager = DiscoveryManager::new();
    manager.add(JobScheduler::new(Arc::new(proxies)).completes(gates.proxies.clone()));
    manager.add(JobScheduler::new(Arc::new(specs)).completes(gates.specs.clone()));
    manager.add(JobScheduler::new(Arc::new(portals)).completes(gates.portals.clone()));
    manager.add(JobScheduler::new(Arc::new(products)).depends_on(gates.specs.clone()));
    manager.add(JobScheduler::new(Arc::new(api_docs)).depends_on(gates.portals.clone()));
    manager.add(JobScheduler::new(Arc::new(register)).depends_on(gates.proxies.clone()));

    Ok(Discovery {
        manager,
        index,
        gates,
    })
}
