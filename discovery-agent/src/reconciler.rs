//! Turns listing diffs into catalog actions.
//!
//! One reconciler per job. Records the job owns are written into the shared
//! [`CatalogIndex`]; cross-links onto other kinds are read from it. A record
//! whose link cannot be resolved yet is emitted without it and re-resolved on
//! every later call, producing an update once the link changes.
//!
//! Reconciling is split in two: [`Reconciler::plan`] computes the actions and
//! the state they imply, [`Reconciler::commit`] installs that state once the
//! actions were delivered.

use apigee_discovery::catalog::{CatalogIndex, RecordFilter, SyncDiff};
use apigee_discovery::{CatalogAction, RecordKind, RemoteRecord};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Emitted record carrying cross-links, with whether they all resolved.
#[derive(Clone, Debug)]
struct Linked {
    record: RemoteRecord,
    resolved: bool,
}

/// Catalog index change implied by an action on an owned kind.
#[derive(Clone, Debug)]
enum IndexWrite {
    Proxy(String),
    Spec { id: String, name: String },
    Portal { id: String, title: String },
    ForgetProxy(String),
    ForgetSpec(String),
    ForgetPortal(String),
}

/// Actions computed from one diff, with the state changes they imply.
///
/// Neither the reconciler nor the shared index changes until the plan is
/// handed to [`Reconciler::commit`]. Dropping it discards the changes.
#[derive(Debug)]
pub struct Reconciliation {
    actions: Vec<CatalogAction>,
    linked: BTreeMap<String, Linked>,
    index_writes: Vec<IndexWrite>,
}

impl Reconciliation {
    pub fn actions(&self) -> &[CatalogAction] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

pub struct Reconciler {
    kind: RecordKind,
    index: Arc<CatalogIndex>,
    filter: RecordFilter,
    linked: BTreeMap<String, Linked>,
}

impl Reconciler {
    pub fn new(kind: RecordKind, index: Arc<CatalogIndex>, filter: RecordFilter) -> Self {
        Self {
            kind,
            index,
            filter,
            linked: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Records emitted with at least one unresolved cross-link.
    pub fn deferred_count(&self) -> usize {
        self.linked.values().filter(|l| !l.resolved).count()
    }

    /// Maps `diff` onto actions and commits the result at once.
    pub fn reconcile(&mut self, diff: &SyncDiff) -> Vec<CatalogAction> {
        let plan = self.plan(diff);
        self.commit(plan)
    }

    /// Maps `diff` onto actions, sorted by id, without changing any state.
    ///
    /// No remote I/O. Given the same diff, committed state and index
    /// contents the output is the same, whatever order the diff was built in.
    pub fn plan(&self, diff: &SyncDiff) -> Reconciliation {
        let mut plan = Reconciliation {
            actions: Vec::new(),
            linked: self.linked.clone(),
            index_writes: Vec::new(),
        };
        let mut touched = BTreeSet::new();

        for (id, record) in &diff.added {
            touched.insert(id.as_str());
            let (record, resolved) = self.link(record);
            if self.filter.matches(&record) {
                self.admit(&mut plan, id, &record, resolved);
                plan.actions.push(CatalogAction::Create { record });
            } else {
                self.evict(&mut plan, id);
            }
        }

        for (id, (old, new)) in &diff.updated {
            touched.insert(id.as_str());
            let was_included = self.filter.matches(old);
            let (record, resolved) = self.link(new);
            if self.filter.matches(&record) {
                self.admit(&mut plan, id, &record, resolved);
                plan.actions.push(if was_included {
                    CatalogAction::Update { record }
                } else {
                    CatalogAction::Create { record }
                });
            } else {
                self.evict(&mut plan, id);
                if was_included {
                    plan.actions.push(CatalogAction::Delete {
                        kind: self.kind,
                        id: id.clone(),
                    });
                }
            }
        }

        for id in &diff.removed {
            touched.insert(id.as_str());
            self.evict(&mut plan, id);
            plan.actions.push(CatalogAction::Delete {
                kind: self.kind,
                id: id.clone(),
            });
        }

        let retry: Vec<String> = plan
            .linked
            .keys()
            .filter(|id| !touched.contains(id.as_str()))
            .cloned()
            .collect();
        for id in retry {
            let Some(previous) = plan.linked.get(&id).map(|l| l.record.clone()) else {
                continue;
            };
            let (record, resolved) = self.link(&previous);
            if record != previous {
                debug!(kind = %self.kind, id = %id, "Cross-link changed");
                plan.actions.push(CatalogAction::Update {
                    record: record.clone(),
                });
            }
            plan.linked.insert(id, Linked { record, resolved });
        }

        plan.actions
            .sort_by(|a, b| a.id().cmp(b.id()).then(rank(a).cmp(&rank(b))));
        plan
    }

    /// Applies the state changes of `plan` and returns its actions.
    ///
    /// Call only once the actions have been accepted downstream.
    pub fn commit(&mut self, plan: Reconciliation) -> Vec<CatalogAction> {
        for write in plan.index_writes {
            match write {
                IndexWrite::Proxy(name) => self.index.record_proxy(&name),
                IndexWrite::Spec { id, name } => self.index.record_spec(&id, &name),
                IndexWrite::Portal { id, title } => self.index.record_portal(&id, &title),
                IndexWrite::ForgetProxy(name) => self.index.forget_proxy(&name),
                IndexWrite::ForgetSpec(id) => self.index.forget_spec(&id),
                IndexWrite::ForgetPortal(id) => self.index.forget_portal(&id),
            }
        }
        self.linked = plan.linked;
        plan.actions
    }

    /// Fills derived cross-links from the index.
    fn link(&self, record: &RemoteRecord) -> (RemoteRecord, bool) {
        let mut record = record.clone();
        let resolved = match &mut record {
            RemoteRecord::Product(product) => {
                let mut resolved = true;
                let mut spec_ids = Vec::new();
                for proxy in &product.proxies {
                    match self.index.spec_id_for(proxy) {
                        Some(spec_id) => spec_ids.push(spec_id),
                        None => resolved = false,
                    }
                }
                spec_ids.sort();
                spec_ids.dedup();
                product.spec_ids = spec_ids;
                resolved
            }
            RemoteRecord::ApiDoc(doc) => {
                doc.portal_title = self.index.portal_title(&doc.portal_id);
                doc.portal_title.is_some()
            }
            _ => true,
        };
        (record, resolved)
    }

    /// Record is (or stays) in the catalog.
    fn admit(&self, plan: &mut Reconciliation, id: &str, record: &RemoteRecord, resolved: bool) {
        let write = match record {
            RemoteRecord::Proxy(p) => IndexWrite::Proxy(p.name.clone()),
            RemoteRecord::Spec(s) => IndexWrite::Spec {
                id: s.id.clone(),
                name: s.name.clone(),
            },
            RemoteRecord::Portal(p) => IndexWrite::Portal {
                id: p.id.clone(),
                title: p.name.clone(),
            },
            RemoteRecord::Product(_) | RemoteRecord::ApiDoc(_) => {
                plan.linked.insert(
                    id.to_string(),
                    Linked {
                        record: record.clone(),
                        resolved,
                    },
                );
                return;
            }
        };
        plan.index_writes.push(write);
    }

    /// Record left the catalog, or never entered it.
    fn evict(&self, plan: &mut Reconciliation, id: &str) {
        let write = match self.kind {
            RecordKind::Proxy => IndexWrite::ForgetProxy(id.to_string()),
            RecordKind::Spec => IndexWrite::ForgetSpec(id.to_string()),
            RecordKind::Portal => IndexWrite::ForgetPortal(id.to_string()),
            RecordKind::Product | RecordKind::ApiDoc => {
                plan.linked.remove(id);
                return;
            }
        };
        plan.index_writes.push(write);
    }
}

fn rank(action: &CatalogAction) -> u8 {
    match action {
        CatalogAction::Create { .. } => 0,
        CatalogAction::Update { .. } => 1,
        CatalogAction::Delete { .. } => 2,
    }
}
