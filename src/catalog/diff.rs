use super::{RecordKind, RemoteRecord};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Last complete listing of one kind, keyed by record id.
pub type Snapshot = BTreeMap<String, RemoteRecord>;

/// Key a listing by record id.
///
/// A listing that repeats an id keeps the last occurrence.
pub fn snapshot(listing: Vec<RemoteRecord>) -> Snapshot {
    let mut out = Snapshot::new();
    for record in listing {
        let id = record.id().to_string();
        if out.insert(id.clone(), record).is_some() {
            warn!(id = %id, "Listing contains duplicate id, keeping last");
        }
    }
    out
}

/// Changes between two consecutive listings of one kind.
///
/// Ordered maps keep iteration (and therefore reconciliation output)
/// independent of the order the listing arrived in.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncDiff {
    pub kind: RecordKind,
    pub added: BTreeMap<String, RemoteRecord>,
    /// (previous, current) per id
    pub updated: BTreeMap<String, (RemoteRecord, RemoteRecord)>,
    pub removed: BTreeSet<String>,
}

impl SyncDiff {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            added: BTreeMap::new(),
            updated: BTreeMap::new(),
            removed: BTreeSet::new(),
        }
    }

    /// Compare the previous snapshot against the current one.
    pub fn between(kind: RecordKind, previous: &Snapshot, current: &Snapshot) -> Self {
        let mut diff = Self::new(kind);

        for (id, record) in current {
            match previous.get(id) {
                None => {
                    diff.added.insert(id.clone(), record.clone());
                }
                Some(old) if old != record => {
                    diff.updated
                        .insert(id.clone(), (old.clone(), record.clone()));
                }
                Some(_) => {}
            }
        }

        for id in previous.keys() {
            if !current.contains_key(id) {
                diff.removed.insert(id.clone());
            }
        }

        diff
    }

    pub fn with_added(mut self, record: RemoteRecord) -> Self {
        self.added.insert(record.id().to_string(), record);
        self
    }

    pub fn with_updated(mut self, previous: RemoteRecord, current: RemoteRecord) -> Self {
        self.updated
            .insert(current.id().to_string(), (previous, current));
        self
    }

    pub fn with_removed(mut self, id: impl Into<String>) -> Self {
        self.removed.insert(id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Total number of changed ids.
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }
}
