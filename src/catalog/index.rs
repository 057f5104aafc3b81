use dashmap::{DashMap, DashSet};

/// Lookup tables shared across jobs for cross-reference resolution.
///
/// Each job only writes the tables of its own kind (portals, specs, proxies)
/// and reads the others. Entries reflect the last successfully reconciled
/// cycle of the owning job.
#[derive(Default)]
pub struct CatalogIndex {
    /// portal id → portal title
    portal_titles: DashMap<String, String>,
    /// spec id → spec name
    spec_names: DashMap<String, String>,
    /// spec name → spec id
    spec_ids: DashMap<String, String>,
    proxies: DashSet<String>,
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_portal(&self, id: &str, title: &str) {
        self.portal_titles.insert(id.to_string(), title.to_string());
    }

    pub fn forget_portal(&self, id: &str) {
        self.portal_titles.remove(id);
    }

    pub fn portal_title(&self, id: &str) -> Option<String> {
        self.portal_titles.get(id).map(|t| t.value().clone())
    }

    /// Known portal ids, sorted.
    pub fn portal_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.portal_titles.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn record_spec(&self, id: &str, name: &str) {
        // A renamed spec must not stay reachable under its old name
        if let Some(old_name) = self.spec_names.insert(id.to_string(), name.to_string()) {
            if old_name != name {
                self.spec_ids.remove_if(&old_name, |_, v| v == id);
            }
        }
        self.spec_ids.insert(name.to_string(), id.to_string());
    }

    pub fn forget_spec(&self, id: &str) {
        if let Some((_, name)) = self.spec_names.remove(id) {
            self.spec_ids.remove_if(&name, |_, v| v == id);
        }
    }

    pub fn spec_id_for(&self, name: &str) -> Option<String> {
        self.spec_ids.get(name).map(|id| id.value().clone())
    }

    pub fn record_proxy(&self, name: &str) {
        self.proxies.insert(name.to_string());
    }

    pub fn forget_proxy(&self, name: &str) {
        self.proxies.remove(name);
    }

    pub fn has_proxy(&self, name: &str) -> bool {
        self.proxies.contains(name)
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }
}
