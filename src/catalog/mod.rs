//! Catalog model for discovered Apigee assets.
//!
//! Every poll cycle rebuilds the records of one kind from the remote listing.
//! The previous cycle's records are kept only to compute a [`SyncDiff`], which
//! the reconciler turns into [`CatalogAction`]s for the catalog consumer.
//!
//! Cross-links (`ProductRecord::spec_ids`, `ApiDocRecord::portal_title`) are
//! never filled by the poller; they are derived during reconciliation from the
//! shared [`CatalogIndex`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod diff;
pub mod filter;
pub mod index;

pub use diff::{snapshot, Snapshot, SyncDiff};
pub use filter::RecordFilter;
pub use index::CatalogIndex;

/// Resource kinds discovered from the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Proxy,
    Spec,
    Product,
    Portal,
    ApiDoc,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Proxy => "proxy",
            RecordKind::Spec => "spec",
            RecordKind::Product => "product",
            RecordKind::Portal => "portal",
            RecordKind::ApiDoc => "api_doc",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// API proxy deployed in the organization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub name: String,
    pub revisions: Vec<String>,
    pub last_modified_at: Option<i64>,
}

/// OpenAPI document held in the organization's spec store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpecRecord {
    pub id: String,
    pub name: String,
    pub content_url: Option<String>,
    pub modified: Option<String>,
}

/// API product bundling one or more proxies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub proxies: Vec<String>,
    pub environments: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub last_modified_at: Option<i64>,
    /// Spec ids resolved from `proxies` (derived)
    #[serde(default)]
    pub spec_ids: Vec<String>,
}

/// Developer portal (Apigee "site").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortalRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub current_url: String,
    pub visible_to_customers: bool,
}

/// API documentation page published on one portal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiDocRecord {
    pub id: String,
    pub portal_id: String,
    pub title: String,
    pub description: String,
    pub api_id: String,
    pub product_name: String,
    pub spec_id: String,
    pub spec_title: String,
    pub product_exists: bool,
    pub modified: i64,
    pub image_url: Option<String>,
    pub category_ids: Vec<i64>,
    /// Title of `portal_id` (derived)
    #[serde(default)]
    pub portal_title: Option<String>,
}

/// One discovered asset of any kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteRecord {
    Proxy(ProxyRecord),
    Spec(SpecRecord),
    Product(ProductRecord),
    Portal(PortalRecord),
    ApiDoc(ApiDocRecord),
}

impl RemoteRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            RemoteRecord::Proxy(_) => RecordKind::Proxy,
            RemoteRecord::Spec(_) => RecordKind::Spec,
            RemoteRecord::Product(_) => RecordKind::Product,
            RemoteRecord::Portal(_) => RecordKind::Portal,
            RemoteRecord::ApiDoc(_) => RecordKind::ApiDoc,
        }
    }

    /// Identity within the record's kind.
    ///
    /// Proxies and products are keyed by name, the rest by platform id.
    pub fn id(&self) -> &str {
        match self {
            RemoteRecord::Proxy(p) => &p.name,
            RemoteRecord::Spec(s) => &s.id,
            RemoteRecord::Product(p) => &p.name,
            RemoteRecord::Portal(p) => &p.id,
            RemoteRecord::ApiDoc(d) => &d.id,
        }
    }

    /// Values of a selection-expression field, empty when the kind lacks it.
    ///
    /// Supported fields: `id`, `name`, `displayName`, `description`, `env`,
    /// `proxy`, `attr.<key>`.
    pub fn field_values(&self, field: &str) -> Vec<&str> {
        if let Some(key) = field.strip_prefix("attr.") {
            return match self {
                RemoteRecord::Product(p) => p.attributes.get(key).map(String::as_str).into_iter().collect(),
                _ => Vec::new(),
            };
        }

        match (field, self) {
            ("id", record) => vec![record.id()],
            ("name", RemoteRecord::Proxy(p)) => vec![p.name.as_str()],
            ("name", RemoteRecord::Spec(s)) => vec![s.name.as_str()],
            ("name", RemoteRecord::Product(p)) => vec![p.name.as_str()],
            ("name", RemoteRecord::Portal(p)) => vec![p.name.as_str()],
            ("name", RemoteRecord::ApiDoc(d)) => vec![d.title.as_str()],
            ("displayName", RemoteRecord::Product(p)) => vec![p.display_name.as_str()],
            ("displayName", record) => record.field_values("name"),
            ("description", RemoteRecord::Product(p)) => vec![p.description.as_str()],
            ("description", RemoteRecord::Portal(p)) => vec![p.description.as_str()],
            ("description", RemoteRecord::ApiDoc(d)) => vec![d.description.as_str()],
            ("env", RemoteRecord::Product(p)) => p.environments.iter().map(String::as_str).collect(),
            ("proxy", RemoteRecord::Product(p)) => p.proxies.iter().map(String::as_str).collect(),
            ("proxy", RemoteRecord::Proxy(p)) => vec![p.name.as_str()],
            _ => Vec::new(),
        }
    }
}

/// Instruction handed to the catalog consumer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CatalogAction {
    Create { record: RemoteRecord },
    Update { record: RemoteRecord },
    Delete { kind: RecordKind, id: String },
}

impl CatalogAction {
    pub fn kind(&self) -> RecordKind {
        match self {
            CatalogAction::Create { record } | CatalogAction::Update { record } => record.kind(),
            CatalogAction::Delete { kind, .. } => *kind,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            CatalogAction::Create { record } | CatalogAction::Update { record } => record.id(),
            CatalogAction::Delete { id, .. } => id,
        }
    }

    /// "create", "update" or "delete"
    pub fn verb(&self) -> &'static str {
        match self {
            CatalogAction::Create { .. } => "create",
            CatalogAction::Update { .. } => "update",
            CatalogAction::Delete { .. } => "delete",
        }
    }
}

/// Minimal records for tests.
#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures {
    use super::*;

    pub fn proxy(name: &str) -> RemoteRecord {
        RemoteRecord::Proxy(ProxyRecord {
            name: name.to_string(),
            revisions: vec!["1".to_string()],
            last_modified_at: None,
        })
    }

    pub fn spec(id: &str, name: &str) -> RemoteRecord {
        RemoteRecord::Spec(SpecRecord {
            id: id.to_string(),
            name: name.to_string(),
            content_url: None,
            modified: None,
        })
    }

    pub fn product(name: &str, proxies: &[&str]) -> RemoteRecord {
        RemoteRecord::Product(ProductRecord {
            name: name.to_string(),
            display_name: name.to_uppercase(),
            description: String::new(),
            proxies: proxies.iter().map(|p| p.to_string()).collect(),
            environments: vec!["test".to_string(), "prod".to_string()],
            attributes: BTreeMap::from([("access".to_string(), "public".to_string())]),
            last_modified_at: None,
            spec_ids: Vec::new(),
        })
    }

    pub fn portal(id: &str, name: &str) -> RemoteRecord {
        RemoteRecord::Portal(PortalRecord {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            current_url: format!("https://{}.example.com", id),
            visible_to_customers: true,
        })
    }

    pub fn api_doc(id: &str, portal_id: &str) -> RemoteRecord {
        RemoteRecord::ApiDoc(ApiDocRecord {
            id: id.to_string(),
            portal_id: portal_id.to_string(),
            title: format!("Doc {}", id),
            description: String::new(),
            api_id: format!("api-{}", id),
            product_name: "petstore".to_string(),
            spec_id: String::new(),
            spec_title: String::new(),
            product_exists: true,
            modified: 0,
            image_url: None,
            category_ids: Vec::new(),
            portal_title: None,
        })
    }
}
