//! Listing items as Apigee returns them, and their catalog records.
//!
//! Management listings answer either bare names (`["orders", ...]`) or
//! expanded objects depending on the `expand` setting of the organization;
//! both shapes are accepted.

use apigee_discovery::catalog::{
    ApiDocRecord, PortalRecord, ProductRecord, ProxyRecord, SpecRecord,
};
use apigee_discovery::{RecordKind, RemoteRecord, SyncError, SyncResult};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::poller::ResourceKind;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    #[serde(default)]
    pub last_modified_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawProxy {
    Name(String),
    Detail {
        name: String,
        #[serde(default)]
        revision: Vec<String>,
        #[serde(default, rename = "metaData")]
        meta_data: MetaData,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawAttribute {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawProduct {
    Name(String),
    Detail(RawProductDetail),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProductDetail {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub proxies: Vec<String>,
    #[serde(default)]
    pub environments: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<RawAttribute>,
    #[serde(default)]
    pub last_modified_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPortal {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub custom_domain: String,
    #[serde(default)]
    pub org_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub visible_to_customers: bool,
    #[serde(default)]
    pub https: bool,
    #[serde(default)]
    pub default_domain: String,
    #[serde(default, rename = "defaultURL")]
    pub default_url: String,
    #[serde(default, rename = "currentURL")]
    pub current_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawApiDoc {
    pub id: i64,
    #[serde(rename = "siteId")]
    pub portal_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub api_id: String,
    #[serde(default, rename = "edgeAPIProductName")]
    pub product_name: String,
    #[serde(default)]
    pub spec_title: String,
    #[serde(default)]
    pub spec_id: String,
    #[serde(default)]
    pub product_exists: bool,
    #[serde(default)]
    pub modified: i64,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
}

fn require_name(kind: RecordKind, name: &str) -> SyncResult<()> {
    if name.trim().is_empty() {
        return Err(SyncError::MalformedResponse(format!(
            "{} listing item without a name",
            kind
        )));
    }
    Ok(())
}

pub struct ProxyKind;

impl ResourceKind for ProxyKind {
    const KIND: RecordKind = RecordKind::Proxy;
    const BARE_LISTING: bool = true;
    type Raw = RawProxy;

    fn into_record(raw: RawProxy) -> SyncResult<RemoteRecord> {
        let record = match raw {
            RawProxy::Name(name) => ProxyRecord {
                name,
                revisions: Vec::new(),
                last_modified_at: None,
            },
            RawProxy::Detail {
                name,
                revision,
                meta_data,
            } => ProxyRecord {
                name,
                revisions: revision,
                last_modified_at: meta_data.last_modified_at,
            },
        };
        require_name(Self::KIND, &record.name)?;
        Ok(RemoteRecord::Proxy(record))
    }
}

pub struct SpecKind;

impl ResourceKind for SpecKind {
    const KIND: RecordKind = RecordKind::Spec;
    type Raw = RawSpec;

    fn into_record(raw: RawSpec) -> SyncResult<RemoteRecord> {
        if raw.id.is_empty() {
            return Err(SyncError::MalformedResponse(
                "spec listing item without an id".to_string(),
            ));
        }
        Ok(RemoteRecord::Spec(SpecRecord {
            id: raw.id,
            name: raw.name,
            content_url: raw.content,
            modified: raw.modified,
        }))
    }
}

pub struct ProductKind;

impl ResourceKind for ProductKind {
    const KIND: RecordKind = RecordKind::Product;
    const BARE_LISTING: bool = true;
    type Raw = RawProduct;

    fn into_record(raw: RawProduct) -> SyncResult<RemoteRecord> {
        let detail = match raw {
            RawProduct::Name(name) => RawProductDetail {
                display_name: name.clone(),
                name,
                description: String::new(),
                proxies: Vec::new(),
                environments: Vec::new(),
                attributes: Vec::new(),
                last_modified_at: None,
            },
            RawProduct::Detail(detail) => detail,
        };
        require_name(Self::KIND, &detail.name)?;

        let attributes: BTreeMap<String, String> = detail
            .attributes
            .into_iter()
            .map(|a| (a.name, a.value))
            .collect();

        Ok(RemoteRecord::Product(ProductRecord {
            display_name: if detail.display_name.is_empty() {
                detail.name.clone()
            } else {
                detail.display_name
            },
            name: detail.name,
            description: detail.description,
            proxies: detail.proxies,
            environments: detail.environments,
            attributes,
            last_modified_at: detail.last_modified_at,
            spec_ids: Vec::new(),
        }))
    }
}

pub struct PortalKind;

impl ResourceKind for PortalKind {
    const KIND: RecordKind = RecordKind::Portal;
    type Raw = RawPortal;

    fn into_record(raw: RawPortal) -> SyncResult<RemoteRecord> {
        if raw.id.is_empty() {
            return Err(SyncError::MalformedResponse(
                "portal listing item without an id".to_string(),
            ));
        }
        let current_url = if raw.current_url.is_empty() {
            raw.default_url
        } else {
            raw.current_url
        };
        Ok(RemoteRecord::Portal(PortalRecord {
            id: raw.id,
            name: raw.name,
            description: raw.description,
            current_url,
            visible_to_customers: raw.visible_to_customers,
        }))
    }
}

pub struct ApiDocKind;

impl ResourceKind for ApiDocKind {
    const KIND: RecordKind = RecordKind::ApiDoc;
    type Raw = RawApiDoc;

    fn into_record(raw: RawApiDoc) -> SyncResult<RemoteRecord> {
        Ok(RemoteRecord::ApiDoc(ApiDocRecord {
            id: raw.id.to_string(),
            portal_id: raw.portal_id,
            title: raw.title,
            description: raw.description,
            api_id: raw.api_id,
            product_name: raw.product_name,
            spec_id: raw.spec_id,
            spec_title: raw.spec_title,
            product_exists: raw.product_exists,
            modified: raw.modified,
            image_url: raw.image_url,
            category_ids: raw.category_ids,
            portal_title: None,
        }))
    }
}
