use apigee_discovery::DiscoveryConfig;
use urlencoding::encode;

pub const USER_AGENT: &str = "apigee-discovery-agent/0.1";

/// Listing URLs for one organization.
///
/// Management listings live under `{url}/{api_version}`, spec store and
/// portal listings under the data API.
#[derive(Clone, Debug)]
pub struct Endpoints {
    url: String,
    api_version: String,
    data_url: String,
    organization: String,
}

impl Endpoints {
    pub fn new(url: &str, api_version: &str, data_url: &str, organization: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_version: api_version.to_string(),
            data_url: data_url.trim_end_matches('/').to_string(),
            organization: organization.to_string(),
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(
            &config.url,
            &config.api_version,
            &config.data_url,
            &config.organization,
        )
    }

    fn management(&self, resource: &str) -> String {
        format!(
            "{}/{}/organizations/{}/{}",
            self.url,
            self.api_version,
            encode(&self.organization),
            resource
        )
    }

    fn data(&self, resource: &str) -> String {
        format!(
            "{}/organizations/{}/{}",
            self.data_url,
            encode(&self.organization),
            resource
        )
    }

    pub fn proxies(&self) -> String {
        self.management("apis")
    }

    pub fn products(&self) -> String {
        self.management("apiproducts")
    }

    pub fn specs(&self) -> String {
        self.data("specs")
    }

    pub fn portals(&self) -> String {
        self.data("sites")
    }

    /// API docs published on one portal.
    pub fn api_docs(&self, portal_id: &str) -> String {
        format!("{}/portals/{}/apidocs", self.data_url, encode(portal_id))
    }
}
