pub mod env;

use crate::error::SyncError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_URL: &str = "https://api.enterprise.apigee.com";
pub const DEFAULT_DATA_URL: &str = "https://apigee.com/dapi/api";
pub const DEFAULT_TOKEN_URL: &str = "https://login.apigee.com/oauth/token";

/// Complete discovery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Apigee organization all listings are scoped to
    #[serde(default)]
    pub organization: String,
    /// Management API base URL
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Data API base URL (specs, portals, API docs)
    #[serde(default = "default_data_url")]
    pub data_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub intervals: IntervalConfig,
    /// Product selection expression (empty selects everything)
    #[serde(default)]
    pub filter: String,
    /// Spec selection expression (empty selects everything)
    #[serde(default)]
    pub spec_filter: String,
    /// Developer used downstream when applications are created
    #[serde(default)]
    pub developer_id: String,
    /// Items requested per listing page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// Credentials for the Apigee token endpoint
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// OAuth client used for the password and refresh grants
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_client_secret")]
    pub client_secret: String,
}

// Keeps the password out of logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Poll cadence per resource kind, in seconds
#[derive(Debug, Clone, Deserialize)]
pub struct IntervalConfig {
    #[serde(default = "default_proxy_seconds")]
    pub proxy_seconds: u64,
    #[serde(default = "default_spec_seconds")]
    pub spec_seconds: u64,
    #[serde(default = "default_product_seconds")]
    pub product_seconds: u64,
    #[serde(default = "default_portal_seconds")]
    pub portal_seconds: u64,
    #[serde(default = "default_api_seconds")]
    pub api_seconds: u64,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_data_url() -> String {
    DEFAULT_DATA_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_client_id() -> String {
    "edgecli".to_string()
}

fn default_client_secret() -> String {
    "edgeclisecret".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_proxy_seconds() -> u64 {
    30
}

fn default_spec_seconds() -> u64 {
    30 * 60
}

fn default_product_seconds() -> u64 {
    5 * 60
}

fn default_portal_seconds() -> u64 {
    60
}

fn default_api_seconds() -> u64 {
    30
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            token_url: default_token_url(),
            client_id: default_client_id(),
            client_secret: default_client_secret(),
        }
    }
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            proxy_seconds: default_proxy_seconds(),
            spec_seconds: default_spec_seconds(),
            product_seconds: default_product_seconds(),
            portal_seconds: default_portal_seconds(),
            api_seconds: default_api_seconds(),
        }
    }
}

impl IntervalConfig {
    pub fn proxy(&self) -> Duration {
        Duration::from_secs(self.proxy_seconds)
    }

    pub fn spec(&self) -> Duration {
        Duration::from_secs(self.spec_seconds)
    }

    pub fn product(&self) -> Duration {
        Duration::from_secs(self.product_seconds)
    }

    pub fn portal(&self) -> Duration {
        Duration::from_secs(self.portal_seconds)
    }

    pub fn api(&self) -> Duration {
        Duration::from_secs(self.api_seconds)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            organization: String::new(),
            url: default_url(),
            api_version: default_api_version(),
            data_url: default_data_url(),
            auth: AuthConfig::default(),
            intervals: IntervalConfig::default(),
            filter: String::new(),
            spec_filter: String::new(),
            developer_id: String::new(),
            page_size: default_page_size(),
        }
    }
}

impl DiscoveryConfig {
    /// Strip trailing slashes so URL joins never produce `//`.
    pub fn normalize(&mut self) {
        self.url = self.url.trim_end_matches('/').to_string();
        self.data_url = self.data_url.trim_end_matches('/').to_string();
    }

    /// Reject configurations the agent cannot run with.
    pub fn validate(&self) -> Result<(), SyncError> {
        let required = [
            (&self.organization, "organization"),
            (&self.url, "url"),
            (&self.api_version, "api version"),
            (&self.data_url, "data url"),
            (&self.auth.username, "username"),
            (&self.auth.password, "password"),
            (&self.auth.token_url, "token url"),
            (&self.developer_id, "developer ID"),
        ];
        for (value, name) in required {
            if value.trim().is_empty() {
                return Err(SyncError::ConfigurationInvalid(format!(
                    "{} is not configured",
                    name
                )));
            }
        }

        let intervals = [
            (self.intervals.proxy_seconds, "proxy"),
            (self.intervals.spec_seconds, "spec"),
            (self.intervals.product_seconds, "product"),
            (self.intervals.portal_seconds, "portal"),
            (self.intervals.api_seconds, "api"),
        ];
        for (seconds, name) in intervals {
            if seconds == 0 {
                return Err(SyncError::ConfigurationInvalid(format!(
                    "{} interval must be greater than zero",
                    name
                )));
            }
        }

        if self.page_size == 0 {
            return Err(SyncError::ConfigurationInvalid(
                "page size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<DiscoveryConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: DiscoveryConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Load the file if present, layer `APIGEE_*` overrides on top, then validate.
pub fn resolve_config(path: impl AsRef<Path>) -> Result<DiscoveryConfig> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        load_config(path)?
    } else {
        DiscoveryConfig::default()
    };
    config.apply_env();
    config.normalize();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> DiscoveryConfig {
        let mut config = DiscoveryConfig::default();
        config.organization = "acme".to_string();
        config.auth.username = "user@acme.com".to_string();
        config.auth.password = "secret".to_string();
        config.developer_id = "dev@acme.com".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.url, "https://api.enterprise.apigee.com");
        assert_eq!(config.api_version, "v1");
        assert_eq!(config.data_url, "https://apigee.com/dapi/api");
        assert_eq!(config.intervals.proxy(), Duration::from_secs(30));
        assert_eq!(config.intervals.spec(), Duration::from_secs(1800));
        assert_eq!(config.intervals.product(), Duration::from_secs(300));
        assert_eq!(config.intervals.portal(), Duration::from_secs(60));
        assert_eq!(config.intervals.api(), Duration::from_secs(30));
        assert_eq!(config.page_size, 100);
        assert_eq!(config.auth.client_id, "edgecli");
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            organization = "acme"
            url = "https://mgmt.example.com/"
            developer_id = "dev@acme.com"
            filter = 'name =~ "^pet"'
            page_size = 25

            [auth]
            username = "user"
            password = "pass"

            [intervals]
            proxy_seconds = 10
            spec_seconds = 600
        "#;

        let mut config: DiscoveryConfig = toml::from_str(toml).unwrap();
        config.normalize();
        assert_eq!(config.organization, "acme");
        assert_eq!(config.url, "https://mgmt.example.com");
        assert_eq!(config.filter, "name =~ \"^pet\"");
        assert_eq!(config.page_size, 25);
        assert_eq!(config.intervals.proxy_seconds, 10);
        assert_eq!(config.intervals.spec_seconds, 600);
        // Untouched sections keep their defaults
        assert_eq!(config.intervals.portal_seconds, 60);
        assert_eq!(config.auth.token_url, DEFAULT_TOKEN_URL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_fields() {
        let mut config = valid_config();
        assert!(config.validate().is_ok());

        config.auth.password.clear();
        let err = config.validate().unwrap_err();
        assert_eq!(
            err,
            SyncError::ConfigurationInvalid("password is not configured".to_string())
        );

        let mut config = valid_config();
        config.developer_id = "  ".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("developer ID"));

        let mut config = valid_config();
        config.organization.clear();
        assert!(config.validate().unwrap_err().to_string().contains("organization"));
    }

    #[test]
    fn test_validate_zero_interval_and_page_size() {
        let mut config = valid_config();
        config.intervals.product_seconds = 0;
        assert!(config.validate().unwrap_err().to_string().contains("product interval"));

        let mut config = valid_config();
        config.page_size = 0;
        assert!(config.validate().unwrap_err().to_string().contains("page size"));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "organization = \"acme\"\ndeveloper_id = \"dev\"\n[auth]\nusername = \"u\"\npassword = \"p\""
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.organization, "acme");
        assert_eq!(config.auth.username, "u");
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "organization = ").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_auth_debug_hides_password() {
        let config = valid_config();
        let rendered = format!("{:?}", config.auth);
        assert!(rendered.contains("user@acme.com"));
        assert!(!rendered.contains("secret"));
    }
}
