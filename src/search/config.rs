//! Search engine connection configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Search engine connection settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SearchConfig {
    /// Base URL of the search engine
    #[validate(length(min = 1))]
    #[serde(default = "default_search_url")]
    pub url: String,

    /// Alias consumers query; physical indices are `<alias>_v1` and `<alias>_v2`
    #[validate(length(min = 1, max = 200))]
    #[serde(default = "default_alias")]
    pub alias: String,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Per-request timeout in seconds
    #[validate(range(min = 1, max = 600))]
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for the blocking server-side reindex call
    #[validate(range(min = 1))]
    #[serde(default = "default_server_reindex_timeout")]
    pub reindex_timeout_secs: u64,
}

impl SearchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reindex_timeout(&self) -> Duration {
        Duration::from_secs(self.reindex_timeout_secs)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: default_search_url(),
            alias: default_alias(),
            username: None,
            password: None,
            request_timeout_secs: default_request_timeout(),
            reindex_timeout_secs: default_server_reindex_timeout(),
        }
    }
}

/// Builder for SearchConfig
#[derive(Debug, Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.config.alias = alias.into();
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn reindex_timeout_secs(mut self, secs: u64) -> Self {
        self.config.reindex_timeout_secs = secs;
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

fn default_search_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_alias() -> String {
    "marketplace_listings".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_server_reindex_timeout() -> u64 {
    1800
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SearchConfig::default();
        assert_eq!(config.alias, "marketplace_listings");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = SearchConfigBuilder::new()
            .url("http://search:9200")
            .alias("listings")
            .credentials("admin", "secret")
            .request_timeout_secs(5)
            .build();

        assert_eq!(config.url, "http://search:9200");
        assert_eq!(config.alias, "listings");
        assert_eq!(config.username.as_deref(), Some("admin"));
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn test_zero_timeout_is_invalid() {
        let config = SearchConfigBuilder::new().request_timeout_secs(0).build();
        assert!(config.validate().is_err());
    }
}
