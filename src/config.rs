use crate::error::{AppError, Result};
use crate::search::SearchConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

/// Environment variable naming an optional override file
pub const CONFIG_PATH_ENV: &str = "CATALOG_INDEXER_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Search engine connection
    #[serde(default)]
    pub search: SearchConfig,

    /// Relational store connection
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Reindex job tuning
    #[serde(default)]
    pub reindex: ReindexConfig,

    /// Attribute name resolution
    #[serde(default)]
    pub attributes: AttributesConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, the override file and environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load configuration with an explicit override file
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            // Override with environment variables (prefix: CATALOG_INDEXER__)
            .add_source(
                config::Environment::with_prefix("CATALOG_INDEXER")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("reindex.sanity_queries")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        self.database.validate()?;
        self.reindex.validate()?;
        self.attributes.validate()?;
        self.observability.validate()?;

        if self.database.backend == DatabaseBackend::Postgres && self.database.url.is_none() {
            return Err(AppError::Configuration(
                "database.url is required for the postgres backend".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: DatabaseBackend,

    /// Postgres connection string
    pub url: Option<String>,

    /// Connection pool size
    #[validate(range(min = 1, max = 200))]
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,

    #[validate(range(min = 1))]
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::default(),
            url: None,
            max_connections: default_pool_size(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseBackend {
    Postgres,
    #[default]
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReindexConfig {
    /// Listings per bulk request during a full rebuild
    #[validate(range(min = 1, max = 10000))]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Entities per batch when populating the attribute cache
    #[validate(range(min = 1, max = 10000))]
    #[serde(default = "default_cache_batch_size")]
    pub cache_batch_size: usize,

    /// Total time budget for one reindex run in seconds
    #[validate(range(min = 1))]
    #[serde(default = "default_reindex_budget")]
    pub timeout_secs: u64,

    /// A mutating phase is not started with less than this many seconds left
    #[serde(default = "default_min_phase_budget")]
    pub min_phase_budget_secs: u64,

    /// Free-text queries run against a freshly built index
    #[serde(default = "default_sanity_queries")]
    pub sanity_queries: Vec<String>,
}

impl ReindexConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn min_phase_budget(&self) -> Duration {
        Duration::from_secs(self.min_phase_budget_secs)
    }
}

impl Default for ReindexConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            cache_batch_size: default_cache_batch_size(),
            timeout_secs: default_reindex_budget(),
            min_phase_budget_secs: default_min_phase_budget(),
            sanity_queries: default_sanity_queries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AttributesConfig {
    #[validate(length(min = 2, max = 8))]
    #[serde(default = "default_preferred_locale")]
    pub preferred_locale: String,

    #[validate(length(min = 2, max = 8))]
    #[serde(default = "default_secondary_locale")]
    pub secondary_locale: String,
}

impl Default for AttributesConfig {
    fn default() -> Self {
        Self {
            preferred_locale: default_preferred_locale(),
            secondary_locale: default_secondary_locale(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Log level
    #[validate(length(min = 1))]
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics collection
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,

    /// Textfile-collector path written after each command
    pub metrics_textfile: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: true,
            metrics_textfile: None,
        }
    }
}

fn default_pool_size() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_batch_size() -> usize {
    500
}

fn default_cache_batch_size() -> usize {
    100
}

fn default_reindex_budget() -> u64 {
    3600
}

fn default_min_phase_budget() -> u64 {
    60
}

fn default_sanity_queries() -> Vec<String> {
    vec!["telefon".to_string(), "patike".to_string(), "auto".to_string()]
}

fn default_preferred_locale() -> String {
    "en".to_string()
}

fn default_secondary_locale() -> String {
    "sr".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_values() {
        assert_eq!(default_batch_size(), 500);
        assert_eq!(default_cache_batch_size(), 100);
        assert_eq!(default_sanity_queries().len(), 3);
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.search.alias, "marketplace_listings");
        assert_eq!(config.attributes.preferred_locale, "en");
        assert_eq!(config.attributes.secondary_locale, "sr");
        assert_eq!(config.reindex.batch_size, 500);
    }

    #[test]
    fn test_override_file_is_applied() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[database]\nbackend = \"memory\"\n\n[reindex]\nbatch_size = 250\n"
        )
        .unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();
        assert_eq!(config.database.backend, DatabaseBackend::Memory);
        assert_eq!(config.reindex.batch_size, 250);
    }

    #[test]
    fn test_postgres_backend_requires_url() {
        let mut config = Config::default();
        config.database.backend = DatabaseBackend::Postgres;
        config.database.url = None;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_out_of_range_batch_is_rejected() {
        let mut config = Config::default();
        config.reindex.batch_size = 0;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
