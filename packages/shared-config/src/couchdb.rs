//! CouchDB settings storage configuration types

use crate::{get_env_or_default, parse_env, ConfigError, ConfigResult};

/// CouchDB configuration for the settings database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouchDbConfig {
    /// CouchDB server URL (may carry credentials)
    pub url: String,

    /// Database holding one document per setting
    pub database: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl CouchDbConfig {
    /// Load CouchDB configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            url: get_env_or_default("COUCHDB_URL", "http://localhost:5984"),
            database: get_env_or_default("COUCHDB_DATABASE", "settings"),
            timeout_secs: parse_env("COUCHDB_TIMEOUT", 10)?,
        };

        if !config.url.starts_with("http://") && !config.url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(
                "COUCHDB_URL".to_string(),
                config.url.clone(),
            ));
        }
        if config.database.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "CouchDB database name must not be empty".to_string(),
            ));
        }

        Ok(config)
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Base URL of the settings database
    pub fn database_url(&self) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), self.database)
    }

    /// URL of a single document in the settings database
    pub fn document_url(&self, id: &str) -> String {
        format!("{}/{}", self.database_url(), id)
    }
}

impl Default for CouchDbConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5984".to_string(),
            database: "settings".to_string(),
            timeout_secs: 10,
        }
    }
}
