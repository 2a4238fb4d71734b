//! Shared configuration types for reveille services
//!
//! This crate provides the configuration types used by the MPD client, the
//! settings client and the alarm daemon, ensuring every component reads the
//! same environment variables with the same defaults.

mod couchdb;
mod error;
mod mpd;

pub use couchdb::CouchDbConfig;
pub use error::{ConfigError, ConfigResult};
pub use mpd::{
    MpdConfig, DEFAULT_IDLE_RECYCLE_MS, DEFAULT_MPD_HOST, DEFAULT_MPD_PORT, DEFAULT_POOL_SIZE,
    DEFAULT_REAP_INTERVAL_MS,
};

use std::env;

/// Common configuration shared between all services
#[derive(Debug, Clone)]
pub struct CommonConfig {
    /// MPD connection pool configuration
    pub mpd: MpdConfig,

    /// Settings storage configuration
    pub couchdb: CouchDbConfig,

    /// Environment mode (development, staging, production)
    pub environment: Environment,

    /// Log filter directives from RUST_LOG or LOG_LEVEL, if either is set
    pub log_level: Option<String>,
}

/// Application environment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        })
    }
}

impl Environment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if this is a development environment
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl CommonConfig {
    /// Load common configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            mpd: MpdConfig::from_env()?,
            couchdb: CouchDbConfig::from_env()?,
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string())
                .parse()
                .unwrap_or_default(),
            log_level: env::var("RUST_LOG")
                .or_else(|_| env::var("LOG_LEVEL"))
                .ok()
                .filter(|level| !level.trim().is_empty()),
        })
    }
}

/// Helper function to get an optional environment variable with a default
pub fn get_env_or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Helper function to parse an environment variable into a specific type
pub fn parse_env<T>(name: &str, default: T) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "production".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!(
            "prod".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!(
            "stage".parse::<Environment>().unwrap(),
            Environment::Staging
        );
        assert_eq!(
            "anything".parse::<Environment>().unwrap(),
            Environment::Development
        );
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(format!("{}", Environment::Production), "production");
        assert_eq!(format!("{}", Environment::Staging), "staging");
        assert_eq!(format!("{}", Environment::Development), "development");
    }

    #[test]
    fn test_log_level_falls_back_to_log_level_var() {
        temp_env::with_vars(
            [("RUST_LOG", None::<&str>), ("LOG_LEVEL", Some("debug"))],
            || {
                let config = CommonConfig::from_env().unwrap();
                assert_eq!(config.log_level.as_deref(), Some("debug"));
            },
        );
        temp_env::with_vars_unset(["RUST_LOG", "LOG_LEVEL"], || {
            assert_eq!(CommonConfig::from_env().unwrap().log_level, None);
        });
    }

    #[test]
    fn test_common_config_defaults() {
        temp_env::with_vars(
            [
                ("MPD_HOST", None::<&str>),
                ("MPD_PORT", None),
                ("MPD_POOL_SIZE", None),
                ("COUCHDB_URL", None),
                ("COUCHDB_DATABASE", None),
                ("ENVIRONMENT", Some("prod")),
            ],
            || {
                let config = CommonConfig::from_env().unwrap();
                assert_eq!(config.mpd, MpdConfig::default());
                assert_eq!(config.couchdb, CouchDbConfig::default());
                assert!(config.environment.is_production());
            },
        );
    }
}
