//! MPD connection pool configuration types

use std::time::Duration;

use crate::{get_env_or_default, parse_env, ConfigError, ConfigResult};

/// Default MPD host
pub const DEFAULT_MPD_HOST: &str = "localhost";

/// Default MPD port
pub const DEFAULT_MPD_PORT: u16 = 6600;

/// Default maximum number of pooled connections
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Idle connections are recycled once an hour by default
pub const DEFAULT_IDLE_RECYCLE_MS: u64 = 60 * 60 * 1000;

/// Default sweep interval for stale idle connections
pub const DEFAULT_REAP_INTERVAL_MS: u64 = 1000;

/// Configuration for the pool of MPD connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpdConfig {
    /// MPD server host
    pub host: String,

    /// MPD server port
    pub port: u16,

    /// Maximum number of live connections (idle + in use)
    pub max_size: usize,

    /// A connection idle for longer than this is destroyed
    pub idle_recycle_interval_ms: u64,

    /// How often the pool looks for stale idle connections
    pub reap_interval_ms: u64,
}

impl MpdConfig {
    /// Load MPD configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            host: get_env_or_default("MPD_HOST", DEFAULT_MPD_HOST),
            port: parse_env("MPD_PORT", DEFAULT_MPD_PORT)?,
            max_size: parse_env("MPD_POOL_SIZE", DEFAULT_POOL_SIZE)?,
            idle_recycle_interval_ms: parse_env("MPD_IDLE_RECYCLE_MS", DEFAULT_IDLE_RECYCLE_MS)?,
            reap_interval_ms: parse_env("MPD_REAP_INTERVAL_MS", DEFAULT_REAP_INTERVAL_MS)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration for a specific daemon address (useful for testing)
    pub fn with_address(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Override the pool size
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Override the idle recycle interval
    pub fn with_idle_recycle_interval(mut self, interval: Duration) -> Self {
        self.idle_recycle_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Override the sweep interval
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Check values that cannot be expressed through the types alone
    pub fn validate(&self) -> ConfigResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "MPD host must not be empty".to_string(),
            ));
        }
        if self.max_size == 0 {
            return Err(ConfigError::ValidationError(
                "MPD pool size must be at least 1".to_string(),
            ));
        }
        if self.reap_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "MPD reap interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// `host:port` pair used to open connections
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Idle recycle interval as a [`Duration`]
    pub fn idle_recycle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_recycle_interval_ms)
    }

    /// Sweep interval as a [`Duration`]
    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }
}

impl Default for MpdConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MPD_HOST.to_string(),
            port: DEFAULT_MPD_PORT,
            max_size: DEFAULT_POOL_SIZE,
            idle_recycle_interval_ms: DEFAULT_IDLE_RECYCLE_MS,
            reap_interval_ms: DEFAULT_REAP_INTERVAL_MS,
        }
    }
}
