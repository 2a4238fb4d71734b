//! Daemon configuration loaded from environment variables
//!
//! MPD and CouchDB settings come from the shared configuration crate. The
//! daemon adds the station catalog seed and the alarm fade-in duration.

use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reveille_radio::{StationDraft, MIN_FADE_DURATION};
use reveille_shared_config::{CommonConfig, CouchDbConfig, Environment, MpdConfig};

/// Default fade-in when the alarm rings (100 steps of 500 ms)
pub const DEFAULT_FADE_DURATION_MS: u64 = 50_000;

/// Log filter used when neither RUST_LOG nor LOG_LEVEL is set
pub const DEFAULT_LOG_FILTER: &str =
    "reveille_alarmd=debug,reveille_radio=debug,reveille_mpd_client=info";

/// Alarm daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Stations seeded into the catalog at startup
    pub stations: Vec<StationDraft>,

    /// How long the alarm takes to reach full volume
    pub fade_duration: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        let stations = match env::var("RADIO_STATIONS") {
            Ok(raw) if !raw.trim().is_empty() => {
                serde_json::from_str(&raw).context("Invalid RADIO_STATIONS value")?
            }
            _ => Vec::new(),
        };

        let fade_ms: u64 = env::var("ALARM_FADE_DURATION_MS")
            .unwrap_or_else(|_| DEFAULT_FADE_DURATION_MS.to_string())
            .parse()
            .context("Invalid ALARM_FADE_DURATION_MS value")?;
        let fade_duration = Duration::from_millis(fade_ms);
        if fade_duration < MIN_FADE_DURATION {
            bail!(
                "ALARM_FADE_DURATION_MS must be at least {}",
                MIN_FADE_DURATION.as_millis()
            );
        }

        Ok(Self {
            common,
            stations,
            fade_duration,
        })
    }

    /// Get MPD configuration
    pub fn mpd(&self) -> &MpdConfig {
        &self.common.mpd
    }

    /// Get CouchDB configuration
    pub fn couchdb(&self) -> &CouchDbConfig {
        &self.common.couchdb
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    /// Tracing filter directives
    pub fn log_filter(&self) -> &str {
        self.common
            .log_level
            .as_deref()
            .unwrap_or(DEFAULT_LOG_FILTER)
    }
}
