//! Settings storage for reveille
//!
//! This crate keeps the alarm daemon's settings in a CouchDB database:
//! - [`CouchClient`] - the `GET`/`HEAD`/`PUT` document calls
//! - [`SettingsStore`] - typed get/set of named settings with revision checks
//!
//! # Example
//!
//! ```rust,no_run
//! use reveille_settings_client::SettingsStore;
//! use reveille_shared_config::CouchDbConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SettingsStore::from_config(&CouchDbConfig::from_env()?)?;
//!
//! store.set("alarm_enabled", &true).await?;
//! let enabled: Option<bool> = store.get("alarm_enabled").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variables
//!
//! - `COUCHDB_URL`: server URL, credentials allowed (default `http://localhost:5984`)
//! - `COUCHDB_DATABASE`: database name (default `settings`)
//! - `COUCHDB_TIMEOUT`: request timeout in seconds (default 10)

mod client;
mod error;
mod models;
mod store;

pub use client::CouchClient;
pub use error::{CouchError, CouchResult, SettingsError, SettingsResult};
pub use models::SettingDocument;
pub use store::SettingsStore;
