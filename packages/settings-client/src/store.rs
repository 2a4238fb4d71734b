//! Named settings on top of CouchDB documents
//!
//! Each setting is one document whose `_id` is the setting name and whose
//! `value` field holds the JSON payload. Writes are compare-and-swap: the
//! revision is read first and sent back with the new value, so a write that
//! races with another writer fails with a conflict instead of overwriting it.
//! There is no retry and no in-process locking per key.

use reveille_shared_config::CouchDbConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::client::CouchClient;
use crate::error::{CouchError, CouchResult, SettingsError, SettingsResult};

/// Durable store of named settings
#[derive(Debug, Clone)]
pub struct SettingsStore {
    client: CouchClient,
}

impl SettingsStore {
    /// Create a store over an existing client
    pub fn new(client: CouchClient) -> Self {
        Self { client }
    }

    /// Create a store from configuration
    pub fn from_config(config: &CouchDbConfig) -> CouchResult<Self> {
        Ok(Self::new(CouchClient::new(config)?))
    }

    /// Underlying CouchDB client
    pub fn client(&self) -> &CouchClient {
        &self.client
    }

    /// Load a setting. A setting that was never stored is `None`.
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, name: &str) -> SettingsResult<Option<T>> {
        self.load(name).await.map_err(|source| SettingsError::Get {
            name: name.to_string(),
            source,
        })
    }

    /// Store a setting, returning the new revision.
    ///
    /// Fails with a conflict when the document changed between reading its
    /// revision and writing it.
    #[instrument(skip(self, value))]
    pub async fn set<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> SettingsResult<String> {
        self.store(name, value)
            .await
            .map_err(|source| SettingsError::Set {
                name: name.to_string(),
                source,
            })
    }

    async fn load<T: DeserializeOwned>(&self, name: &str) -> CouchResult<Option<T>> {
        match self.client.get_document(name).await? {
            Some(document) => Ok(Some(serde_json::from_value(document.value)?)),
            None => Ok(None),
        }
    }

    async fn store<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> CouchResult<String> {
        let value = serde_json::to_value(value).map_err(CouchError::Parse)?;
        let revision = self.client.get_revision(name).await?;
        debug!(name, revision = ?revision, "Writing setting");
        self.client
            .put_document(name, &value, revision.as_deref())
            .await
    }
}
