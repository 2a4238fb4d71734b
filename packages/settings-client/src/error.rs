//! Settings storage error types

use thiserror::Error;

/// CouchDB API errors
#[derive(Error, Debug)]
pub enum CouchError {
    /// Invalid server URL or document id
    #[error("Invalid CouchDB URL: {0}")]
    InvalidUrl(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request timed out
    #[error("Request to CouchDB timed out")]
    Timeout,

    /// Body could not be encoded or decoded
    #[error("Failed to parse CouchDB document: {0}")]
    Parse(#[from] serde_json::Error),

    /// The document changed since its revision was read
    #[error("Document update conflict for \"{id}\"")]
    Conflict { id: String },

    /// A HEAD reply without a usable `ETag` header
    #[error("CouchDB returned no revision for \"{id}\"")]
    MissingRevision { id: String },

    /// Any other non-success reply
    #[error("CouchDB error {status}: {error} ({reason})")]
    Api {
        status: u16,
        error: String,
        reason: String,
    },
}

impl CouchError {
    /// Check if the write lost a compare-and-swap race
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Settings store errors. The cause is kept as the error source.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Cannot get value")]
    Get {
        name: String,
        #[source]
        source: CouchError,
    },

    #[error("Cannot set value")]
    Set {
        name: String,
        #[source]
        source: CouchError,
    },
}

impl SettingsError {
    /// Name of the setting the operation was about
    pub fn name(&self) -> &str {
        match self {
            Self::Get { name, .. } | Self::Set { name, .. } => name,
        }
    }

    /// Underlying CouchDB failure
    pub fn cause(&self) -> &CouchError {
        match self {
            Self::Get { source, .. } | Self::Set { source, .. } => source,
        }
    }

    /// Check if a set failed because another writer got there first
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Set { source, .. } if source.is_conflict())
    }
}

/// Result type for CouchDB operations
pub type CouchResult<T> = Result<T, CouchError>;

/// Result type for settings operations
pub type SettingsResult<T> = Result<T, SettingsError>;
