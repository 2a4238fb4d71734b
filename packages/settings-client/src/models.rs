//! CouchDB document models

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored setting: CouchDB's `_id`/`_rev` plus the opaque `value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev")]
    pub revision: String,
    #[serde(default)]
    pub value: Value,
}

/// Body of a document write. `_rev` is omitted when creating a document.
#[derive(Debug, Serialize)]
pub(crate) struct DocumentUpdate<'a> {
    pub value: &'a Value,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub revision: Option<&'a str>,
}

/// Reply to a successful `PUT`
#[derive(Debug, Deserialize)]
pub(crate) struct WriteResponse {
    pub rev: String,
}

/// Error body returned by CouchDB on failure
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub reason: String,
}
