//! Mock CouchDB server for settings tests
//!
//! Provides a [`MockCouchServer`] that keeps documents in memory and enforces
//! CouchDB's revision rules, so compare-and-swap behaviour can be tested
//! without a real database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Stateful mock of the CouchDB document API (`GET`, `HEAD`, `PUT`)
///
/// # Example
///
/// ```rust,ignore
/// use reveille_test_utils::MockCouchServer;
///
/// #[tokio::test]
/// async fn test_settings() {
///     let couch = MockCouchServer::start().await;
///     // Configure your client with couch.url() and couch.database()
///     couch.insert_document("alarm_enabled", serde_json::json!(true));
/// }
/// ```
pub struct MockCouchServer {
    server: MockServer,
    database: String,
    documents: Documents,
    put_count: Arc<AtomicUsize>,
}

type Documents = Arc<Mutex<HashMap<String, StoredDocument>>>;

#[derive(Debug, Clone)]
struct StoredDocument {
    generation: u64,
    value: Value,
}

impl StoredDocument {
    fn revision(&self) -> String {
        format!("{}-{:032x}", self.generation, self.generation * 0x9e37_79b9)
    }
}

impl MockCouchServer {
    /// Start a mock serving the `settings` database
    pub async fn start() -> Self {
        Self::start_with_database("settings").await
    }

    /// Start a mock serving the given database
    pub async fn start_with_database(database: &str) -> Self {
        let server = MockServer::start().await;
        let mock = Self {
            server,
            database: database.to_string(),
            documents: Arc::new(Mutex::new(HashMap::new())),
            put_count: Arc::new(AtomicUsize::new(0)),
        };
        mock.mount_document_api().await;
        mock
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Database name served by this mock
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Current revision of a document, if it exists
    pub fn revision(&self, id: &str) -> Option<String> {
        self.lock().get(id).map(StoredDocument::revision)
    }

    /// Current `value` of a document, if it exists
    pub fn value(&self, id: &str) -> Option<Value> {
        self.lock().get(id).map(|doc| doc.value.clone())
    }

    /// Write a document directly, bumping its revision.
    ///
    /// Simulates another writer updating the store behind the client's back.
    pub fn insert_document(&self, id: &str, value: Value) -> String {
        let mut documents = self.lock();
        let generation = documents.get(id).map(|doc| doc.generation).unwrap_or(0) + 1;
        let document = StoredDocument { generation, value };
        let revision = document.revision();
        documents.insert(id.to_string(), document);
        revision
    }

    /// Number of `PUT` requests received
    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    /// Replace the document API with one answering every request with `status`
    pub async fn fail_all(&self, status: u16) {
        self.server.reset().await;
        Mock::given(path_regex(self.document_pattern()))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": "internal_server_error",
                "reason": "mock failure"
            })))
            .mount(&self.server)
            .await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredDocument>> {
        self.documents.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn document_pattern(&self) -> String {
        format!("^/{}/[^/]+$", self.database)
    }

    async fn mount_document_api(&self) {
        Mock::given(method("GET"))
            .and(path_regex(self.document_pattern()))
            .respond_with(GetDocument(Arc::clone(&self.documents)))
            .mount(&self.server)
            .await;

        Mock::given(method("HEAD"))
            .and(path_regex(self.document_pattern()))
            .respond_with(HeadDocument(Arc::clone(&self.documents)))
            .mount(&self.server)
            .await;

        Mock::given(method("PUT"))
            .and(path_regex(self.document_pattern()))
            .respond_with(PutDocument {
                documents: Arc::clone(&self.documents),
                put_count: Arc::clone(&self.put_count),
            })
            .mount(&self.server)
            .await;
    }
}

fn document_id(request: &Request) -> String {
    request
        .url
        .path_segments()
        .and_then(|segments| segments.last())
        .unwrap_or_default()
        .to_string()
}

fn not_found() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "error": "not_found",
        "reason": "missing"
    }))
}

fn conflict() -> ResponseTemplate {
    ResponseTemplate::new(409).set_body_json(json!({
        "error": "conflict",
        "reason": "Document update conflict."
    }))
}

struct GetDocument(Documents);

impl Respond for GetDocument {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id = document_id(request);
        let documents = self.0.lock().unwrap_or_else(|e| e.into_inner());
        match documents.get(&id) {
            Some(document) => ResponseTemplate::new(200).set_body_json(json!({
                "_id": id,
                "_rev": document.revision(),
                "value": document.value,
            })),
            None => not_found(),
        }
    }
}

struct HeadDocument(Documents);

impl Respond for HeadDocument {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id = document_id(request);
        let documents = self.0.lock().unwrap_or_else(|e| e.into_inner());
        match documents.get(&id) {
            Some(document) => ResponseTemplate::new(200)
                .insert_header("ETag", format!("\"{}\"", document.revision()).as_str()),
            None => ResponseTemplate::new(404),
        }
    }
}

struct PutDocument {
    documents: Documents,
    put_count: Arc<AtomicUsize>,
}

impl Respond for PutDocument {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.put_count.fetch_add(1, Ordering::SeqCst);
        let id = document_id(request);

        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => {
                return ResponseTemplate::new(400).set_body_json(json!({
                    "error": "bad_request",
                    "reason": "invalid UTF-8 JSON"
                }))
            }
        };
        let sent_revision = body.get("_rev").and_then(Value::as_str);

        let mut documents = self.documents.lock().unwrap_or_else(|e| e.into_inner());
        let current = documents.get(&id);
        let generation = match (current, sent_revision) {
            (None, None) => 1,
            (Some(document), Some(rev)) if document.revision() == rev => document.generation + 1,
            _ => return conflict(),
        };

        let document = StoredDocument {
            generation,
            value: body.get("value").cloned().unwrap_or(Value::Null),
        };
        let revision = document.revision();
        documents.insert(id.clone(), document);

        ResponseTemplate::new(201).set_body_json(json!({
            "ok": true,
            "id": id,
            "rev": revision,
        }))
    }
}
