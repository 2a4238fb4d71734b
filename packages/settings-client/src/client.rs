//! CouchDB document API client

use std::fmt;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use reveille_shared_config::CouchDbConfig;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{CouchError, CouchResult};
use crate::models::{DocumentUpdate, ErrorResponse, SettingDocument, WriteResponse};

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Client for the documents of one CouchDB database
#[derive(Clone)]
pub struct CouchClient {
    http_client: Client,
    database_url: Url,
    credentials: Option<(String, Option<String>)>,
}

impl fmt::Debug for CouchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouchClient")
            .field("database_url", &self.database_url.as_str())
            .field(
                "credentials",
                &self.credentials.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl CouchClient {
    /// Create a client for the configured database.
    ///
    /// Credentials embedded in the URL are sent as basic auth and never logged.
    pub fn new(config: &CouchDbConfig) -> CouchResult<Self> {
        let mut database_url = Url::parse(&config.database_url())
            .map_err(|e| CouchError::InvalidUrl(format!("{}: {e}", redact(&config.url))))?;

        let credentials = if database_url.username().is_empty() {
            None
        } else {
            let username = decode(database_url.username());
            let password = database_url.password().map(decode);
            // Cannot fail for http(s) URLs, which always have a host.
            let _ = database_url.set_username("");
            let _ = database_url.set_password(None);
            Some((username, password))
        };

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .user_agent("reveille/1.0")
            .build()?;

        Ok(Self {
            http_client,
            database_url,
            credentials,
        })
    }

    /// URL of a document, with the id percent-encoded as one path segment
    pub fn document_url(&self, id: &str) -> CouchResult<Url> {
        let mut url = self.database_url.clone();
        url.path_segments_mut()
            .map_err(|_| CouchError::InvalidUrl(self.database_url.to_string()))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    /// Fetch a document. A missing document is `None`.
    #[instrument(skip(self))]
    pub async fn get_document(&self, id: &str) -> CouchResult<Option<SettingDocument>> {
        let response = self.send(self.http_client.get(self.document_url(id)?)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(id, "Document not found");
                Ok(None)
            }
            status if status.is_success() => {
                let text = response.text().await.map_err(map_transport)?;
                Ok(Some(serde_json::from_str(&text)?))
            }
            _ => Err(api_error(response).await),
        }
    }

    /// Current revision of a document, read from the `ETag` header of a
    /// `HEAD` request. A missing document is `None`.
    #[instrument(skip(self))]
    pub async fn get_revision(&self, id: &str) -> CouchResult<Option<String>> {
        let response = self.send(self.http_client.head(self.document_url(id)?)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let etag = response
                    .headers()
                    .get(reqwest::header::ETAG)
                    .and_then(|value| value.to_str().ok())
                    .ok_or_else(|| CouchError::MissingRevision { id: id.to_string() })?;
                Ok(Some(strip_quotes(etag).to_string()))
            }
            status => Err(CouchError::Api {
                status: status.as_u16(),
                error: status.canonical_reason().unwrap_or("unknown").to_string(),
                reason: "HEAD request failed".to_string(),
            }),
        }
    }

    /// Create or update a document, returning its new revision.
    ///
    /// `revision` must be the current revision of an existing document and
    /// `None` for a new one; anything else is rejected by CouchDB as a conflict.
    #[instrument(skip(self, value))]
    pub async fn put_document(
        &self,
        id: &str,
        value: &Value,
        revision: Option<&str>,
    ) -> CouchResult<String> {
        let body = DocumentUpdate { value, revision };
        let response = self
            .send(self.http_client.put(self.document_url(id)?).json(&body))
            .await?;

        match response.status() {
            StatusCode::CONFLICT => {
                warn!(id, "Document update conflict");
                Err(CouchError::Conflict { id: id.to_string() })
            }
            status if status.is_success() => {
                let text = response.text().await.map_err(map_transport)?;
                let written: WriteResponse = serde_json::from_str(&text)?;
                debug!(id, revision = %written.rev, "Document written");
                Ok(written.rev)
            }
            _ => Err(api_error(response).await),
        }
    }

    async fn send(&self, request: RequestBuilder) -> CouchResult<Response> {
        let request = match &self.credentials {
            Some((username, password)) => request.basic_auth(username, password.as_ref()),
            None => request,
        };
        request.send().await.map_err(map_transport)
    }
}

fn map_transport(e: reqwest::Error) -> CouchError {
    if e.is_timeout() {
        CouchError::Timeout
    } else {
        CouchError::Http(e)
    }
}

async fn api_error(response: Response) -> CouchError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .ok()
        .and_then(|text| serde_json::from_str::<ErrorResponse>(&text).ok())
        .unwrap_or_default();
    CouchError::Api {
        status,
        error: body.error,
        reason: body.reason,
    }
}

/// CouchDB wraps revisions in double quotes in the `ETag` header
fn strip_quotes(etag: &str) -> &str {
    let etag = etag.strip_prefix('"').unwrap_or(etag);
    etag.strip_suffix('"').unwrap_or(etag)
}

/// Percent-decode a URL userinfo component
fn decode(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

/// Strip credentials from a URL before it ends up in a log line or error
fn redact(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if !url.username().is_empty() => {
            let _ = url.set_username("redacted");
            let _ = url.set_password(None);
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "[unparseable URL]".to_string(),
    }
}
