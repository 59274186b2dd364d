//! HTTP interface backend.
//!
//! Statements are POSTed to the ClickHouse HTTP interface with
//! `default_format=JSONCompact`. The response body is kept as raw JSON
//! values so 64-bit integers and decimals survive without rounding.

use crate::db::backend::QueryBackend;
use crate::db::types::{HttpResult, RawResult};
use crate::error::{GatewayError, GatewayResult, from_http};
use crate::models::{EndpointConfig, TransportKind};
use async_trait::async_trait;
use humansize::{DECIMAL, format_size};
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

const RESPONSE_FORMAT: &str = "JSONCompact";
/// Longest server error body echoed back to the caller.
const MAX_ERROR_BODY: usize = 512;

pub struct HttpBackend {
    endpoint: EndpointConfig,
    base_url: Url,
    client: RwLock<Option<Client>>,
    /// Number of clients built so far
    generation: AtomicU64,
}

impl HttpBackend {
    /// Create a backend for the endpoint's HTTP port. No connection is opened yet.
    pub fn new(endpoint: EndpointConfig) -> GatewayResult<Self> {
        let url = endpoint
            .http_url()
            .ok_or_else(|| GatewayError::config("HTTP port is not configured"))?;
        let base_url = Url::parse(&url)
            .map_err(|e| GatewayError::config(format!("invalid HTTP address: {}", e)))?;
        Ok(Self {
            endpoint,
            base_url,
            client: RwLock::new(None),
            generation: AtomicU64::new(0),
        })
    }

    /// Get the cached client, building it on first use.
    async fn client(&self) -> GatewayResult<Client> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }

        let mut guard = self.client.write().await;
        // Re-check after acquiring the write lock
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .connect_timeout(self.endpoint.connect_timeout)
            .build()
            .map_err(|e| GatewayError::config(format!("failed to build HTTP client: {}", e)))?;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        info!(url = %self.base_url, generation, "Created HTTP client");
        *guard = Some(client.clone());
        Ok(client)
    }

    /// Query URL for one statement. Credentials travel in headers, never in the URL.
    fn query_url(&self, query_id: &Uuid) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("database", &self.endpoint.database)
            .append_pair("default_format", RESPONSE_FORMAT)
            .append_pair("query_id", &query_id.to_string());
        url
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url.as_str())
            .field("endpoint", &self.endpoint)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl QueryBackend for HttpBackend {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn attempt_ceiling(&self) -> Duration {
        self.endpoint.connect_timeout + self.endpoint.read_timeout
    }

    async fn execute(&self, sql: &str) -> GatewayResult<RawResult> {
        let client = self.client().await?;
        let query_id = Uuid::new_v4();
        let request_timeout = self.endpoint.read_timeout;

        let response = client
            .post(self.query_url(&query_id))
            .header("X-ClickHouse-User", &self.endpoint.username)
            .header("X-ClickHouse-Key", &self.endpoint.password)
            .body(sql.to_string())
            .timeout(request_timeout)
            .send()
            .await
            .map_err(|e| from_http(e).with_budget(request_timeout))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| from_http(e).with_budget(request_timeout))?;
        debug!(%query_id, status = status.as_u16(), size = %format_size(body.len(), DECIMAL), "HTTP response received");

        if !status.is_success() {
            return Err(GatewayError::transport(
                TransportKind::Http,
                format!("HTTP {}: {}", status.as_u16(), error_excerpt(&body)),
            ));
        }

        parse_body(&body)
    }

    async fn invalidate(&self) {
        if self.client.write().await.take().is_some() {
            debug!("Dropped HTTP client");
        }
    }

    async fn close(&self) {
        if self.client.write().await.take().is_some() {
            info!("Closed HTTP client");
        }
    }
}

/// Parse a successful response body. A statement with its own `FORMAT`
/// clause answers in that format, which is kept as text.
fn parse_body(body: &[u8]) -> GatewayResult<RawResult> {
    if let Ok(result) = serde_json::from_slice::<HttpResult>(body) {
        return Ok(RawResult::Http(result));
    }
    match std::str::from_utf8(body) {
        Ok(text) => Ok(RawResult::HttpText(text.to_string())),
        Err(_) => Err(GatewayError::normalization(
            TransportKind::Http,
            format!("response is neither {} nor UTF-8 text", RESPONSE_FORMAT),
        )),
    }
}

/// Trimmed, length-bounded excerpt of a server error body.
fn error_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
