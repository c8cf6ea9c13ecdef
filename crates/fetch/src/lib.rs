//! Mast fetch: download and parse remote application configs.

#![forbid(unsafe_code)]

mod client;
mod retry;

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use mast_core::{MastError, MastResult, Tags};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

pub use client::{ReqwestClient, TrustedOrigin};
pub use retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("transport: {0}")]
    Transport(String),
}

impl From<FetchError> for MastError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::InvalidUrl(u) => MastError::InvalidConfigUrl(u),
            FetchError::Transport(m) => MastError::Transport(m),
        }
    }
}

/// Outbound GET seam; the reqwest client in production, doubles in tests.
#[async_trait::async_trait]
pub trait HttpGet: Send + Sync {
    async fn get(&self, url: &Url) -> Result<HttpResponse, FetchError>;
}

/// Check scheme and host before anything goes over the wire.
pub fn parse_config_url(raw: &str) -> MastResult<Url> {
    let url = Url::parse(raw).map_err(|_| MastError::InvalidConfigUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(MastError::InvalidConfigUrl(raw.to_string()));
    }
    match url.host_str() {
        Some(h) if !h.is_empty() => Ok(url),
        _ => Err(MastError::InvalidConfigUrl(raw.to_string())),
    }
}

/// Parse a YAML body into a mapping. Empty documents are `None`.
pub fn parse_config_body(body: &[u8]) -> MastResult<Option<Tags>> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }
    let mut doc: serde_yaml::Value =
        serde_yaml::from_slice(body).map_err(|e| MastError::InvalidConfigYaml(e.to_string()))?;
    doc.apply_merge().map_err(|e| MastError::InvalidConfigYaml(e.to_string()))?;
    if doc.is_null() {
        return Ok(None);
    }
    let json = serde_json::to_value(&doc).map_err(|e| MastError::InvalidConfigYaml(e.to_string()))?;
    match json {
        Value::Object(map) => Ok(Some(map)),
        other => Err(MastError::InvalidConfigYaml(format!("expected a mapping, got {}", kind_of(&other)))),
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
        _ => "a scalar",
    }
}

/// Downloads configuration documents through an [`HttpGet`].
#[derive(Clone)]
pub struct ConfigFetcher {
    http: Arc<dyn HttpGet>,
}

impl ConfigFetcher {
    pub fn new(http: Arc<dyn HttpGet>) -> Self {
        Self { http }
    }

    pub async fn download(&self, raw_url: &str) -> MastResult<Option<Tags>> {
        let t0 = Instant::now();
        let url = parse_config_url(raw_url)?;
        let resp = self.http.get(&url).await?;
        if !resp.is_success() {
            metrics::counter!("config_fetch_total", "outcome" => "upstream_error").increment(1);
            return Err(MastError::UpstreamFetch { status: resp.status, url: raw_url.to_string() });
        }
        let parsed = parse_config_body(&resp.body);
        let outcome = if parsed.is_ok() { "ok" } else { "invalid_yaml" };
        metrics::counter!("config_fetch_total", "outcome" => outcome).increment(1);
        match &parsed {
            Ok(Some(cfg)) => info!(url = %raw_url, keys = cfg.len(), took_ms = %t0.elapsed().as_millis(), "fetch: config ok"),
            Ok(None) => debug!(url = %raw_url, "fetch: empty config document"),
            Err(e) => debug!(url = %raw_url, error = %e, "fetch: config rejected"),
        }
        parsed
    }
}

// ---- test double ----

/// Canned responses keyed by URL; unknown URLs answer 404.
#[derive(Default)]
pub struct StaticHttp {
    routes: std::collections::HashMap<String, HttpResponse>,
    hits: std::sync::atomic::AtomicUsize,
}

impl StaticHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, status: u16, body: &str) -> Self {
        self.routes.insert(url.to_string(), HttpResponse { status, body: Bytes::from(body.to_string()) });
        self
    }

    pub fn hits(&self) -> usize {
        self.hits.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl HttpGet for StaticHttp {
    async fn get(&self, url: &Url) -> Result<HttpResponse, FetchError> {
        self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(self
            .routes
            .get(url.as_str())
            .cloned()
            .unwrap_or(HttpResponse { status: 404, body: Bytes::new() }))
    }
}
