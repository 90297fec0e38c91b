//! HTTP cache metadata client
//!
//! Talks to a small JSON service that keeps the `(component, content_hash)
//! → build_id` table. Authentication is a static bearer token supplied by the
//! environment; transport and credentials are managed outside this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CacheError;
use crate::store::{CacheEntry, CacheKey, CacheMetadataStore, CacheResult};

/// HTTP cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpCacheConfig {
    /// Base URL, e.g. `https://cache.internal/monoselect`
    pub base_url: String,
    /// Bearer token (optional for unauthenticated stores)
    pub token: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl HttpCacheConfig {
    /// Read `MONOSELECT_CACHE_URL` / `MONOSELECT_CACHE_TOKEN`.
    ///
    /// Returns `None` when no URL is configured.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("MONOSELECT_CACHE_URL")
            .ok()
            .filter(|url| !url.is_empty())?;
        Some(HttpCacheConfig {
            base_url,
            token: std::env::var("MONOSELECT_CACHE_TOKEN").ok(),
            timeout_secs: 10,
        })
    }

    /// Create config for a specific server
    pub fn new(base_url: &str) -> Self {
        HttpCacheConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            timeout_secs: 10,
        }
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

#[derive(Serialize)]
struct BatchGetRequest<'a> {
    keys: &'a [CacheKey],
}

#[derive(Deserialize)]
struct BatchGetResponse {
    #[serde(default)]
    entries: Vec<CacheEntry>,
}

/// Cache store backed by a remote JSON API
pub struct HttpCacheStore {
    config: HttpCacheConfig,
    http_client: reqwest::Client,
}

impl HttpCacheStore {
    /// Create a new client
    pub fn new(config: HttpCacheConfig) -> CacheResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("monoselect-cache/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(HttpCacheStore {
            config,
            http_client,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn check(response: reqwest::Response) -> CacheResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CacheError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl CacheMetadataStore for HttpCacheStore {
    async fn get_all(&self, keys: &[CacheKey]) -> CacheResult<Vec<CacheEntry>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/entries/batch-get", self.base());
        debug!(url = %url, keys = keys.len(), "querying cache store");

        let response = self
            .authorize(self.http_client.post(&url))
            .json(&BatchGetRequest { keys })
            .send()
            .await?;
        let body: BatchGetResponse = Self::check(response).await?.json().await?;

        // Only return entries that answer a key we asked for.
        Ok(body
            .entries
            .into_iter()
            .filter(|entry| keys.contains(&entry.key()))
            .collect())
    }

    async fn put(&self, entry: CacheEntry) -> CacheResult<()> {
        let url = format!(
            "{}/entries/{}/{}",
            self.base(),
            entry.component,
            entry.content_hash
        );
        info!(key = %entry.key(), build_id = %entry.build_id, "recording cache entry");

        let response = self
            .authorize(self.http_client.put(&url))
            .json(&entry)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
