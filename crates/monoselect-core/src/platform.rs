//! CI platform build history.
//!
//! Only one query is needed: "recent passed builds of branch X". The
//! [`CiPlatform`] trait keeps the resolver independent of the transport; the
//! Buildkite REST implementation lives here too.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SelectError};

/// A prior CI run, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub id: String,
    #[serde(default)]
    pub number: Option<u64>,
    pub commit: String,
    #[serde(default)]
    pub blocked: bool,
    pub web_url: String,
}

/// Build query. Only passed builds are ever requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFilter {
    pub branch: String,
    pub per_page: u32,
}

impl BuildFilter {
    pub fn passed(branch: &str, per_page: u32) -> Self {
        Self {
            branch: branch.to_string(),
            per_page,
        }
    }
}

/// Source of build history.
#[async_trait]
pub trait CiPlatform: Send + Sync {
    /// Passed builds of `filter.branch`, most recent first.
    async fn get_builds(&self, filter: &BuildFilter) -> Result<Vec<Build>>;
}

/// Buildkite REST API configuration
#[derive(Debug, Clone)]
pub struct BuildkiteConfig {
    pub api_url: String,
    pub organization: String,
    pub pipeline: String,
    pub token: String,
}

impl BuildkiteConfig {
    pub const DEFAULT_API_URL: &'static str = "https://api.buildkite.com";

    pub fn new(organization: &str, pipeline: &str, token: &str) -> Self {
        Self {
            api_url: Self::DEFAULT_API_URL.to_string(),
            organization: organization.to_string(),
            pipeline: pipeline.to_string(),
            token: token.to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    fn builds_url(&self) -> String {
        format!(
            "{}/v2/organizations/{}/pipelines/{}/builds",
            self.api_url.trim_end_matches('/'),
            self.organization,
            self.pipeline
        )
    }
}

/// Buildkite REST client
pub struct BuildkiteClient {
    config: BuildkiteConfig,
    http_client: reqwest::Client,
}

impl BuildkiteClient {
    pub fn new(config: BuildkiteConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("monoselect/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl CiPlatform for BuildkiteClient {
    async fn get_builds(&self, filter: &BuildFilter) -> Result<Vec<Build>> {
        let url = self.config.builds_url();
        debug!(url = %url, branch = %filter.branch, per_page = filter.per_page, "fetching passed builds");

        let per_page = filter.per_page.to_string();
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.config.token)
            .query(&[
                ("branch[]", filter.branch.as_str()),
                ("state", "passed"),
                ("per_page", per_page.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SelectError::Platform(format!(
                "GET {url} returned HTTP {status}: {body}"
            )));
        }

        Ok(response.json().await?)
    }
}
