use crate::error::{AppError, AppResult};
use crate::platform::PlatformTag;
use crate::types::{Repository, SearchResultEntry};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Configuration for the mirrored upstream index.
///
/// # Fields
///
/// * `source_index` - Base URL of the upstream index (e.g. "https://index.docker.io")
/// * `timeout` - HTTP request timeout for upstream calls
/// * `enabled` - Whether upstream lookups are performed at all
#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    pub source_index: String,
    pub timeout: Duration,
    pub enabled: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            source_index: "https://index.docker.io".to_string(),
            timeout: Duration::from_secs(10),
            enabled: true,
        }
    }
}

/// A remote index this one mirrors.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Search hits of the upstream index for `term`.
    async fn search(&self, term: &str, platform: &PlatformTag)
        -> AppResult<Vec<SearchResultEntry>>;

    /// Raw image list the upstream index stores for `repo`.
    async fn repository_images(&self, repo: &Repository, platform: &PlatformTag)
        -> AppResult<Vec<u8>>;
}

/// HTTP client for the upstream index.
///
/// The caller's platform is forwarded as `arch/<arch> os/<os>` tokens in the
/// `User-Agent`, the same way Docker hosts announce it to this server.
pub struct UpstreamClient {
    client: Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    /// Create a new upstream client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be created.
    pub fn new(config: UpstreamConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        let base = self.config.source_index.trim_end_matches('/');
        Url::parse(&format!("{base}{path}")).map_err(|e| {
            AppError::InternalError(format!(
                "Invalid upstream source index '{}': {e}",
                self.config.source_index
            ))
        })
    }

    fn ensure_enabled(&self) -> AppResult<()> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(AppError::Upstream(
                "Upstream lookup is disabled in configuration".to_string(),
            ))
        }
    }
}

#[async_trait]
impl UpstreamSource for UpstreamClient {
    async fn search(
        &self,
        term: &str,
        platform: &PlatformTag,
    ) -> AppResult<Vec<SearchResultEntry>> {
        self.ensure_enabled()?;

        let mut url = self.endpoint("/v1/search")?;
        url.query_pairs_mut().append_pair("q", term);
        debug!(url = %url, "Searching upstream index");

        let response = self
            .client
            .get(url)
            .header(header::USER_AGENT, platform.user_agent())
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to reach upstream index");
                AppError::Upstream(format!("search request failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "search returned HTTP {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("invalid search response: {e}")))?;

        let results = match body.get("results") {
            Some(Value::Array(results)) => results
                .iter()
                .cloned()
                .filter_map(SearchResultEntry::from_value)
                .collect::<Vec<_>>(),
            _ => {
                return Err(AppError::Upstream(
                    "search response has no results list".to_string(),
                ))
            }
        };

        info!(term = %term, results = results.len(), "Fetched upstream search results");
        Ok(results)
    }

    async fn repository_images(
        &self,
        repo: &Repository,
        platform: &PlatformTag,
    ) -> AppResult<Vec<u8>> {
        self.ensure_enabled()?;

        let url = self.endpoint(&format!(
            "/v1/repositories/{}/{}/images",
            repo.namespace, repo.name
        ))?;
        debug!(url = %url, "Fetching image list from upstream index");

        let response = self
            .client
            .get(url)
            .header(header::USER_AGENT, platform.user_agent())
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to reach upstream index");
                AppError::Upstream(format!("image list request failed: {e}"))
            })?;

        match response.status() {
            status if status.is_success() => {
                let content = response.bytes().await.map_err(|e| {
                    AppError::Upstream(format!("failed to read upstream image list: {e}"))
                })?;
                info!(repository = %repo, "Fetched image list from upstream index");
                Ok(content.to_vec())
            }
            StatusCode::NOT_FOUND => Err(AppError::NotFound(format!(
                "images not found upstream for {repo}"
            ))),
            status => Err(AppError::Upstream(format!(
                "image list request returned HTTP {status}"
            ))),
        }
    }
}
