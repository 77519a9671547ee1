use super::{SearchIndex, UpstreamSource};
use crate::error::AppResult;
use crate::platform::PlatformTag;
use crate::types::{SearchResponse, SearchResultEntry};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Append upstream hits behind local ones, skipping repositories already
/// present.
///
/// Local hits keep their order and always win. Upstream hits without a
/// repository name cannot be matched and are kept.
pub fn merge_search_results(
    local: Vec<SearchResultEntry>,
    upstream: Vec<SearchResultEntry>,
) -> Vec<SearchResultEntry> {
    let mut seen: HashSet<String> = local
        .iter()
        .filter_map(|entry| entry.repository_key().map(str::to_string))
        .collect();

    let mut merged = local;
    for entry in upstream {
        match entry.repository_key() {
            Some(key) if !seen.insert(key.to_string()) => continue,
            _ => merged.push(entry),
        }
    }
    merged
}

/// Answers search queries from the local backend plus an optional mirror.
pub struct SearchAggregator {
    index: Arc<dyn SearchIndex>,
    mirror: Option<Arc<dyn UpstreamSource>>,
}

impl SearchAggregator {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self {
            index,
            mirror: None,
        }
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn UpstreamSource>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn is_mirroring(&self) -> bool {
        self.mirror.is_some()
    }

    /// Search locally and, when mirroring, upstream as well.
    ///
    /// Only a failure of the local backend fails the call; upstream errors
    /// degrade to local-only results.
    pub async fn search(&self, term: &str, platform: &PlatformTag) -> AppResult<SearchResponse> {
        let Some(mirror) = &self.mirror else {
            let local = self.index.results(term, platform).await?;
            debug!(term = %term, local = local.len(), "Search answered locally");
            return Ok(SearchResponse::new(term, local));
        };

        let (local, upstream) = tokio::join!(
            self.index.results(term, platform),
            mirror.search(term, platform)
        );
        let local = local?;

        let upstream = upstream.unwrap_or_else(|e| {
            warn!(term = %term, error = %e, "Upstream search failed, returning local results only");
            Vec::new()
        });

        debug!(
            term = %term,
            local = local.len(),
            upstream = upstream.len(),
            "Merging local and upstream search results"
        );
        Ok(SearchResponse::new(
            term,
            merge_search_results(local, upstream),
        ))
    }
}
