use super::SearchIndex;
use crate::error::AppResult;
use crate::events::{EventSink, RepositoryEvent};
use crate::index::stored_platform;
use crate::platform::PlatformTag;
use crate::store::{stored_repositories, ContentStore};
use crate::types::SearchResultEntry;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Backend for deployments without search; every query is empty.
pub struct NoSearchIndex;

#[async_trait]
impl SearchIndex for NoSearchIndex {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn results(
        &self,
        _term: &str,
        _platform: &PlatformTag,
    ) -> AppResult<Vec<SearchResultEntry>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Default)]
struct IndexedRepository {
    description: String,
    platforms: HashSet<PlatformTag>,
}

/// In-process search index fed by repository events, seeded from the store
/// at startup.
///
/// A repository is found when the term is a case-insensitive substring of
/// its name or description and it has been pushed for the queried platform.
/// Results are ordered by name.
#[derive(Default)]
pub struct MemorySearchIndex {
    repositories: RwLock<BTreeMap<String, IndexedRepository>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` (`namespace/repository`) as available for `platform`.
    pub fn register(&self, name: &str, description: Option<&str>, platform: PlatformTag) {
        let mut repositories = self
            .repositories
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = repositories.entry(name.to_string()).or_default();
        if let Some(description) = description {
            entry.description = description.to_string();
        }
        entry.platforms.insert(platform);
    }

    pub fn len(&self) -> usize {
        self.repositories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySearchIndex {
    fn notify(&self, event: &RepositoryEvent) {
        debug!(repository = %event.full_name(), "Indexing repository for search");
        self.register(&event.full_name(), None, event.platform());
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn results(
        &self,
        term: &str,
        platform: &PlatformTag,
    ) -> AppResult<Vec<SearchResultEntry>> {
        let needle = term.to_lowercase();
        let repositories = self
            .repositories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let results = repositories
            .iter()
            .filter(|(_, repo)| repo.platforms.contains(platform))
            .filter(|(name, repo)| {
                needle.is_empty()
                    || name.to_lowercase().contains(&needle)
                    || repo.description.to_lowercase().contains(&needle)
            })
            .map(|(name, repo)| SearchResultEntry::repository(name.as_str(), repo.description.as_str()))
            .collect();

        Ok(results)
    }

    /// A stored repository counts as pushed for the platform of its first
    /// image's manifest, or the default platform when that is unknown.
    async fn rebuild(&self, store: &dyn ContentStore) -> AppResult<usize> {
        let mut indexed = 0;
        for repo in stored_repositories(store).await? {
            let platform = match stored_platform(store, &repo).await {
                Ok(platform) => platform.unwrap_or_default(),
                Err(e) => {
                    warn!(repository = %repo, error = %e, "Skipping unreadable image list");
                    continue;
                }
            };
            self.register(&repo.to_string(), None, platform);
            indexed += 1;
        }
        Ok(indexed)
    }
}
