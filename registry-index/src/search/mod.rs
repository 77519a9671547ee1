//! # Repository Search
//!
//! Search is answered by a pluggable [`SearchIndex`] backend and, when the
//! index mirrors another one, by an [`UpstreamSource`] whose hits are merged
//! behind the local ones.
//!
//! ```text
//! SearchAggregator
//!     ├── SearchIndex (backend chosen by `search.backend`)
//!     │       ├── NoSearchIndex      "none"
//!     │       └── MemorySearchIndex  "memory"
//!     └── UpstreamSource (optional, best-effort)
//!             └── UpstreamClient     HTTP
//! ```

use crate::error::{AppError, AppResult};
use crate::events::EventBus;
use crate::platform::PlatformTag;
use crate::store::ContentStore;
use crate::types::SearchResultEntry;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

mod aggregate;
mod memory;
mod upstream;

pub use aggregate::{merge_search_results, SearchAggregator};
pub use memory::{MemorySearchIndex, NoSearchIndex};
pub use upstream::{UpstreamClient, UpstreamConfig, UpstreamSource};

/// A local search backend.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Backend name as used in configuration.
    fn name(&self) -> &'static str;

    /// Entries matching `term`, in the backend's own order. How `platform`
    /// narrows the results is up to the backend.
    async fn results(&self, term: &str, platform: &PlatformTag)
        -> AppResult<Vec<SearchResultEntry>>;

    /// Index the repositories already present in `store`, returning how many
    /// were added. Backends that keep no state of their own do nothing.
    async fn rebuild(&self, _store: &dyn ContentStore) -> AppResult<usize> {
        Ok(0)
    }
}

/// Builds a backend and wires it to the repository events it needs.
pub type BackendConstructor = fn(&mut EventBus) -> Arc<dyn SearchIndex>;

/// Backends selectable through `search.backend`.
pub const SEARCH_BACKENDS: &[(&str, BackendConstructor)] = &[
    ("none", build_none_backend),
    ("memory", build_memory_backend),
];

fn build_none_backend(_bus: &mut EventBus) -> Arc<dyn SearchIndex> {
    Arc::new(NoSearchIndex)
}

fn build_memory_backend(bus: &mut EventBus) -> Arc<dyn SearchIndex> {
    let index = Arc::new(MemorySearchIndex::new());
    bus.subscribe(index.clone());
    index
}

/// Resolve the configured backend name and index what `store` already holds.
/// Called once at startup.
pub async fn load_search_backend(
    name: &str,
    bus: &mut EventBus,
    store: &dyn ContentStore,
) -> AppResult<Arc<dyn SearchIndex>> {
    let wanted = name.to_lowercase();
    let (_, build) = SEARCH_BACKENDS
        .iter()
        .find(|(backend, _)| *backend == wanted)
        .ok_or_else(|| {
            let known: Vec<&str> = SEARCH_BACKENDS.iter().map(|(backend, _)| *backend).collect();
            AppError::BadRequest(format!(
                "Unknown search backend: {name} (available: {})",
                known.join(", ")
            ))
        })?;

    let index = build(bus);
    let indexed = index.rebuild(store).await?;
    info!(backend = %index.name(), repositories = indexed, "Search backend loaded");
    Ok(index)
}
