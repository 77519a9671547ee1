//! # Application State Management
//!
//! [`AppState`] wires the content store, the event bus, the search backend
//! and the optional mirror together once at startup. It is shared across all
//! request handlers behind an `Arc`.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use registry_index::{AppState, Config};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = Arc::new(AppState::from_config(Config::default()).await?);
//! let mut events = state.events.subscribe();
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::error::AppResult;
use crate::events::{BroadcastSink, EventBus, EventSink};
use crate::index::{ImageIndexMerger, ImageListRetriever};
use crate::search::{load_search_backend, SearchAggregator, UpstreamClient, UpstreamSource};
use crate::store::{load_store, ContentStore};
use std::sync::Arc;
use tracing::info;

/// Buffered repository events per subscriber before the slowest one lags.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Application state containing shared configuration and components.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ContentStore>,
    pub merger: Arc<ImageIndexMerger>,
    pub retriever: Arc<ImageListRetriever>,
    pub search: Arc<SearchAggregator>,
    /// Repository events for subscribers outside the index.
    pub events: Arc<BroadcastSink>,
}

impl AppState {
    /// Build every component from configuration.
    pub async fn from_config(config: Config) -> AppResult<Self> {
        let store = load_store(&config.storage.backend, &config.storage.data_dir)?;

        let mirror = match config.mirroring.upstream_config() {
            Some(upstream) => {
                info!(source_index = %upstream.source_index, "Mirroring upstream index");
                Some(Arc::new(UpstreamClient::new(upstream)?) as Arc<dyn UpstreamSource>)
            }
            None => None,
        };

        Self::build(config, store, mirror).await
    }

    /// Build the components around an explicit store and mirror.
    ///
    /// The search backend is seeded from what `store` already holds.
    pub async fn build(
        config: Config,
        store: Arc<dyn ContentStore>,
        mirror: Option<Arc<dyn UpstreamSource>>,
    ) -> AppResult<Self> {
        let mut bus = EventBus::new();
        let broadcast = Arc::new(BroadcastSink::new(EVENT_CHANNEL_CAPACITY));
        bus.subscribe(broadcast.clone());

        let index =
            load_search_backend(&config.search.backend, &mut bus, store.as_ref()).await?;
        let events: Arc<dyn EventSink> = Arc::new(bus);

        let merger = ImageIndexMerger::new(store.clone(), events);
        let mut retriever = ImageListRetriever::new(store.clone());
        let mut search = SearchAggregator::new(index);
        if let Some(mirror) = mirror {
            retriever = retriever.with_mirror(mirror.clone());
            search = search.with_mirror(mirror);
        }

        Ok(Self {
            config: Arc::new(config),
            store,
            merger: Arc::new(merger),
            retriever: Arc::new(retriever),
            search: Arc::new(search),
            events: broadcast,
        })
    }
}
