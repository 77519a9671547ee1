//! # Registry Index
//!
//! The standalone "Index" of a v1 container-image registry. It tracks which
//! image ids belong to each repository, tags every push with the platform it
//! targets, and answers search queries, optionally merged with the results of
//! an upstream index it mirrors.
//!
//! ## Key Modules
//!
//! - [`index`]: merging pushed image lists and serving stored ones
//! - [`search`]: search backends, the upstream mirror client and result aggregation
//! - [`store`]: content storage contract and its backends
//! - [`events`]: repository created/updated notifications
//! - [`api`]: HTTP routes
//! - [`config`]: configuration loading
//! - [`error`]: error handling and standardized responses

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod index;
pub mod platform;
pub mod search;
pub mod server;
pub mod state;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{ApiErrorResponse, AppError, AppResult, ErrorCode};
pub use events::{BroadcastSink, EventBus, EventKind, EventSink, RepositoryEvent};
pub use index::{merge_image_lists, ImageIndexMerger, ImageListRetriever, IndexUpdate};
pub use platform::PlatformTag;
pub use search::{
    merge_search_results, SearchAggregator, SearchIndex, UpstreamClient, UpstreamConfig,
    UpstreamSource,
};
pub use server::run_server;
pub use state::AppState;
pub use store::{ContentStore, LocalStore, MemoryStore};
pub use types::{ImageList, ImageRecord, Repository, SearchResponse, SearchResultEntry};
