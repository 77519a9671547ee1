//! # Content Storage
//!
//! Key-value storage for raw bytes and JSON documents, addressed by
//! repository-scoped paths.
//!
//! ## Layout
//!
//! ```text
//! repositories/<namespace>/<name>/_index_images   image list of a repository
//! images/<image id>/json                          per-image manifest
//! ```
//!
//! ## Backends
//!
//! - [`MemoryStore`]: process-local map, used for tests and ephemeral servers
//! - [`LocalStore`]: files under the configured data directory
//!
//! Pushes to the same repository may race. Every backend offers
//! [`ContentStore::put_content_if`], a conditional write that only succeeds
//! when the stored value still equals what the writer read.

use crate::error::{AppError, AppResult};
use crate::types::Repository;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

mod local;
mod memory;

pub use local::LocalStore;
pub use memory::MemoryStore;

/// Storage contract consumed by the index components.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Read raw bytes. Missing paths fail with [`AppError::NotFound`].
    async fn get_content(&self, path: &str) -> AppResult<Vec<u8>>;

    /// Write raw bytes, replacing any previous value.
    async fn put_content(&self, path: &str, content: &[u8]) -> AppResult<()>;

    /// Write `content` only if the current value equals `expected`.
    ///
    /// `expected == None` requires the path to be absent. A mismatch fails with
    /// [`AppError::Conflict`] and leaves the stored value untouched.
    async fn put_content_if(
        &self,
        path: &str,
        expected: Option<&[u8]>,
        content: &[u8],
    ) -> AppResult<()>;

    /// Every stored path below the directory `prefix`, sorted.
    ///
    /// A prefix with nothing stored under it yields an empty list.
    async fn list(&self, prefix: &str) -> AppResult<Vec<String>>;

    async fn get_json(&self, path: &str) -> AppResult<Value> {
        let content = self.get_content(path).await?;
        serde_json::from_slice(&content).map_err(|e| {
            AppError::InternalError(format!("Stored document at {path} is not valid JSON: {e}"))
        })
    }

    async fn put_json(&self, path: &str, document: &Value) -> AppResult<()> {
        let content = serde_json::to_vec(document)?;
        self.put_content(path, &content).await
    }
}

const REPOSITORIES_DIR: &str = "repositories";
const INDEX_IMAGES_FILE: &str = "_index_images";

/// Path of the image list stored for a repository.
pub fn index_images_path(repo: &Repository) -> String {
    format!(
        "{REPOSITORIES_DIR}/{}/{}/{INDEX_IMAGES_FILE}",
        repo.namespace, repo.name
    )
}

/// Path of the manifest (image JSON) of a single image.
pub fn image_json_path(image_id: &str) -> String {
    format!("images/{image_id}/json")
}

/// Repositories that have an image list stored, in path order.
pub async fn stored_repositories(store: &dyn ContentStore) -> AppResult<Vec<Repository>> {
    let mut repositories = Vec::new();
    for path in store.list(REPOSITORIES_DIR).await? {
        let Some(repo) = repository_from_index_path(&path) else {
            continue;
        };
        repositories.push(repo);
    }
    Ok(repositories)
}

fn repository_from_index_path(path: &str) -> Option<Repository> {
    let rest = path
        .strip_prefix(REPOSITORIES_DIR)?
        .strip_prefix('/')?
        .strip_suffix(INDEX_IMAGES_FILE)?
        .strip_suffix('/')?;
    let (namespace, name) = rest.split_once('/')?;
    Repository::new(namespace, name).ok()
}

/// Serialize a document the way the index persists it.
pub fn to_document<T: Serialize>(value: &T) -> AppResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Build the configured storage backend.
pub fn load_store(backend: &str, data_dir: &std::path::Path) -> AppResult<Arc<dyn ContentStore>> {
    match backend.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "local" => Ok(Arc::new(LocalStore::new(data_dir))),
        other => Err(AppError::BadRequest(format!(
            "Unknown storage backend: {other}"
        ))),
    }
}
