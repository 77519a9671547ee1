use super::ContentStore;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// In-process content store.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get_content(&self, path: &str) -> AppResult<Vec<u8>> {
        self.entries
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Path not found: {path}")))
    }

    async fn put_content(&self, path: &str, content: &[u8]) -> AppResult<()> {
        self.entries
            .write()
            .await
            .insert(path.to_string(), content.to_vec());
        debug!(path = %path, size = content.len(), "Stored content in memory");
        Ok(())
    }

    async fn put_content_if(
        &self,
        path: &str,
        expected: Option<&[u8]>,
        content: &[u8],
    ) -> AppResult<()> {
        let mut entries = self.entries.write().await;
        if entries.get(path).map(Vec::as_slice) != expected {
            return Err(AppError::Conflict(path.to_string()));
        }
        entries.insert(path.to_string(), content.to_vec());
        debug!(path = %path, size = content.len(), "Conditionally stored content in memory");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<String>> {
        let dir = format!("{}/", prefix.trim_matches('/'));
        let mut paths: Vec<String> = self
            .entries
            .read()
            .await
            .keys()
            .filter(|path| path.starts_with(&dir))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }
}
