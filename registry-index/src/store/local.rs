use super::ContentStore;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Content store backed by files under a data directory.
pub struct LocalStore {
    root: PathBuf,
    /// Serializes conditional writes within this process.
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a store path onto the filesystem, rejecting anything that could
    /// escape the data directory.
    fn resolve(&self, path: &str) -> AppResult<PathBuf> {
        if path.is_empty() || path.contains('\0') {
            return Err(AppError::BadRequest(format!("Invalid storage path: {path:?}")));
        }

        let relative = Path::new(path);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            warn!(path = %path, "Rejected unsafe storage path");
            return Err(AppError::BadRequest(format!("Unsafe storage path: {path}")));
        }

        Ok(self.root.join(relative))
    }

    /// Inverse of [`Self::resolve`] for files found on disk.
    fn store_path(&self, file: &Path) -> Option<String> {
        let relative = file.strip_prefix(&self.root).ok()?;
        let parts = relative
            .components()
            .map(|component| match component {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join("/"))
    }

    async fn read(&self, file: &Path, path: &str) -> AppResult<Option<Vec<u8>>> {
        match fs::read(file).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path, "Path not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write through a temporary sibling and rename, so readers never observe
    /// a partially written document.
    async fn write(&self, file: &Path, content: &[u8]) -> AppResult<()> {
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).await?;
            debug!(parent = %parent.display(), "Created parent directory");
        }

        let mut tmp = file.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, content).await?;
        fs::rename(&tmp, file).await?;
        info!(
            path = %file.display(),
            size = content.len(),
            "File saved successfully"
        );
        Ok(())
    }
}

#[async_trait]
impl ContentStore for LocalStore {
    async fn get_content(&self, path: &str) -> AppResult<Vec<u8>> {
        let file = self.resolve(path)?;
        self.read(&file, path)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Path not found: {path}")))
    }

    async fn put_content(&self, path: &str, content: &[u8]) -> AppResult<()> {
        let file = self.resolve(path)?;
        let _guard = self.write_lock.lock().await;
        self.write(&file, content).await
    }

    async fn put_content_if(
        &self,
        path: &str,
        expected: Option<&[u8]>,
        content: &[u8],
    ) -> AppResult<()> {
        let file = self.resolve(path)?;
        let _guard = self.write_lock.lock().await;

        let current = self.read(&file, path).await?;
        if current.as_deref() != expected {
            warn!(path = %path, "Conditional write lost a race");
            return Err(AppError::Conflict(path.to_string()));
        }

        self.write(&file, content).await
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<String>> {
        let prefix = prefix.trim_matches('/');
        let mut pending = vec![self.resolve(prefix)?];
        let mut paths = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let file = entry.path();
                if file_type.is_dir() {
                    pending.push(file);
                    continue;
                }
                // In-flight writes
                if file.extension().is_some_and(|ext| ext == "tmp") {
                    continue;
                }
                if let Some(path) = self.store_path(&file) {
                    paths.push(path);
                }
            }
        }

        paths.sort();
        debug!(prefix = %prefix, count = paths.len(), "Listed stored paths");
        Ok(paths)
    }
}
