use super::{first_image_id, manifest_platform};
use crate::error::{AppError, AppResult};
use crate::platform::PlatformTag;
use crate::search::UpstreamSource;
use crate::store::{index_images_path, ContentStore};
use crate::types::Repository;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Serves a repository's stored image list to clients of a given platform.
pub struct ImageListRetriever {
    store: Arc<dyn ContentStore>,
    mirror: Option<Arc<dyn UpstreamSource>>,
}

impl ImageListRetriever {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            mirror: None,
        }
    }

    /// Fall back to `mirror` when nothing suitable is stored locally.
    pub fn with_mirror(mut self, mirror: Arc<dyn UpstreamSource>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Return the stored image list of `repo` as raw bytes.
    ///
    /// # Errors
    ///
    /// * [`AppError::NotFound`] when no index is stored (and no mirror has one)
    /// * [`AppError::PlatformMismatch`] when the first image was built for a
    ///   different platform than `platform`
    pub async fn get_repository_images(
        &self,
        repo: &Repository,
        platform: &PlatformTag,
    ) -> AppResult<Vec<u8>> {
        let local_error = match self.lookup_local(repo, platform).await {
            Ok(content) => return Ok(content),
            Err(e) if e.is_not_found() => e,
            Err(e) => return Err(e),
        };

        let Some(mirror) = &self.mirror else {
            return Err(local_error);
        };

        match mirror.repository_images(repo, platform).await {
            Ok(content) => {
                info!(repository = %repo, "Served image list from mirror source");
                Ok(content)
            }
            Err(e) => {
                warn!(repository = %repo, error = %e, "Mirror source lookup failed");
                Err(local_error)
            }
        }
    }

    async fn lookup_local(&self, repo: &Repository, platform: &PlatformTag) -> AppResult<Vec<u8>> {
        let path = index_images_path(repo);
        let content = self.store.get_content(&path).await.map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound("images not found".to_string()),
            other => other,
        })?;

        let Some(first_id) = first_image_id(&content, &path)? else {
            debug!(repository = %repo, "Image list is empty, skipping platform check");
            return Ok(content);
        };

        let actual = manifest_platform(self.store.as_ref(), &first_id)
            .await
            .unwrap_or_else(|e| {
                warn!(image_id = %first_id, error = %e, "Failed to read image manifest");
                None
            });

        match actual {
            Some(actual) if actual != *platform => {
                debug!(
                    repository = %repo,
                    requested = %platform,
                    actual = %actual,
                    "Stored images do not match requested platform"
                );
                Err(AppError::PlatformMismatch {
                    arch: platform.arch.clone(),
                    os: platform.os.clone(),
                })
            }
            _ => Ok(content),
        }
    }
}
