use super::{manifest_platform, parse_incoming, parse_stored, record_from_value};
use crate::error::{AppError, AppResult};
use crate::events::{EventKind, EventSink, RepositoryEvent};
use crate::platform::PlatformTag;
use crate::store::{index_images_path, to_document, ContentStore};
use crate::types::{ImageList, ImageRecord, Repository};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Merge a pushed image list into the stored one.
///
/// Records are scanned pushed-first. Once an id holds a non-empty checksum it
/// is never replaced; otherwise a later record for the same id overwrites it.
/// Only `id` and `checksum` survive.
pub fn merge_image_lists(incoming: &[ImageRecord], existing: &[ImageRecord]) -> ImageList {
    let mut merged = ImageList::new();

    for record in incoming.iter().chain(existing) {
        if merged
            .get(&record.id)
            .is_some_and(ImageRecord::has_checksum)
        {
            continue;
        }
        merged.upsert(ImageRecord {
            id: record.id.clone(),
            checksum: record.checksum.clone(),
        });
    }

    merged
}

/// Outcome of a push.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexUpdate {
    pub kind: EventKind,
    /// Raw pushed list for a creation, merged list for an update.
    pub value: Value,
    /// Platform the push was tagged with.
    pub platform: PlatformTag,
}

/// Reconciles pushed image lists with the stored index and announces the
/// result.
pub struct ImageIndexMerger {
    store: Arc<dyn ContentStore>,
    events: Arc<dyn EventSink>,
}

impl ImageIndexMerger {
    pub fn new(store: Arc<dyn ContentStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    /// Store the pushed list for `repo` and raise `Created` or `Updated`.
    ///
    /// `platform` is the caller's declared platform; the manifest of the
    /// first pushed image overrides it when one is stored.
    ///
    /// # Errors
    ///
    /// * [`AppError::MalformedInput`] / [`AppError::MalformedRecord`] for a bad payload
    /// * [`AppError::Conflict`] when another push changed the index in between
    pub async fn update_index_images(
        &self,
        repo: &Repository,
        raw: &[u8],
        platform: PlatformTag,
    ) -> AppResult<IndexUpdate> {
        let incoming_values = parse_incoming(raw)?;
        let incoming = incoming_values
            .iter()
            .map(record_from_value)
            .collect::<AppResult<Vec<_>>>()?;

        let path = index_images_path(repo);
        let (kind, value) = match self.store.get_content(&path).await {
            Err(AppError::NotFound(_)) => {
                self.store.put_content_if(&path, None, raw).await?;
                info!(repository = %repo, images = incoming.len(), "Created repository index");
                (EventKind::Created, Value::Array(incoming_values))
            }
            Err(e) => return Err(e),
            Ok(existing_raw) => {
                let existing = parse_stored(&existing_raw, &path)?;
                let merged = merge_image_lists(&incoming, &existing);
                debug!(
                    repository = %repo,
                    incoming = incoming.len(),
                    existing = existing.len(),
                    merged = merged.len(),
                    "Merged image lists"
                );

                let document = to_document(&merged)?;
                self.store
                    .put_content_if(&path, Some(existing_raw.as_slice()), &document)
                    .await?;
                info!(repository = %repo, images = merged.len(), "Updated repository index");
                (EventKind::Updated, merged.to_value())
            }
        };

        let platform = self.resolve_platform(incoming.first(), platform).await;

        let event = RepositoryEvent::new(kind, repo, value.clone(), &platform);
        self.events.notify(&event);

        Ok(IndexUpdate {
            kind,
            value,
            platform,
        })
    }

    async fn resolve_platform(
        &self,
        first: Option<&ImageRecord>,
        declared: PlatformTag,
    ) -> PlatformTag {
        let Some(first) = first else {
            return declared;
        };

        match manifest_platform(self.store.as_ref(), &first.id).await {
            Ok(Some(platform)) => {
                debug!(image_id = %first.id, platform = %platform, "Platform taken from image manifest");
                platform
            }
            Ok(None) => declared,
            Err(e) => {
                // The index is already written; keep the declared platform.
                warn!(image_id = %first.id, error = %e, "Failed to read image manifest");
                declared
            }
        }
    }
}
