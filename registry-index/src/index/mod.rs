//! Repository image index
//!
//! This module owns the per-repository image list: merging pushed lists into
//! the stored one and serving the stored list back, filtered by platform.

use crate::error::{AppError, AppResult};
use crate::platform::PlatformTag;
use crate::store::{image_json_path, index_images_path, ContentStore};
use crate::types::{ImageRecord, Repository};
use serde_json::Value;
use tracing::{debug, warn};

mod merge;
mod retrieve;

#[cfg(test)]
mod tests;

pub use merge::*;
pub use retrieve::*;

/// Decode a pushed image list.
///
/// The payload must be a JSON array and every element must carry a usable
/// `id`. Nothing is read or written before this succeeds.
pub fn parse_incoming(raw: &[u8]) -> AppResult<Vec<Value>> {
    let data: Value = serde_json::from_slice(raw)
        .map_err(|_| AppError::MalformedInput("Error Decoding JSON".to_string()))?;

    let Value::Array(values) = data else {
        return Err(AppError::MalformedInput("Invalid data".to_string()));
    };

    for value in &values {
        record_from_value(value)?;
    }
    Ok(values)
}

/// Extract the `id` and `checksum` of one image record; other fields are
/// ignored.
pub fn record_from_value(value: &Value) -> AppResult<ImageRecord> {
    let Some(fields) = value.as_object() else {
        return Err(AppError::MalformedRecord(format!(
            "expected an object, got {value}"
        )));
    };

    let id = match fields.get("id") {
        Some(Value::String(id)) => id,
        Some(other) => {
            return Err(AppError::MalformedRecord(format!(
                "image id must be a string, got {other}"
            )))
        }
        None => return Err(AppError::MalformedRecord("image record has no id".to_string())),
    };
    validate_image_id(id)?;

    let checksum = match fields.get("checksum") {
        None | Some(Value::Null) => None,
        Some(Value::String(checksum)) => Some(checksum.clone()),
        Some(other) => {
            return Err(AppError::MalformedRecord(format!(
                "checksum of image {id} must be a string, got {other}"
            )))
        }
    };

    Ok(ImageRecord {
        id: id.clone(),
        checksum,
    })
}

/// Image ids become path segments of manifest lookups.
fn validate_image_id(id: &str) -> AppResult<()> {
    if id.is_empty() || id == "." || id == ".." || id.contains('/') || id.contains('\0') {
        return Err(AppError::MalformedRecord(format!("invalid image id: {id:?}")));
    }
    Ok(())
}

/// Parse a stored image list into records.
pub(crate) fn parse_stored(content: &[u8], path: &str) -> AppResult<Vec<ImageRecord>> {
    let values: Vec<Value> = serde_json::from_slice(content).map_err(|e| {
        AppError::InternalError(format!("Stored image list at {path} is unreadable: {e}"))
    })?;

    values
        .iter()
        .map(|value| {
            record_from_value(value).map_err(|e| {
                AppError::InternalError(format!("Stored image list at {path} is corrupt: {e}"))
            })
        })
        .collect()
}

/// Look up the platform declared by an image's manifest.
///
/// A missing manifest is expected (test fixtures, partially pushed images) and
/// yields `Ok(None)`, as does a manifest without `architecture`/`os`.
pub async fn manifest_platform(
    store: &dyn ContentStore,
    image_id: &str,
) -> AppResult<Option<PlatformTag>> {
    match store.get_content(&image_json_path(image_id)).await {
        Ok(manifest) => {
            let platform = PlatformTag::from_manifest(&manifest);
            if platform.is_none() {
                warn!(image_id = %image_id, "Image manifest does not declare architecture/os");
            }
            Ok(platform)
        }
        Err(AppError::NotFound(_)) => {
            debug!(image_id = %image_id, "No manifest stored for image");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Id of the first record of a stored image list, if any.
pub(crate) fn first_image_id(content: &[u8], path: &str) -> AppResult<Option<String>> {
    let list: Value = serde_json::from_slice(content).map_err(|e| {
        AppError::InternalError(format!("Stored image list at {path} is unreadable: {e}"))
    })?;

    let Value::Array(records) = list else {
        return Err(AppError::InternalError(format!(
            "Stored image list at {path} is not a list"
        )));
    };

    Ok(records
        .first()
        .and_then(|record| record.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string))
}

/// Platform of a stored repository, taken from the manifest of its first
/// image. `None` when the list is empty or the manifest declares nothing.
pub async fn stored_platform(
    store: &dyn ContentStore,
    repo: &Repository,
) -> AppResult<Option<PlatformTag>> {
    let path = index_images_path(repo);
    let content = store.get_content(&path).await?;
    match first_image_id(&content, &path)? {
        Some(id) => manifest_platform(store, &id).await,
        None => Ok(None),
    }
}
