//! Image byte storage for visual assets.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use url::Url;

use crate::error::AppError;
use crate::validation::require_valid_id;

/// Where a stored image and its thumbnail can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub blob_url: String,
    pub thumbnail_url: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, session_id: &str, asset_id: &str, bytes: &[u8]) -> Result<StoredBlob, AppError>;
}

/// Writes `<root>/<session_id>/<asset_id>.png` plus a `.thumb.png` sibling and
/// hands out `file://` URLs.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Ids become directory and file names, so they must be a single segment.
fn require_path_segment(field: &str, value: &str) -> Result<(), AppError> {
    require_valid_id(field, value)?;
    if value.contains(['/', '\\']) || value == "." || value.contains("..") {
        return Err(AppError::Validation(format!("{field} must not contain path separators")));
    }
    Ok(())
}

fn file_url(path: &Path) -> Result<String, AppError> {
    Url::from_file_path(path)
        .map(String::from)
        .map_err(|_| AppError::Internal(format!("blob path is not absolute: {}", path.display())))
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, session_id: &str, asset_id: &str, bytes: &[u8]) -> Result<StoredBlob, AppError> {
        require_path_segment("session_id", session_id)?;
        require_path_segment("asset_id", asset_id)?;

        let dir = std::path::absolute(self.root.join(session_id))?;
        tokio::fs::create_dir_all(&dir).await?;

        let blob_path = dir.join(format!("{asset_id}.png"));
        let thumb_path = dir.join(format!("{asset_id}.thumb.png"));
        tokio::fs::write(&blob_path, bytes).await?;
        // No image codec in the stack; the thumbnail is a copy
        tokio::fs::write(&thumb_path, bytes).await?;

        tracing::debug!(
            session_id,
            asset_id,
            bytes = bytes.len(),
            path = %blob_path.display(),
            "Stored visual asset"
        );

        Ok(StoredBlob {
            blob_url: file_url(&blob_path)?,
            thumbnail_url: file_url(&thumb_path)?,
        })
    }
}
