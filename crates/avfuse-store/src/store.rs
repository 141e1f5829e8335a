//! The store seam.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StoreError;

/// Naming hints for an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadHints {
    /// Stable identifier the artifact is stored under. Re-uploading with the
    /// same id overwrites the previous artifact.
    pub public_id: String,
    /// Target folder; `None` uses the store's configured folder.
    pub folder: Option<String>,
}

impl UploadHints {
    pub fn with_public_id(public_id: impl Into<String>) -> Self {
        Self {
            public_id: public_id.into(),
            folder: None,
        }
    }
}

/// A persisted artifact as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Publicly reachable URL of the artifact.
    pub url: String,
    /// Store-assigned identifier, echoed back to callers.
    pub id: String,
}

/// Uploads finished artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload the file at `local` and return where it landed.
    async fn upload(
        &self,
        local: &Path,
        hints: &UploadHints,
    ) -> Result<StoredArtifact, StoreError>;
}
