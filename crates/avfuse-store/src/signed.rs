//! Signed multipart upload store.
//!
//! Requests carry a SHA-256 signature over the alphabetically sorted
//! non-file parameters with the API secret appended, the scheme used by
//! Cloudinary-compatible upload endpoints. The artifact itself travels as a
//! multipart file part alongside the signed fields.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use crate::error::StoreError;
use crate::store::{ArtifactStore, StoredArtifact, UploadHints};

/// Upload endpoint base used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.cloudinary.com/v1_1";

/// Folder artifacts land in when neither config nor hints name one.
pub const DEFAULT_FOLDER: &str = "avfuse_outputs";

const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Credentials and endpoint settings for the signed upload store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Endpoint base, `{base_url}/{cloud}/video/upload` is the upload URL.
    pub base_url: String,
    /// Tenant identifier within the store.
    pub cloud: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
    /// Whole-request ceiling for one upload.
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cloud: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            folder: DEFAULT_FOLDER.to_string(),
            timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadReply {
    secure_url: String,
    public_id: String,
}

/// [`ArtifactStore`] uploading over authenticated multipart HTTP.
#[derive(Debug)]
pub struct SignedUploadStore {
    client: reqwest::Client,
    endpoint: Url,
    config: StoreConfig,
}

impl SignedUploadStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let endpoint = upload_endpoint(&config.base_url, &config.cloud)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }
}

#[async_trait]
impl ArtifactStore for SignedUploadStore {
    async fn upload(
        &self,
        local: &Path,
        hints: &UploadHints,
    ) -> Result<StoredArtifact, StoreError> {
        let data = tokio::fs::read(local).await.map_err(|source| StoreError::Io {
            path: local.to_path_buf(),
            source,
        })?;
        debug!(
            path = %local.display(),
            bytes = data.len(),
            public_id = %hints.public_id,
            "starting artifact upload"
        );

        let folder = hints.folder.clone().unwrap_or_else(|| self.config.folder.clone());
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
            .to_string();
        let signature = signature(
            &[
                ("folder", folder.as_str()),
                ("public_id", hints.public_id.as_str()),
                ("timestamp", timestamp.as_str()),
            ],
            &self.config.api_secret,
        );

        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.mp4", hints.public_id));
        let part = Part::bytes(data)
            .file_name(file_name)
            .mime_str("video/mp4")?;
        let form = Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("public_id", hints.public_id.clone())
            .text("folder", folder)
            .text("signature", signature);

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status,
                body: body.chars().take(500).collect(),
            });
        }

        let reply: UploadReply = response.json().await.map_err(|e| StoreError::InvalidReply {
            reason: e.to_string(),
        })?;
        info!(url = %reply.secure_url, id = %reply.public_id, "artifact uploaded");

        Ok(StoredArtifact {
            url: reply.secure_url,
            id: reply.public_id,
        })
    }
}

fn upload_endpoint(base_url: &str, cloud: &str) -> Result<Url, StoreError> {
    if cloud.is_empty() {
        return Err(StoreError::InvalidEndpoint {
            reason: "store cloud name is empty".to_string(),
        });
    }
    let raw = format!("{}/{cloud}/video/upload", base_url.trim_end_matches('/'));
    Url::parse(&raw).map_err(|e| StoreError::InvalidEndpoint {
        reason: format!("`{raw}`: {e}"),
    })
}

/// SHA-256 signature over `key=value` pairs sorted by key, joined with `&`,
/// with the secret appended.
fn signature(params: &[(&str, &str)], secret: &str) -> String {
    let mut pairs: Vec<(&str, &str)> = params.to_vec();
    pairs.sort_by_key(|(key, _)| *key);
    let payload = pairs
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
