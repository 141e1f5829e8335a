//! The uniform response envelope.
//!
//! Every job, however it ends, is answered with exactly one
//! [`JobResponse`]. Failures carry a stable [`ErrorKind`] naming the
//! pipeline step that failed plus a human-readable message; callers branch
//! on the kind, never on message text.

use serde::{Deserialize, Serialize};

use crate::job::GenerationJob;

/// Stable classification of the pipeline step a job failed in.
///
/// The serialized names are part of the wire contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "ValidationError")]
    Validation,
    #[serde(rename = "ConfigError")]
    Config,
    #[serde(rename = "WeightProvisionError")]
    WeightProvision,
    #[serde(rename = "EngineLoadError")]
    EngineLoad,
    #[serde(rename = "DownloadError")]
    Download,
    #[serde(rename = "GenerationError")]
    Generation,
    #[serde(rename = "EncodingError")]
    Encoding,
    #[serde(rename = "UploadError")]
    Upload,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::WeightProvision => "WeightProvisionError",
            ErrorKind::EngineLoad => "EngineLoadError",
            ErrorKind::Download => "DownloadError",
            ErrorKind::Generation => "GenerationError",
            ErrorKind::Encoding => "EncodingError",
            ErrorKind::Upload => "UploadError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobResponse {
    Success {
        video_url: String,
        duration_seconds: u32,
        resolution: String,
        seed: i64,
        artifact_id: String,
    },
    Failed {
        error_kind: ErrorKind,
        message: String,
    },
}

impl JobResponse {
    /// Build the success envelope for a finished job.
    pub fn success(
        job: &GenerationJob,
        video_url: impl Into<String>,
        artifact_id: impl Into<String>,
        duration_seconds: u32,
    ) -> Self {
        JobResponse::Success {
            video_url: video_url.into(),
            duration_seconds,
            resolution: job.resolution(),
            seed: job.seed,
            artifact_id: artifact_id.into(),
        }
    }

    /// Build the failure envelope for a classified error.
    pub fn failure(error_kind: ErrorKind, message: impl Into<String>) -> Self {
        JobResponse::Failed {
            error_kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResponse::Success { .. })
    }
}
