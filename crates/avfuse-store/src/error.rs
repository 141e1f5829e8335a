//! Store error types.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while persisting an artifact.
///
/// `InvalidEndpoint` can only occur while constructing the store from
/// configuration and is treated as a fatal startup error; the remaining
/// variants are per-upload failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store endpoint: {reason}")]
    InvalidEndpoint { reason: String },

    #[error("upload request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("store rejected upload with HTTP {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("unreadable store reply: {reason}")]
    InvalidReply { reason: String },

    #[error("failed to read artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
