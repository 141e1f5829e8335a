//! Per-job error with the step taxonomy the response envelope needs.

use avfuse_core::{ErrorKind, ValidationError};
use avfuse_engine::EngineError;
use avfuse_store::StoreError;
use thiserror::Error;

use crate::encode::EncodeError;
use crate::fetch::FetchError;

/// Anything that can end a job early. [`JobError::kind`] gives the stable
/// classification reported to callers.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Upload(#[from] StoreError),
}

impl JobError {
    /// Map onto the wire-level error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Validation(_) => ErrorKind::Validation,
            JobError::Engine(EngineError::WeightProvision { .. }) => ErrorKind::WeightProvision,
            JobError::Engine(EngineError::Load { .. }) => ErrorKind::EngineLoad,
            JobError::Engine(EngineError::Generation { .. }) => ErrorKind::Generation,
            JobError::Fetch(_) => ErrorKind::Download,
            JobError::Encode(_) => ErrorKind::Encoding,
            JobError::Upload(_) => ErrorKind::Upload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_step_maps_to_its_kind() {
        let cases: Vec<(JobError, ErrorKind)> = vec![
            (ValidationError::MissingPrompt.into(), ErrorKind::Validation),
            (
                EngineError::weight_provision("960x960_10s", "mirror down").into(),
                ErrorKind::WeightProvision,
            ),
            (EngineError::load("oom").into(), ErrorKind::EngineLoad),
            (
                EngineError::generation("sampler diverged").into(),
                ErrorKind::Generation,
            ),
            (
                FetchError::HttpStatus {
                    status: reqwest::StatusCode::NOT_FOUND,
                    url: "https://example.com/x.png".to_string(),
                }
                .into(),
                ErrorKind::Download,
            ),
            (
                EncodeError::Geometry {
                    reason: "short payload".to_string(),
                }
                .into(),
                ErrorKind::Encoding,
            ),
            (
                StoreError::InvalidReply {
                    reason: "not json".to_string(),
                }
                .into(),
                ErrorKind::Upload,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.kind(), expected, "wrong kind for {error}");
        }
    }
}
