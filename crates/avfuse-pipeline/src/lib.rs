//! # Avfuse Pipeline
//!
//! Drives one generation job from raw payload to stored artifact:
//! normalize, bring the engine up (first job only), fetch the reference
//! image when the job needs one, generate, encode to MP4, upload, and
//! clean every scratch file up regardless of how the job ended.
//!
//! [`GenerationPipeline::run`] is the single entry point. It never returns
//! an error: every outcome, success or failure, is folded into the
//! [`avfuse_core::JobResponse`] envelope.

pub mod encode;
pub mod error;
pub mod fetch;
pub mod runner;
pub mod scratch;

pub use encode::{ArtifactEncoder, EncodeError, FfmpegEncoder};
pub use error::JobError;
pub use fetch::{FetchError, HttpReferenceFetcher, ReferenceFetcher};
pub use runner::{GenerationPipeline, PipelineConfig};
pub use scratch::{ArtifactKind, JobScratch};
