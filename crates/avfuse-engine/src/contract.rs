//! The engine parameter contract.
//!
//! [`GenerationRequest`] is the flattened parameter set an engine consumes;
//! [`GenerationResult`] is the raw payload it returns. Both are deliberately
//! free of job-envelope concerns so alternative engine implementations only
//! depend on this module.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::EngineConfig;
use crate::error::EngineError;

/// Parameter set handed to the engine for one generation pass.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GenerationRequest {
    pub text_prompt: String,
    /// Local path of the conditioning image, if the job runs image-to-video.
    pub image_path: Option<PathBuf>,
    pub height: u32,
    pub width: u32,
    pub seed: i64,
    pub solver_name: String,
    pub sample_steps: u32,
    pub shift: f64,
    pub video_guidance_scale: f64,
    pub audio_guidance_scale: f64,
    pub slg_layer: i64,
    pub video_negative_prompt: String,
    pub audio_negative_prompt: String,
}

/// Raw video frames produced by the engine: tightly packed rgb24, frame
/// after frame.
#[derive(Debug, Clone)]
pub struct VideoPayload {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
}

impl VideoPayload {
    /// Byte length a well-formed payload of this geometry must have.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3 * self.frame_count as usize
    }
}

/// Raw mono audio produced by the engine: little-endian f32 samples.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub data: Bytes,
    pub sample_count: u64,
}

impl AudioPayload {
    /// Byte length a well-formed payload of this sample count must have.
    pub fn expected_len(&self) -> usize {
        self.sample_count as usize * 4
    }
}

/// Everything one generation pass produces.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub video: VideoPayload,
    pub audio: AudioPayload,
    /// Engine-reported extras (timings, sampler diagnostics). Passed through
    /// for logging, never interpreted.
    pub metadata: serde_json::Value,
}

/// A loaded generation engine.
///
/// Implementations need not tolerate concurrent invocation; the lifecycle
/// wraps every engine in a handle that serializes callers.
#[async_trait]
pub trait FusionEngine: Send + Sync {
    /// Run one generation pass to completion.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, EngineError>;
}

/// Constructs an engine from resolved configuration. Called at most once per
/// process by the lifecycle.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self, config: &EngineConfig) -> Result<Box<dyn FusionEngine>, EngineError>;
}

/// Ensures model weights are present before the engine loads.
#[async_trait]
pub trait WeightProvider: Send + Sync {
    /// Make the weights for `variant` available under `dir`, returning the
    /// path of the primary weight file. May block for minutes on first run.
    async fn ensure(&self, variant: &str, dir: &Path) -> Result<PathBuf, EngineError>;
}
