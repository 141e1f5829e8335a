//! Job orchestration.
//!
//! One [`GenerationPipeline`] lives for the whole process and is shared by
//! every job. Step order is fixed: normalize, engine up, reference image
//! (i2v only), generate, encode, upload. Scratch files are released after
//! the outcome is decided, on every path, so a failing step can never leak
//! the files acquired before it.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use avfuse_core::{GenerationJob, JobPayload, JobResponse, Mode};
use avfuse_engine::{EngineLifecycle, GenerationRequest};
use avfuse_store::{ArtifactStore, StoredArtifact, UploadHints};

use crate::encode::ArtifactEncoder;
use crate::error::JobError;
use crate::fetch::ReferenceFetcher;
use crate::scratch::JobScratch;

/// Prefix of seed-derived artifact identifiers.
const ARTIFACT_PREFIX: &str = "avfuse";

/// Stable store identifier for a job seed. Equal seeds overwrite, which is
/// what deterministic re-runs want.
pub fn artifact_id(seed: i64) -> String {
    format!("{ARTIFACT_PREFIX}_{seed}")
}

/// Process-wide pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory scratch files live in. Created by the worker at startup.
    pub scratch_root: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("avfuse"),
        }
    }
}

/// The job-processing façade.
pub struct GenerationPipeline {
    lifecycle: Arc<EngineLifecycle>,
    fetcher: Arc<dyn ReferenceFetcher>,
    encoder: Arc<dyn ArtifactEncoder>,
    store: Arc<dyn ArtifactStore>,
    scratch_root: PathBuf,
    clip_seconds: u32,
}

impl GenerationPipeline {
    pub fn new(
        lifecycle: Arc<EngineLifecycle>,
        fetcher: Arc<dyn ReferenceFetcher>,
        encoder: Arc<dyn ArtifactEncoder>,
        store: Arc<dyn ArtifactStore>,
        config: PipelineConfig,
    ) -> Self {
        let clip_seconds = lifecycle.config().clip_seconds();
        Self {
            lifecycle,
            fetcher,
            encoder,
            store,
            scratch_root: config.scratch_root,
            clip_seconds,
        }
    }

    /// Run one job to completion.
    ///
    /// Never returns an error and never panics on bad input: every outcome
    /// is folded into the response envelope, and scratch files are released
    /// before the response is produced.
    pub async fn run(&self, payload: serde_json::Value) -> JobResponse {
        self.run_job(Uuid::new_v4(), payload).await
    }

    #[instrument(name = "job", level = "info", skip(self, payload))]
    async fn run_job(&self, job_id: Uuid, payload: serde_json::Value) -> JobResponse {
        let mut scratch = JobScratch::new(&self.scratch_root, job_id);
        let outcome = self.execute(payload, &mut scratch).await;
        scratch.release_all().await;

        match outcome {
            Ok((job, stored)) => {
                info!(url = %stored.url, id = %stored.id, "job finished");
                JobResponse::success(&job, stored.url, stored.id, self.clip_seconds)
            }
            Err(err) => {
                let kind = err.kind();
                warn!(error_kind = %kind, error = %err, "job failed");
                JobResponse::failure(kind, err.to_string())
            }
        }
    }

    async fn execute(
        &self,
        payload: serde_json::Value,
        scratch: &mut JobScratch,
    ) -> Result<(GenerationJob, StoredArtifact), JobError> {
        // Validation happens before any resource is acquired: a payload that
        // cannot be normalized must not trigger an engine load or a fetch.
        let job = GenerationJob::normalize(JobPayload::from_value(payload)?)?;
        info!(
            mode = %job.mode,
            seed = job.seed,
            resolution = %job.resolution(),
            "job accepted"
        );

        let engine = self.lifecycle.handle().await?;

        let image_path = if job.mode.requires_image() {
            let url = job
                .image_url
                .as_deref()
                .ok_or(avfuse_core::ValidationError::ImageRequired)?;
            let dest = scratch.reference_image_path();
            self.fetcher.fetch(url, &dest).await?;
            Some(dest)
        } else {
            None
        };

        let request = build_request(&job, image_path);
        info!(steps = job.sample_steps, "invoking fusion engine");
        let result = engine.generate(&request).await?;
        debug!(
            frames = result.video.frame_count,
            samples = result.audio.sample_count,
            "engine returned payload"
        );

        let pcm_path = scratch.pcm_path();
        let output = scratch.output_path(job.seed);
        self.encoder.encode(&result, &pcm_path, &output).await?;

        let hints = UploadHints::with_public_id(artifact_id(job.seed));
        let stored = self.store.upload(&output, &hints).await?;

        Ok((job, stored))
    }
}

fn build_request(job: &GenerationJob, image_path: Option<PathBuf>) -> GenerationRequest {
    debug_assert!(image_path.is_some() == (job.mode == Mode::I2v));
    GenerationRequest {
        text_prompt: job.prompt.clone(),
        image_path,
        height: job.height,
        width: job.width,
        seed: job.seed,
        solver_name: job.solver_name.clone(),
        sample_steps: job.sample_steps,
        shift: job.shift,
        video_guidance_scale: job.video_guidance_scale,
        audio_guidance_scale: job.audio_guidance_scale,
        slg_layer: job.slg_layer,
        video_negative_prompt: job.video_negative_prompt.clone(),
        audio_negative_prompt: job.audio_negative_prompt.clone(),
    }
}
