//! Sampling parameter defaults.
//!
//! Every optional field of [`crate::JobPayload`] resolves against this table
//! during normalization, so two jobs with the same payload always produce the
//! same resolved [`crate::GenerationJob`]. Changing a value here changes the
//! behavior of every caller that omits the field.

/// Default RNG seed applied when the payload omits one.
pub const SEED: i64 = 42;

/// Default output height in pixels.
pub const HEIGHT: u32 = 960;

/// Default output width in pixels.
pub const WIDTH: u32 = 960;

/// Default number of diffusion sampling steps.
pub const SAMPLE_STEPS: u32 = 50;

/// Default classifier-free guidance scale for the video branch.
pub const VIDEO_GUIDANCE_SCALE: f64 = 4.0;

/// Default classifier-free guidance scale for the audio branch.
pub const AUDIO_GUIDANCE_SCALE: f64 = 3.0;

/// Default ODE solver used by the sampler.
pub const SOLVER_NAME: &str = "unipc";

/// Default timestep shift applied by the sampler schedule.
pub const SHIFT: f64 = 5.0;

/// Default skip-layer-guidance layer index.
pub const SLG_LAYER: i64 = 11;

/// Default negative prompt steering the video branch away from artifacts.
pub const VIDEO_NEGATIVE_PROMPT: &str = "jitter, bad hands, blur";

/// Default negative prompt steering the audio branch away from artifacts.
pub const AUDIO_NEGATIVE_PROMPT: &str = "robotic, muffled";

/// Length of a generated clip in seconds for the default model variant.
pub const CLIP_SECONDS: u32 = 10;

/// Frame rate the encoder stamps on the video stream.
pub const VIDEO_FPS: u32 = 24;

/// Sample rate in Hz the engine emits audio at.
pub const AUDIO_SAMPLE_RATE: u32 = 16_000;
