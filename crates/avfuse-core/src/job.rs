//! Raw job payload parsing and normalization.
//!
//! A payload arrives as loosely typed JSON. [`GenerationJob::normalize`]
//! turns it into a fully resolved job: every optional field is filled from
//! [`crate::defaults`], the generation mode is derived, and all numeric
//! ranges are checked. Everything downstream of this module works with the
//! resolved form only.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::defaults;

/// Generation mode of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Text-to-video: the prompt alone drives generation.
    T2v,
    /// Image-to-video: a reference image conditions the first frame.
    I2v,
}

impl Mode {
    /// Parse an explicit mode string. Unknown values return `None` so the
    /// caller can fall back to deriving the mode from the payload shape.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "t2v" => Some(Mode::T2v),
            "i2v" => Some(Mode::I2v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::T2v => "t2v",
            Mode::I2v => "i2v",
        }
    }

    /// Whether this mode needs a reference image to run.
    pub fn requires_image(&self) -> bool {
        matches!(self, Mode::I2v)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw job payload as submitted by a caller.
///
/// Every field is optional; unknown fields are ignored during
/// deserialization. Use [`GenerationJob::normalize`] to resolve it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobPayload {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub sample_steps: Option<i64>,
    #[serde(default)]
    pub video_guidance_scale: Option<f64>,
    #[serde(default)]
    pub audio_guidance_scale: Option<f64>,
    #[serde(default)]
    pub solver_name: Option<String>,
    #[serde(default)]
    pub shift: Option<f64>,
    #[serde(default)]
    pub slg_layer: Option<i64>,
    #[serde(default)]
    pub video_negative_prompt: Option<String>,
    #[serde(default)]
    pub audio_negative_prompt: Option<String>,
}

impl JobPayload {
    /// Deserialize a payload from arbitrary JSON, mapping parse failures to
    /// [`ValidationError::Malformed`].
    pub fn from_value(value: serde_json::Value) -> Result<Self, ValidationError> {
        serde_json::from_value(value).map_err(|e| ValidationError::Malformed {
            reason: e.to_string(),
        })
    }
}

/// Errors raised while normalizing a raw payload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("malformed job payload: {reason}")]
    Malformed { reason: String },

    #[error("missing or empty `prompt`")]
    MissingPrompt,

    #[error("`image_url` is required when mode is i2v")]
    ImageRequired,

    #[error("`{field}` must be a positive integer, got {value}")]
    OutOfRange { field: &'static str, value: i64 },

    #[error("`{field}` must be non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },
}

/// A fully resolved generation job.
///
/// Construction goes through [`GenerationJob::normalize`]; once built, every
/// field holds its final value and no further defaulting happens downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationJob {
    pub prompt: String,
    pub image_url: Option<String>,
    pub mode: Mode,
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

impl GenerationJob {
    /// Resolve a raw payload into a canonical job.
    ///
    /// Derivation order: an explicit, recognized `mode` wins; otherwise the
    /// presence of `image_url` selects i2v, and t2v is the final fallback.
    /// All omitted sampling parameters resolve from [`crate::defaults`], so
    /// normalization is deterministic for a given payload.
    pub fn normalize(payload: JobPayload) -> Result<Self, ValidationError> {
        let prompt = match payload.prompt {
            Some(p) if !p.trim().is_empty() => p,
            _ => return Err(ValidationError::MissingPrompt),
        };

        let image_url = payload.image_url.filter(|u| !u.trim().is_empty());

        let mode = payload
            .mode
            .as_deref()
            .and_then(Mode::parse)
            .unwrap_or(if image_url.is_some() { Mode::I2v } else { Mode::T2v });

        if mode.requires_image() && image_url.is_none() {
            return Err(ValidationError::ImageRequired);
        }

        Ok(Self {
            prompt,
            image_url,
            mode,
            height: positive_u32("height", payload.height, defaults::HEIGHT)?,
            width: positive_u32("width", payload.width, defaults::WIDTH)?,
            seed: payload.seed.unwrap_or(defaults::SEED),
            solver_name: payload
                .solver_name
                .unwrap_or_else(|| defaults::SOLVER_NAME.to_string()),
            sample_steps: positive_u32("sample_steps", payload.sample_steps, defaults::SAMPLE_STEPS)?,
            shift: payload.shift.unwrap_or(defaults::SHIFT),
            video_guidance_scale: non_negative(
                "video_guidance_scale",
                payload.video_guidance_scale,
                defaults::VIDEO_GUIDANCE_SCALE,
            )?,
            audio_guidance_scale: non_negative(
                "audio_guidance_scale",
                payload.audio_guidance_scale,
                defaults::AUDIO_GUIDANCE_SCALE,
            )?,
            slg_layer: payload.slg_layer.unwrap_or(defaults::SLG_LAYER),
            video_negative_prompt: payload
                .video_negative_prompt
                .unwrap_or_else(|| defaults::VIDEO_NEGATIVE_PROMPT.to_string()),
            audio_negative_prompt: payload
                .audio_negative_prompt
                .unwrap_or_else(|| defaults::AUDIO_NEGATIVE_PROMPT.to_string()),
        })
    }

    /// Output resolution formatted as `HxW`, matching the response envelope.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.height, self.width)
    }
}

fn positive_u32(
    field: &'static str,
    value: Option<i64>,
    default: u32,
) -> Result<u32, ValidationError> {
    match value {
        None => Ok(default),
        Some(v) if v > 0 && v <= i64::from(u32::MAX) => Ok(v as u32),
        Some(v) => Err(ValidationError::OutOfRange { field, value: v }),
    }
}

fn non_negative(
    field: &'static str,
    value: Option<f64>,
    default: f64,
) -> Result<f64, ValidationError> {
    match value {
        None => Ok(default),
        Some(v) if v >= 0.0 => Ok(v),
        Some(v) => Err(ValidationError::Negative { field, value: v }),
    }
}
