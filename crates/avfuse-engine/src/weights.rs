//! Weight provisioning via the vendor's fetch tool.
//!
//! Checkpoints are multi-gigabyte and ship out-of-band. When the expected
//! weight file is already on disk the provider is a no-op; otherwise it
//! shells out to the fetch tool and verifies the file appeared.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::contract::WeightProvider;
use crate::error::EngineError;

/// Fetch tool used when `AVFUSE_FETCH_TOOL` is not set.
pub const DEFAULT_FETCH_TOOL: &str = "avfuse-fetch-weights";

/// Path of the primary weight file for a variant under `dir`.
pub fn weight_file(dir: &Path, variant: &str) -> PathBuf {
    dir.join(format!("model_{variant}.safetensors"))
}

/// [`WeightProvider`] that runs the vendor's download tool on cache miss.
pub struct ToolWeightProvider {
    program: PathBuf,
}

impl ToolWeightProvider {
    /// Use the tool from the `AVFUSE_FETCH_TOOL` environment variable,
    /// falling back to the stock tool name on `PATH`.
    pub fn from_env() -> Self {
        let program = std::env::var("AVFUSE_FETCH_TOOL")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_FETCH_TOOL));
        Self { program }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl WeightProvider for ToolWeightProvider {
    async fn ensure(&self, variant: &str, dir: &Path) -> Result<PathBuf, EngineError> {
        let target = weight_file(dir, variant);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            debug!(path = %target.display(), "weights already present");
            return Ok(target);
        }

        info!(variant, dir = %dir.display(), "weights missing, running fetch tool");
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            EngineError::weight_provision(variant, format!("cannot create checkpoint dir: {e}"))
        })?;

        let output = Command::new(&self.program)
            .arg("--output-dir")
            .arg(dir)
            .arg("--models")
            .arg(variant)
            .output()
            .await
            .map_err(|e| {
                EngineError::weight_provision(
                    variant,
                    format!("failed to run `{}`: {e}", self.program.display()),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::weight_provision(
                variant,
                format!(
                    "fetch tool exited with status {}: {}",
                    output.status.code().unwrap_or(-1),
                    tail(&stderr, 500)
                ),
            ));
        }

        if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Err(EngineError::weight_provision(
                variant,
                format!(
                    "fetch tool succeeded but `{}` did not appear",
                    target.display()
                ),
            ));
        }

        info!(path = %target.display(), "weights fetched");
        Ok(target)
    }
}

/// Last `limit` characters of `text`, for error messages.
fn tail(text: &str, limit: usize) -> &str {
    let trimmed = text.trim_end();
    match trimmed.char_indices().nth_back(limit.saturating_sub(1)) {
        Some((idx, _)) => &trimmed[idx..],
        None => trimmed,
    }
}
