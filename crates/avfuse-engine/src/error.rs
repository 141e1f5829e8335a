//! Engine error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while provisioning, loading or invoking the engine.
///
/// Variants carry pre-formatted reasons instead of source errors so a
/// terminal load failure stays `Clone`: the lifecycle caches it and
/// re-raises the same error for every later job without retrying.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("weight provisioning failed for `{variant}`: {reason}")]
    WeightProvision { variant: String, reason: String },

    #[error("engine load failed: {reason}")]
    Load { reason: String },

    #[error("generation failed: {reason}")]
    Generation { reason: String },
}

impl EngineError {
    pub fn weight_provision(variant: impl Into<String>, reason: impl ToString) -> Self {
        EngineError::WeightProvision {
            variant: variant.into(),
            reason: reason.to_string(),
        }
    }

    pub fn load(reason: impl ToString) -> Self {
        EngineError::Load {
            reason: reason.to_string(),
        }
    }

    pub fn generation(reason: impl ToString) -> Self {
        EngineError::Generation {
            reason: reason.to_string(),
        }
    }

    /// Whether this error poisons the lifecycle. Load-path failures do;
    /// per-job generation failures leave the engine usable.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EngineError::Generation { .. })
    }
}

/// Errors raised while resolving the engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read engine config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse engine config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
