//! Engine configuration resolution.
//!
//! Values resolve in a fixed precedence: explicit overrides (CLI flags and
//! environment) beat the optional TOML config file, which beats the built-in
//! defaults. Resolution happens once at startup; the resolved
//! [`EngineConfig`] is immutable afterwards.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Model variant loaded when nothing else is configured.
pub const DEFAULT_MODEL_VARIANT: &str = "960x960_10s";

/// Checkpoint directory used when nothing else is configured.
pub const DEFAULT_CKPT_DIR: &str = "ckpts";

/// Clip length assumed when the variant name does not encode one.
const FALLBACK_CLIP_SECONDS: u32 = 10;

/// Numeric precision the engine materializes weights in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetDtype {
    #[default]
    Bf16,
    Fp16,
    Fp32,
}

impl TargetDtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetDtype::Bf16 => "bf16",
            TargetDtype::Fp16 => "fp16",
            TargetDtype::Fp32 => "fp32",
        }
    }
}

impl std::fmt::Display for TargetDtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Directory the model weights live in.
    pub ckpt_dir: PathBuf,
    /// Model variant identifier, e.g. `960x960_10s`.
    pub model_variant: String,
    /// Quantize weights to fp8 at load time.
    pub fp8: bool,
    /// Keep idle submodules in host memory instead of device memory.
    pub cpu_offload: bool,
    /// Accelerator index to load on.
    pub device: u32,
    /// Numeric precision for inference.
    pub target_dtype: TargetDtype,
}

impl EngineConfig {
    /// Resolve the effective configuration from an optional TOML file plus
    /// explicit overrides.
    pub fn resolve(base: Option<&Path>, overrides: &EngineOverrides) -> Result<Self, ConfigError> {
        let file = match base {
            Some(path) => EngineConfigFile::load(path)?,
            None => EngineConfigFile::default(),
        };
        let o = overrides.clone();

        Ok(Self {
            ckpt_dir: o
                .ckpt_dir
                .or(file.ckpt_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CKPT_DIR)),
            model_variant: o
                .model_variant
                .or(file.model_variant)
                .unwrap_or_else(|| DEFAULT_MODEL_VARIANT.to_string()),
            fp8: o.fp8.or(file.fp8).unwrap_or(false),
            cpu_offload: o.cpu_offload.or(file.cpu_offload).unwrap_or(false),
            device: o.device.or(file.device).unwrap_or(0),
            target_dtype: o.target_dtype.or(file.target_dtype).unwrap_or_default(),
        })
    }

    /// Clip length in seconds, read from the `_<N>s` suffix of the variant
    /// name. Unparseable variants fall back to the stock clip length.
    pub fn clip_seconds(&self) -> u32 {
        self.model_variant
            .rsplit('_')
            .next()
            .and_then(|tail| tail.strip_suffix('s'))
            .and_then(|n| n.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(FALLBACK_CLIP_SECONDS)
    }
}

/// Overrides applied on top of the config file, usually sourced from CLI
/// flags and environment variables by the binary.
#[derive(Debug, Clone, Default)]
pub struct EngineOverrides {
    pub ckpt_dir: Option<PathBuf>,
    pub model_variant: Option<String>,
    pub fp8: Option<bool>,
    pub cpu_offload: Option<bool>,
    pub device: Option<u32>,
    pub target_dtype: Option<TargetDtype>,
}

impl EngineOverrides {
    pub fn ckpt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ckpt_dir = Some(dir.into());
        self
    }

    pub fn model_variant(mut self, variant: impl Into<String>) -> Self {
        self.model_variant = Some(variant.into());
        self
    }

    pub fn fp8(mut self, enabled: bool) -> Self {
        self.fp8 = Some(enabled);
        self
    }

    pub fn cpu_offload(mut self, enabled: bool) -> Self {
        self.cpu_offload = Some(enabled);
        self
    }

    pub fn device(mut self, index: u32) -> Self {
        self.device = Some(index);
        self
    }

    pub fn target_dtype(mut self, dtype: TargetDtype) -> Self {
        self.target_dtype = Some(dtype);
        self
    }
}

/// On-disk shape of the optional engine config file.
#[derive(Debug, Clone, Default, Deserialize)]
struct EngineConfigFile {
    ckpt_dir: Option<PathBuf>,
    model_variant: Option<String>,
    fp8: Option<bool>,
    cpu_offload: Option<bool>,
    device: Option<u32>,
    target_dtype: Option<TargetDtype>,
}

impl EngineConfigFile {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_without_file_or_overrides_uses_defaults() {
        let config = EngineConfig::resolve(None, &EngineOverrides::default()).unwrap();
        assert_eq!(config.ckpt_dir, PathBuf::from(DEFAULT_CKPT_DIR));
        assert_eq!(config.model_variant, DEFAULT_MODEL_VARIANT);
        assert!(!config.fp8);
        assert!(!config.cpu_offload);
        assert_eq!(config.device, 0);
        assert_eq!(config.target_dtype, TargetDtype::Bf16);
    }

    #[test]
    fn file_values_beat_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(
            &path,
            r#"
ckpt_dir = "/srv/weights"
model_variant = "720x720_5s"
fp8 = true
device = 1
target_dtype = "fp16"
"#,
        )
        .unwrap();

        let config = EngineConfig::resolve(Some(&path), &EngineOverrides::default()).unwrap();
        assert_eq!(config.ckpt_dir, PathBuf::from("/srv/weights"));
        assert_eq!(config.model_variant, "720x720_5s");
        assert!(config.fp8);
        assert!(!config.cpu_offload);
        assert_eq!(config.device, 1);
        assert_eq!(config.target_dtype, TargetDtype::Fp16);
    }

    #[test]
    fn overrides_beat_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "model_variant = \"720x720_5s\"\ndevice = 1\n").unwrap();

        let overrides = EngineOverrides::default()
            .model_variant("960x960_10s")
            .cpu_offload(true);
        let config = EngineConfig::resolve(Some(&path), &overrides).unwrap();
        assert_eq!(config.model_variant, "960x960_10s");
        assert!(config.cpu_offload);
        // untouched by the override, still comes from the file
        assert_eq!(config.device, 1);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = EngineConfig::resolve(
            Some(Path::new("/definitely/not/here.toml")),
            &EngineOverrides::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "model_variant = [not toml").unwrap();

        let err =
            EngineConfig::resolve(Some(&path), &EngineOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn clip_seconds_comes_from_the_variant_suffix() {
        let mut config = EngineConfig::resolve(None, &EngineOverrides::default()).unwrap();
        assert_eq!(config.clip_seconds(), 10);

        config.model_variant = "720x720_5s".to_string();
        assert_eq!(config.clip_seconds(), 5);

        config.model_variant = "experimental".to_string();
        assert_eq!(config.clip_seconds(), 10);
    }
}
