//! Sidecar engine: a local inference daemon driven over HTTP.
//!
//! The production engine is a separate process. [`SidecarLoader`] spawns
//! it with the resolved engine configuration, waits for its health endpoint
//! to come up, and hands back a [`FusionEngine`] that posts generation
//! requests to it. The daemon writes raw payloads to disk; the engine reads
//! them back and removes them so scratch space is not leaked between jobs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::contract::{
    AudioPayload, EngineLoader, FusionEngine, GenerationRequest, GenerationResult, VideoPayload,
};
use crate::error::EngineError;

/// Daemon binary used when `AVFUSE_ENGINE_CMD` is not set.
pub const DEFAULT_ENGINE_PROGRAM: &str = "avfuse-inferd";

/// Address the daemon listens on when `AVFUSE_ENGINE_BIND` is not set.
pub const DEFAULT_ENGINE_BIND: &str = "127.0.0.1:7331";

/// How the inference daemon is spawned and reached.
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// Daemon binary, resolved via `PATH` if relative.
    pub program: PathBuf,
    /// Extra arguments appended after the generated ones.
    pub extra_args: Vec<String>,
    /// Address the daemon binds its HTTP endpoint to.
    pub bind: String,
    /// How long to wait for the health endpoint before giving up.
    pub startup_timeout: Duration,
    /// Delay between health probes during startup.
    pub poll_interval: Duration,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_ENGINE_PROGRAM),
            extra_args: Vec::new(),
            bind: DEFAULT_ENGINE_BIND.to_string(),
            startup_timeout: Duration::from_secs(180),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl SidecarConfig {
    /// Build from the `AVFUSE_ENGINE_CMD` / `AVFUSE_ENGINE_BIND` environment
    /// variables, falling back to stock values. The command variable holds a
    /// whole invocation: first token is the program, the rest are extra args.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(cmd) = std::env::var("AVFUSE_ENGINE_CMD")
            && let Some((program, extra_args)) = split_command(&cmd)
        {
            config.program = program;
            config.extra_args = extra_args;
        }
        if let Ok(bind) = std::env::var("AVFUSE_ENGINE_BIND") {
            config.bind = bind;
        }
        config
    }

    fn base_url(&self) -> String {
        format!("http://{}", self.bind)
    }
}

/// Split a command line into program and arguments. No quoting rules; the
/// daemon takes plain flags.
fn split_command(cmd: &str) -> Option<(PathBuf, Vec<String>)> {
    let mut tokens = cmd.split_whitespace();
    let program = PathBuf::from(tokens.next()?);
    Some((program, tokens.map(str::to_string).collect()))
}

/// [`EngineLoader`] that spawns and health-checks the inference daemon.
pub struct SidecarLoader {
    config: SidecarConfig,
}

impl SidecarLoader {
    pub fn new(config: SidecarConfig) -> Self {
        Self { config }
    }

    /// Arguments the daemon is spawned with for a given engine config.
    fn daemon_args(&self, engine: &EngineConfig) -> Vec<String> {
        let mut args = vec![
            "--listen".to_string(),
            self.config.bind.clone(),
            "--ckpt-dir".to_string(),
            engine.ckpt_dir.display().to_string(),
            "--variant".to_string(),
            engine.model_variant.clone(),
            "--device".to_string(),
            engine.device.to_string(),
            "--dtype".to_string(),
            engine.target_dtype.to_string(),
        ];
        if engine.fp8 {
            args.push("--fp8".to_string());
        }
        if engine.cpu_offload {
            args.push("--cpu-offload".to_string());
        }
        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    async fn wait_until_healthy(
        &self,
        client: &reqwest::Client,
        child: &mut Child,
        stderr_tail: &Arc<parking_lot::Mutex<Vec<String>>>,
    ) -> Result<(), EngineError> {
        let health_url = format!("{}/health", self.config.base_url());
        let deadline = tokio::time::Instant::now() + self.config.startup_timeout;

        loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|e| EngineError::load(format!("cannot poll daemon: {e}")))?
            {
                return Err(EngineError::load(format!(
                    "daemon exited during startup with status {}: {}",
                    status.code().unwrap_or(-1),
                    stderr_tail.lock().join(" | ")
                )));
            }

            let probe = client
                .get(&health_url)
                .timeout(Duration::from_secs(2))
                .send()
                .await;
            if let Ok(response) = probe
                && response.status().is_success()
            {
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                child.start_kill().ok();
                return Err(EngineError::load(format!(
                    "daemon did not become healthy within {:?}",
                    self.config.startup_timeout
                )));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[async_trait]
impl EngineLoader for SidecarLoader {
    async fn load(&self, engine: &EngineConfig) -> Result<Box<dyn FusionEngine>, EngineError> {
        let args = self.daemon_args(engine);
        info!(
            program = %self.config.program.display(),
            bind = %self.config.bind,
            "spawning inference daemon"
        );

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::load(format!(
                    "failed to spawn `{}`: {e}",
                    self.config.program.display()
                ))
            })?;

        // Keep a short stderr tail for startup diagnostics; the rest goes to
        // the debug log.
        let stderr_tail = Arc::new(parking_lot::Mutex::new(Vec::new()));
        if let Some(stderr) = child.stderr.take() {
            let tail = Arc::clone(&stderr_tail);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "avfuse_engine::daemon", "{line}");
                    let mut tail = tail.lock();
                    if tail.len() >= 20 {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
            });
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EngineError::load(format!("cannot build daemon client: {e}")))?;

        self.wait_until_healthy(&client, &mut child, &stderr_tail)
            .await?;
        info!(bind = %self.config.bind, "inference daemon healthy");

        Ok(Box::new(SidecarEngine {
            client,
            base_url: self.config.base_url(),
            _child: std::sync::Mutex::new(child),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    output: Option<GenerateOutput>,
}

#[derive(Debug, Deserialize)]
struct GenerateOutput {
    video_path: PathBuf,
    width: u32,
    height: u32,
    frame_count: u32,
    audio_path: PathBuf,
    sample_count: u64,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// [`FusionEngine`] backed by the spawned daemon. The child is held so the
/// daemon dies with the engine.
struct SidecarEngine {
    client: reqwest::Client,
    base_url: String,
    _child: std::sync::Mutex<Child>,
}

#[async_trait]
impl FusionEngine for SidecarEngine {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, EngineError> {
        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| EngineError::generation(format!("daemon request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::generation(format!(
                "daemon returned HTTP {status}: {}",
                body.trim()
            )));
        }

        let reply: GenerateReply = response
            .json()
            .await
            .map_err(|e| EngineError::generation(format!("unreadable daemon reply: {e}")))?;

        if reply.status != "success" {
            return Err(EngineError::generation(
                reply
                    .error
                    .unwrap_or_else(|| "daemon reported failure without detail".to_string()),
            ));
        }
        let output = reply
            .output
            .ok_or_else(|| EngineError::generation("daemon reply missing output section"))?;

        let video_data = read_payload(&output.video_path).await?;
        let audio_data = read_payload(&output.audio_path).await?;
        for path in [&output.video_path, &output.audio_path] {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "failed to remove daemon payload");
            }
        }

        Ok(GenerationResult {
            video: VideoPayload {
                data: video_data,
                width: output.width,
                height: output.height,
                frame_count: output.frame_count,
            },
            audio: AudioPayload {
                data: audio_data,
                sample_count: output.sample_count,
            },
            metadata: output.metadata,
        })
    }
}

async fn read_payload(path: &std::path::Path) -> Result<bytes::Bytes, EngineError> {
    tokio::fs::read(path).await.map(bytes::Bytes::from).map_err(|e| {
        EngineError::generation(format!("cannot read daemon payload `{}`: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineOverrides;

    #[test]
    fn daemon_args_carry_the_engine_config() {
        let engine = EngineConfig::resolve(None, &EngineOverrides::default()).unwrap();
        let loader = SidecarLoader::new(SidecarConfig::default());

        assert_eq!(
            loader.daemon_args(&engine),
            vec![
                "--listen",
                DEFAULT_ENGINE_BIND,
                "--ckpt-dir",
                "ckpts",
                "--variant",
                "960x960_10s",
                "--device",
                "0",
                "--dtype",
                "bf16",
            ]
        );
    }

    #[test]
    fn daemon_args_include_flags_and_extras() {
        let engine = EngineConfig::resolve(
            None,
            &EngineOverrides::default().fp8(true).cpu_offload(true),
        )
        .unwrap();
        let config = SidecarConfig {
            extra_args: vec!["--log-level".to_string(), "debug".to_string()],
            ..SidecarConfig::default()
        };
        let loader = SidecarLoader::new(config);

        let args = loader.daemon_args(&engine);
        assert!(args.contains(&"--fp8".to_string()));
        assert!(args.contains(&"--cpu-offload".to_string()));
        assert_eq!(args[args.len() - 2..], ["--log-level", "debug"]);
    }

    #[test]
    fn default_base_url_targets_loopback() {
        assert_eq!(
            SidecarConfig::default().base_url(),
            format!("http://{DEFAULT_ENGINE_BIND}")
        );
    }

    #[test]
    fn command_splits_into_program_and_args() {
        let (program, args) =
            split_command("/opt/avfuse/inferd --device 0 --compile").unwrap();
        assert_eq!(program, PathBuf::from("/opt/avfuse/inferd"));
        assert_eq!(args, ["--device", "0", "--compile"]);

        let (program, args) = split_command("avfuse-inferd").unwrap();
        assert_eq!(program, PathBuf::from("avfuse-inferd"));
        assert!(args.is_empty());

        assert!(split_command("   ").is_none());
    }

    #[test]
    fn generate_reply_parses_both_shapes() {
        let ok: GenerateReply = serde_json::from_str(
            r#"{
                "status": "success",
                "output": {
                    "video_path": "/tmp/v.rgb",
                    "width": 960, "height": 960, "frame_count": 240,
                    "audio_path": "/tmp/a.f32",
                    "sample_count": 160000,
                    "metadata": {"sampler_ms": 412}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(ok.status, "success");
        let output = ok.output.unwrap();
        assert_eq!(output.frame_count, 240);
        assert_eq!(output.sample_count, 160_000);

        let err: GenerateReply =
            serde_json::from_str(r#"{"status": "error", "error": "oom"}"#).unwrap();
        assert_eq!(err.status, "error");
        assert_eq!(err.error.as_deref(), Some("oom"));
        assert!(err.output.is_none());
    }
}
