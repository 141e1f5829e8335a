//! Raw payload to MP4 encoding.
//!
//! The engine hands back tightly packed rgb24 frames and f32 mono PCM; this
//! module muxes them into H.264 + AAC MP4 with ffmpeg. Frames stream into
//! ffmpeg over stdin while the PCM travels through a tracked intermediate
//! file, so only one pipe is in play and the child cannot deadlock on us.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use avfuse_core::defaults;
use avfuse_engine::{GenerationResult, VideoPayload};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Encoder binary used when `AVFUSE_FFMPEG_PATH` is not set.
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

/// Errors raised while encoding the artifact.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("payload geometry mismatch: {reason}")]
    Geometry { reason: String },

    #[error("failed to start encoder `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder I/O failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("encoder exited with status {code}: {stderr}")]
    Failed { code: i32, stderr: String },
}

/// Turns one generation result into a playable artifact on disk.
#[async_trait]
pub trait ArtifactEncoder: Send + Sync {
    /// Encode `result` into `output`, staging audio at `pcm_path`. Both
    /// paths are scratch-tracked by the caller.
    async fn encode(
        &self,
        result: &GenerationResult,
        pcm_path: &Path,
        output: &Path,
    ) -> Result<(), EncodeError>;
}

/// [`ArtifactEncoder`] shelling out to ffmpeg.
pub struct FfmpegEncoder {
    ffmpeg: String,
    fps: u32,
    sample_rate: u32,
}

impl FfmpegEncoder {
    /// Use ffmpeg from the `AVFUSE_FFMPEG_PATH` environment variable,
    /// falling back to `ffmpeg` on `PATH`.
    pub fn new() -> Self {
        let ffmpeg =
            std::env::var("AVFUSE_FFMPEG_PATH").unwrap_or_else(|_| DEFAULT_FFMPEG.to_string());
        Self {
            ffmpeg,
            fps: defaults::VIDEO_FPS,
            sample_rate: defaults::AUDIO_SAMPLE_RATE,
        }
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<String>) -> Self {
        self.ffmpeg = path.into();
        self
    }

    /// Full ffmpeg argument vector for one encode. Pure so tests can pin it.
    fn build_args(&self, video: &VideoPayload, pcm_path: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            // video: raw frames on stdin
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-video_size".to_string(),
            format!("{}x{}", video.width, video.height),
            "-framerate".to_string(),
            self.fps.to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            // audio: staged f32 mono PCM
            "-f".to_string(),
            "f32le".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-i".to_string(),
            pcm_path.display().to_string(),
            // outputs
            "-c:v".to_string(),
            "libx264".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-preset".to_string(),
            "medium".to_string(),
            "-crf".to_string(),
            "18".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            output.display().to_string(),
        ]
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactEncoder for FfmpegEncoder {
    async fn encode(
        &self,
        result: &GenerationResult,
        pcm_path: &Path,
        output: &Path,
    ) -> Result<(), EncodeError> {
        check_geometry(result)?;

        tokio::fs::write(pcm_path, &result.audio.data).await?;

        let args = self.build_args(&result.video, pcm_path, output);
        debug!(program = %self.ffmpeg, ?args, "spawning encoder");
        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EncodeError::Spawn {
                program: self.ffmpeg.clone(),
                source,
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| EncodeError::Io {
            source: std::io::Error::other("encoder stdin unavailable"),
        })?;
        let stderr = child.stderr.take();

        // Feed frames and drain stderr concurrently; ffmpeg writes
        // diagnostics while reading stdin and blocking either side can wedge
        // the pipe.
        let frames = result.video.data.clone();
        let feed = async move {
            stdin.write_all(&frames).await?;
            stdin.shutdown().await?;
            Ok::<_, std::io::Error>(())
        };
        let drain = async move {
            let mut text = String::new();
            if let Some(stderr) = stderr {
                let _ = BufReader::new(stderr).read_to_string(&mut text).await;
            }
            text
        };
        let (fed, stderr_text) = tokio::join!(feed, drain);

        let status = child.wait().await?;
        if !status.success() {
            return Err(EncodeError::Failed {
                code: status.code().unwrap_or(-1),
                stderr: stderr_text.trim().chars().take(500).collect(),
            });
        }
        // A feed failure with a clean exit still means the artifact cannot
        // be trusted.
        fed?;

        debug!(output = %output.display(), "artifact encoded");
        Ok(())
    }
}

fn check_geometry(result: &GenerationResult) -> Result<(), EncodeError> {
    let video = &result.video;
    if video.data.len() != video.expected_len() {
        return Err(EncodeError::Geometry {
            reason: format!(
                "video payload is {} bytes but {}x{} rgb24 x {} frames needs {}",
                video.data.len(),
                video.width,
                video.height,
                video.frame_count,
                video.expected_len()
            ),
        });
    }
    let audio = &result.audio;
    if audio.data.len() != audio.expected_len() {
        return Err(EncodeError::Geometry {
            reason: format!(
                "audio payload is {} bytes but {} f32 samples need {}",
                audio.data.len(),
                audio.sample_count,
                audio.expected_len()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use avfuse_engine::AudioPayload;
    use bytes::Bytes;

    fn payload(frames: u32, samples: u64) -> GenerationResult {
        GenerationResult {
            video: VideoPayload {
                data: Bytes::from(vec![0u8; 2 * 2 * 3 * frames as usize]),
                width: 2,
                height: 2,
                frame_count: frames,
            },
            audio: AudioPayload {
                data: Bytes::from(vec![0u8; samples as usize * 4]),
                sample_count: samples,
            },
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn build_args_pin_the_encode_contract() {
        let encoder = FfmpegEncoder::new().with_ffmpeg_path("ffmpeg");
        let video = VideoPayload {
            data: Bytes::new(),
            width: 960,
            height: 960,
            frame_count: 240,
        };
        let args = encoder.build_args(
            &video,
            Path::new("/scratch/audio_j.f32"),
            Path::new("/scratch/avfuse_42.mp4"),
        );

        assert_eq!(
            args,
            vec![
                "-y",
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-video_size",
                "960x960",
                "-framerate",
                "24",
                "-i",
                "pipe:0",
                "-f",
                "f32le",
                "-ar",
                "16000",
                "-ac",
                "1",
                "-i",
                "/scratch/audio_j.f32",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-preset",
                "medium",
                "-crf",
                "18",
                "-c:a",
                "aac",
                "-b:a",
                "192k",
                "-movflags",
                "+faststart",
                "/scratch/avfuse_42.mp4",
            ]
        );
    }

    #[test]
    fn well_formed_payload_passes_geometry_check() {
        assert!(check_geometry(&payload(3, 16)).is_ok());
    }

    #[test]
    fn short_video_payload_is_rejected() {
        let mut result = payload(3, 16);
        result.video.frame_count = 4;
        match check_geometry(&result) {
            Err(EncodeError::Geometry { reason }) => {
                assert!(reason.contains("video payload"), "reason: {reason}");
            }
            other => panic!("expected Geometry, got {other:?}"),
        }
    }

    #[test]
    fn short_audio_payload_is_rejected() {
        let mut result = payload(3, 16);
        result.audio.sample_count = 17;
        match check_geometry(&result) {
            Err(EncodeError::Geometry { reason }) => {
                assert!(reason.contains("audio payload"), "reason: {reason}");
            }
            other => panic!("expected Geometry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_encoder_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FfmpegEncoder::new().with_ffmpeg_path("/definitely/not/ffmpeg");

        let err = encoder
            .encode(
                &payload(1, 4),
                &dir.path().join("a.f32"),
                &dir.path().join("out.mp4"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EncodeError::Spawn { .. }));
    }
}
