//! Per-job scratch file tracking.
//!
//! Every transient path a job touches is acquired through [`JobScratch`],
//! which records it immediately, before any bytes are written. When the job
//! finishes the pipeline calls [`JobScratch::release_all`] on every exit
//! path; `Drop` is a backstop for paths that would otherwise leak if
//! release never ran. Deleting a path that was never materialized is fine.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// What a tracked scratch file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Reference image fetched for an i2v job.
    DownloadedImage,
    /// The encoded MP4 before upload.
    RenderedOutput,
    /// Raw PCM handed to the encoder.
    EncoderIntermediate,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::DownloadedImage => "downloaded-image",
            ArtifactKind::RenderedOutput => "rendered-output",
            ArtifactKind::EncoderIntermediate => "encoder-intermediate",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct TempArtifact {
    kind: ArtifactKind,
    path: PathBuf,
}

/// Tracks the scratch files of exactly one job.
///
/// Construction does no IO; the root directory is expected to exist (the
/// pipeline ensures it once at startup).
#[derive(Debug)]
pub struct JobScratch {
    job_id: Uuid,
    root: PathBuf,
    tracked: Vec<TempArtifact>,
}

impl JobScratch {
    pub fn new(root: impl Into<PathBuf>, job_id: Uuid) -> Self {
        Self {
            job_id,
            root: root.into(),
            tracked: Vec::new(),
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Path the reference image will be materialized at. Tracked from this
    /// moment, even if the download later fails halfway.
    pub fn reference_image_path(&mut self) -> PathBuf {
        let path = self.root.join(format!("ref_{}.png", self.job_id));
        self.track(ArtifactKind::DownloadedImage, path)
    }

    /// Path for the raw PCM the encoder reads.
    pub fn pcm_path(&mut self) -> PathBuf {
        let path = self.root.join(format!("audio_{}.f32", self.job_id));
        self.track(ArtifactKind::EncoderIntermediate, path)
    }

    /// Path the encoded artifact lands at, named deterministically from the
    /// job seed.
    pub fn output_path(&mut self, seed: i64) -> PathBuf {
        let path = self.root.join(format!("avfuse_{seed}.mp4"));
        self.track(ArtifactKind::RenderedOutput, path)
    }

    fn track(&mut self, kind: ArtifactKind, path: PathBuf) -> PathBuf {
        self.tracked.push(TempArtifact {
            kind,
            path: path.clone(),
        });
        path
    }

    /// Paths tracked so far, newest last.
    pub fn tracked_paths(&self) -> Vec<&Path> {
        self.tracked.iter().map(|a| a.path.as_path()).collect()
    }

    /// Delete every tracked file. Files that were never materialized or are
    /// already gone are skipped silently; deletion failures are logged and
    /// swallowed so cleanup never masks the job outcome.
    pub async fn release_all(&mut self) {
        for artifact in self.tracked.drain(..) {
            match tokio::fs::remove_file(&artifact.path).await {
                Ok(()) => {
                    debug!(kind = %artifact.kind, path = %artifact.path.display(), "scratch file removed");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(
                        kind = %artifact.kind,
                        path = %artifact.path.display(),
                        error = %e,
                        "failed to remove scratch file"
                    );
                }
            }
        }
    }
}

impl Drop for JobScratch {
    fn drop(&mut self) {
        // Backstop only: release_all normally drains the list first.
        for artifact in self.tracked.drain(..) {
            match std::fs::remove_file(&artifact.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(
                        kind = %artifact.kind,
                        path = %artifact.path.display(),
                        error = %e,
                        "scratch file leaked past drop"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn release_all_removes_every_tracked_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut scratch = JobScratch::new(dir.path(), Uuid::new_v4());

        let image = scratch.reference_image_path();
        let pcm = scratch.pcm_path();
        let output = scratch.output_path(42);
        for path in [&image, &pcm, &output] {
            tokio::fs::write(path, b"x").await.unwrap();
        }

        scratch.release_all().await;

        for path in [&image, &pcm, &output] {
            assert!(!path.exists(), "{} survived release", path.display());
        }
        assert!(scratch.tracked_paths().is_empty());
    }

    #[tokio::test]
    async fn never_materialized_paths_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let mut scratch = JobScratch::new(dir.path(), Uuid::new_v4());

        scratch.reference_image_path();
        let pcm = scratch.pcm_path();
        tokio::fs::write(&pcm, b"x").await.unwrap();

        scratch.release_all().await;
        assert!(!pcm.exists());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut scratch = JobScratch::new(dir.path(), Uuid::new_v4());
        let output = scratch.output_path(7);
        tokio::fs::write(&output, b"x").await.unwrap();

        scratch.release_all().await;
        scratch.release_all().await;
        assert!(!output.exists());
    }

    #[test]
    fn drop_backstop_removes_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let leaked = {
            let mut scratch = JobScratch::new(dir.path(), Uuid::new_v4());
            let path = scratch.output_path(7);
            std::fs::write(&path, b"x").unwrap();
            path
            // dropped without release_all
        };
        assert!(!leaked.exists());
    }

    #[test]
    fn output_path_is_seed_derived() {
        let mut scratch = JobScratch::new("/tmp/avfuse", Uuid::new_v4());
        let path = scratch.output_path(1234);
        assert_eq!(path, PathBuf::from("/tmp/avfuse/avfuse_1234.mp4"));
    }

    #[test]
    fn per_job_paths_do_not_collide_across_jobs() {
        let mut a = JobScratch::new("/tmp/avfuse", Uuid::new_v4());
        let mut b = JobScratch::new("/tmp/avfuse", Uuid::new_v4());
        assert_ne!(a.reference_image_path(), b.reference_image_path());
        assert_ne!(a.pcm_path(), b.pcm_path());
    }
}
