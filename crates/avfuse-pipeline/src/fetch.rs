//! Reference image acquisition for i2v jobs.
//!
//! The image is fetched over HTTP with a hard timeout, decoded to prove it
//! actually is an image, and re-encoded as PNG at the destination so the
//! engine always sees one known format regardless of what the URL served.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

/// Whole-request ceiling for one image fetch.
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while acquiring the reference image.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("image request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("image fetch returned HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("failed to materialize reference image from {url}: {source}")]
    Image {
        url: String,
        #[source]
        source: image::ImageError,
    },

    #[error("image task failed: {reason}")]
    Task { reason: String },
}

/// Fetches a reference image to a local path.
#[async_trait]
pub trait ReferenceFetcher: Send + Sync {
    /// Fetch `url`, validate it decodes as an image, and write it to `dest`
    /// as PNG.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// [`ReferenceFetcher`] over plain HTTP(S).
pub struct HttpReferenceFetcher {
    client: reqwest::Client,
}

impl HttpReferenceFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("avfuse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReferenceFetcher for HttpReferenceFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        debug!(url, dest = %dest.display(), "fetching reference image");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status,
                url: url.to_string(),
            });
        }
        let body = response.bytes().await?;

        let url = url.to_string();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || materialize_image(&body, &url, &dest))
            .await
            .map_err(|e| FetchError::Task {
                reason: e.to_string(),
            })?
    }
}

/// Decode `body` and write it to `dest` as PNG. Blocking; run off the async
/// runtime.
fn materialize_image(body: &[u8], url: &str, dest: &Path) -> Result<(), FetchError> {
    let decoded = image::load_from_memory(body).map_err(|source| FetchError::Image {
        url: url.to_string(),
        source,
    })?;
    decoded
        .to_rgb8()
        .save(dest)
        .map_err(|source| FetchError::Image {
            url: url.to_string(),
            source,
        })?;
    debug!(
        url,
        width = decoded.width(),
        height = decoded.height(),
        "reference image materialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn tiny_png() -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(2, 2, |x, y| Rgb([x as u8 * 100, y as u8 * 100, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn materialize_writes_a_decodable_png() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ref.png");

        materialize_image(&tiny_png(), "https://example.com/ref.png", &dest).unwrap();

        let reopened = image::open(&dest).unwrap();
        assert_eq!((reopened.width(), reopened.height()), (2, 2));
    }

    #[test]
    fn garbage_bytes_are_rejected_as_image_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ref.png");

        let err = materialize_image(b"<html>not an image</html>", "https://example.com/x", &dest)
            .unwrap_err();
        assert!(matches!(err, FetchError::Image { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn unresolvable_host_is_a_network_error() {
        let fetcher = HttpReferenceFetcher::new(Duration::from_secs(5)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ref.png");

        let err = fetcher
            .fetch("https://definitely-not-a-real-host.invalid/image.png", &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
        assert!(!dest.exists());
    }
}
