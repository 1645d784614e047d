//! Image download engine
//!
//! Downloads go to a staging file first. The caller inspects the returned
//! [`FetchedImage`] (sniffed format, dimensions, hash), then either
//! [`commit`](DownloadEngine::commit)s it under its final name or
//! [`discard`](DownloadEngine::discard)s it.

use crate::config::{Config, RetryConfig};
use crate::error::{DownloadError, Error, Result};
use crate::retry::download_with_retry;
use crate::sources::ImageCandidate;
use crate::types::ImageKind;
use crate::utils::sha256_hex;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A downloaded body sitting in its staging file
#[must_use]
#[derive(Clone, Debug)]
pub struct FetchedImage {
    /// URL the body was fetched from
    pub url: String,
    /// Where the body was written
    pub staging_path: PathBuf,
    /// `Content-Type` header, if any
    pub declared_type: Option<String>,
    /// Format sniffed from the body's magic bytes
    pub kind: Option<ImageKind>,
    /// Pixel dimensions read from the image header
    pub dimensions: Option<(u32, u32)>,
    /// Body length in bytes
    pub byte_size: u64,
    /// Lowercase hex SHA-256 of the body
    pub content_hash: String,
}

impl FetchedImage {
    /// Copy what the download learned into the candidate for the full validation pass
    pub fn annotate(&self, candidate: &mut ImageCandidate) {
        candidate.content_type = self
            .kind
            .or_else(|| self.declared_type.as_deref().and_then(ImageKind::from_mime));
        if self.dimensions.is_some() {
            candidate.dimensions = self.dimensions;
        }
        candidate.byte_size = Some(self.byte_size);
        candidate.content_hash = Some(self.content_hash.clone());
    }
}

/// Fetches candidate images with retry
#[derive(Clone, Debug)]
pub struct DownloadEngine {
    client: reqwest::Client,
    retry: RetryConfig,
    max_bytes: u64,
}

impl DownloadEngine {
    /// Engine using the download, retry, size-limit and user-agent settings of `config`
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.browser.user_agent.clone())
            .timeout(config.download.timeout)
            .connect_timeout(config.download.timeout)
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            client,
            retry: config.retry.clone(),
            max_bytes: config.validation.max_image_bytes,
        })
    }

    /// Download `candidate` into `staging_path`
    ///
    /// Transient failures are retried per the retry policy; the last error is
    /// returned once attempts run out.
    pub async fn fetch(
        &self,
        candidate: &ImageCandidate,
        staging_path: &Path,
    ) -> std::result::Result<FetchedImage, DownloadError> {
        download_with_retry(&self.retry, || self.fetch_once(&candidate.url, staging_path)).await
    }

    async fn fetch_once(
        &self,
        url: &str,
        staging_path: &Path,
    ) -> std::result::Result<FetchedImage, DownloadError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes)
        {
            return Err(DownloadError::TooLarge {
                url: url.to_string(),
                limit: self.max_bytes,
            });
        }

        let declared_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?
        {
            if body.len() as u64 + chunk.len() as u64 > self.max_bytes {
                return Err(DownloadError::TooLarge {
                    url: url.to_string(),
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        tokio::fs::write(staging_path, &body)
            .await
            .map_err(|e| DownloadError::Io {
                path: staging_path.to_path_buf(),
                source: e,
            })?;

        let (kind, dimensions) = sniff(&body);
        debug!(
            url = %url,
            bytes = body.len(),
            kind = ?kind,
            dimensions = ?dimensions,
            "Downloaded candidate"
        );

        Ok(FetchedImage {
            url: url.to_string(),
            staging_path: staging_path.to_path_buf(),
            declared_type,
            kind,
            dimensions,
            byte_size: body.len() as u64,
            content_hash: sha256_hex(&body),
        })
    }

    /// Move the staged body to `final_path`
    pub async fn commit(
        &self,
        fetched: FetchedImage,
        final_path: &Path,
    ) -> std::result::Result<PathBuf, DownloadError> {
        tokio::fs::rename(&fetched.staging_path, final_path)
            .await
            .map_err(|e| DownloadError::Io {
                path: final_path.to_path_buf(),
                source: e,
            })?;
        Ok(final_path.to_path_buf())
    }

    /// Delete the staged body
    pub async fn discard(&self, fetched: FetchedImage) {
        remove_staging(&fetched.staging_path).await;
    }
}

/// Remove a staging file, tolerating one that was never written
pub(crate) async fn remove_staging(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove staging file"),
    }
}

/// Format from magic bytes and dimensions from the image header
fn sniff(body: &[u8]) -> (Option<ImageKind>, Option<(u32, u32)>) {
    let Ok(format) = image::guess_format(body) else {
        return (None, None);
    };
    let kind = ImageKind::from_image_format(format);
    let dimensions = image::ImageReader::with_format(Cursor::new(body), format)
        .into_dimensions()
        .ok();
    (kind, dimensions)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Encode a solid-colour PNG; `shade` makes bodies (and hashes) distinct
    pub(crate) fn png_bytes(width: u32, height: u32, shade: u8) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([shade, 64, 128]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn engine(max_attempts: u32) -> DownloadEngine {
        let mut config = Config::default();
        config.retry = RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        config.download.timeout = Duration::from_secs(2);
        config.validation.max_image_bytes = 64 * 1024;
        DownloadEngine::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_sniffs_format_dimensions_and_hash() {
        let server = MockServer::start().await;
        let body = png_bytes(320, 200, 1);
        Mock::given(method("GET"))
            .and(path("/fish.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(body.clone()),
            )
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let staging = dir.path().join("nila_0001.part");
        let candidate = ImageCandidate::new("test", format!("{}/fish.png", server.uri()));

        let fetched = engine(0).fetch(&candidate, &staging).await.unwrap();
        assert_eq!(fetched.kind, Some(ImageKind::Png));
        assert_eq!(fetched.dimensions, Some((320, 200)));
        assert_eq!(fetched.byte_size, body.len() as u64);
        assert_eq!(fetched.content_hash, sha256_hex(&body));
        assert_eq!(std::fs::read(&staging).unwrap(), body);

        let mut annotated = candidate.clone();
        fetched.annotate(&mut annotated);
        assert_eq!(annotated.content_type, Some(ImageKind::Png));
        assert_eq!(annotated.dimensions, Some((320, 200)));

        let final_path = dir.path().join("nila_0001.png");
        let saved = engine(0).commit(fetched, &final_path).await.unwrap();
        assert_eq!(saved, final_path);
        assert!(final_path.exists());
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_transient_status_is_retried_n_plus_one_times() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy.jpg"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let candidate = ImageCandidate::new("test", format!("{}/busy.jpg", server.uri()));
        let err = engine(2)
            .fetch(&candidate, &dir.path().join("x.part"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let candidate = ImageCandidate::new("test", format!("{}/gone.jpg", server.uri()));
        let err = engine(3)
            .fetch(&candidate, &dir.path().join("x.part"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_oversize_body_is_rejected_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 100 * 1024]))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let staging = dir.path().join("big.part");
        let candidate = ImageCandidate::new("test", format!("{}/big.jpg", server.uri()));
        let err = engine(3).fetch(&candidate, &staging).await.unwrap_err();
        assert!(matches!(err, DownloadError::TooLarge { .. }));
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_non_image_body_has_no_kind_and_can_be_discarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html>not an image</html>", "text/html"),
            )
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let staging = dir.path().join("page.part");
        let candidate = ImageCandidate::new("test", format!("{}/page.jpg", server.uri()));
        let fetched = engine(0).fetch(&candidate, &staging).await.unwrap();
        assert_eq!(fetched.kind, None);
        assert_eq!(fetched.dimensions, None);
        assert_eq!(fetched.declared_type.as_deref(), Some("text/html"));

        engine(0).discard(fetched).await;
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_unwritable_staging_path_is_io_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(200, 200, 9)))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let staging = dir.path().join("missing-dir").join("x.part");
        let candidate = ImageCandidate::new("test", format!("{}/a.png", server.uri()));
        let err = engine(3).fetch(&candidate, &staging).await.unwrap_err();
        assert!(err.is_infrastructure());
    }
}
