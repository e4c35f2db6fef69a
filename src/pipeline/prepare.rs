//! Image preparation: one user reference → one [`PreparedContent`].
//!
//! URLs are checked with a HEAD request and passed through; everything else
//! goes through [`PathResolver`] and [`FormatNormalizer`]. A preparer holds
//! no mutable state, so any number of references can be prepared
//! concurrently from one shared instance.

use crate::error::AnalyzerError;
use crate::pipeline::encode::PreparedContent;
use crate::pipeline::normalize::FormatNormalizer;
use crate::pipeline::resolve::PathResolver;
use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Check if the reference looks like a URL.
pub fn is_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Outcome of a HEAD check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub content_type: Option<String>,
}

/// The URL HEAD-check boundary.
#[async_trait]
pub trait UrlProbe: Send + Sync {
    /// Issue a HEAD request to `url`, following redirects.
    ///
    /// Transport failures are errors; any HTTP status is a response.
    async fn head(&self, url: &str) -> Result<ProbeResponse, AnalyzerError>;
}

/// [`UrlProbe`] over reqwest with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpUrlProbe {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpUrlProbe {
    pub fn new(timeout_secs: u64) -> Result<Self, AnalyzerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| AnalyzerError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }
}

#[async_trait]
impl UrlProbe for HttpUrlProbe {
    async fn head(&self, url: &str) -> Result<ProbeResponse, AnalyzerError> {
        let response = self.client.head(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AnalyzerError::Timeout {
                    target: url.to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                AnalyzerError::InvalidUrl {
                    url: url.to_string(),
                    message: format!("Failed to access URL: {url}. Error: {e}"),
                    source: Some(e),
                }
            }
        })?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(ProbeResponse {
            status: response.status().as_u16(),
            content_type,
        })
    }
}

/// Composes URL validation, path resolution and format normalisation.
#[derive(Clone)]
pub struct ImagePreparer {
    resolver: PathResolver,
    normalizer: FormatNormalizer,
    probe: Arc<dyn UrlProbe>,
}

impl ImagePreparer {
    pub fn new(resolver: PathResolver, normalizer: FormatNormalizer, probe: Arc<dyn UrlProbe>) -> Self {
        Self {
            resolver,
            normalizer,
            probe,
        }
    }

    /// Prepare a single reference.
    pub async fn prepare(&self, reference: &str) -> Result<PreparedContent, AnalyzerError> {
        if is_url(reference) {
            self.validate_url(reference).await?;
            info!("Using image URL: {}", reference);
            return Ok(PreparedContent::Url {
                url: reference.to_string(),
            });
        }

        // Resolution probes the filesystem (canonicalize, exists), so it runs
        // off the async worker like the rest of the file access.
        let resolver = self.resolver.clone();
        let owned = reference.to_string();
        let path = tokio::task::spawn_blocking(move || resolver.resolve(&owned))
            .await
            .map_err(|e| AnalyzerError::Internal(format!("Resolve task panicked: {}", e)))??;

        let meta = tokio::fs::metadata(&path).await.map_err(|_| AnalyzerError::NotFound {
            reference: reference.to_string(),
            attempts: vec![path.clone()],
        })?;
        if !meta.is_file() {
            return Err(AnalyzerError::NotAFile {
                reference: reference.to_string(),
            });
        }

        let image = self.normalizer.normalize(reference, &path).await?;
        Ok(PreparedContent::Binary {
            media_type: image.media_type,
            payload: image.bytes,
        })
    }

    /// Prepare every reference concurrently.
    ///
    /// Output is index-aligned with `references` whatever order the
    /// preparations finish in. The first failure fails the whole batch.
    pub async fn prepare_all(
        &self,
        references: &[String],
    ) -> Result<Vec<PreparedContent>, AnalyzerError> {
        info!("Preparing {} image(s) for analysis", references.len());
        try_join_all(references.iter().map(|r| self.prepare(r))).await
    }

    async fn validate_url(&self, url: &str) -> Result<(), AnalyzerError> {
        let response = self.probe.head(url).await?;

        if !(200..300).contains(&response.status) {
            return Err(AnalyzerError::InvalidUrl {
                url: url.to_string(),
                message: format!(
                    "URL returned status {}: {}. Please check that the URL is correct and accessible.",
                    response.status, url
                ),
                source: None,
            });
        }

        let content_type = response.content_type.as_deref().unwrap_or("");
        if !content_type.starts_with("image/") {
            warn!(
                "URL does not appear to be an image (content-type: {}): {}",
                content_type, url
            );
        }
        debug!("Validated URL: {} (content-type: {})", url, content_type);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaTypePolicy;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::collections::HashMap;
    use std::io::Cursor;
    use tempfile::TempDir;

    struct FixedProbe(HashMap<String, ProbeResponse>);

    #[async_trait]
    impl UrlProbe for FixedProbe {
        async fn head(&self, url: &str) -> Result<ProbeResponse, AnalyzerError> {
            self.0.get(url).cloned().ok_or_else(|| AnalyzerError::InvalidUrl {
                url: url.to_string(),
                message: format!("Failed to access URL: {url}"),
                source: None,
            })
        }
    }

    fn probe(entries: &[(&str, u16, &str)]) -> Arc<dyn UrlProbe> {
        Arc::new(FixedProbe(
            entries
                .iter()
                .map(|(u, s, ct)| {
                    (
                        u.to_string(),
                        ProbeResponse {
                            status: *s,
                            content_type: Some(ct.to_string()),
                        },
                    )
                })
                .collect(),
        ))
    }

    fn preparer(dir: &std::path::Path, probe: Arc<dyn UrlProbe>) -> ImagePreparer {
        ImagePreparer::new(
            PathResolver::new(dir),
            FormatNormalizer::new(MediaTypePolicy::Permissive, 4.0),
            probe,
        )
    }

    fn write_png(path: &std::path::Path) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        std::fs::write(path, &buf).unwrap();
        buf
    }

    #[test]
    fn url_detection() {
        assert!(is_url("https://example.com/a.png"));
        assert!(is_url("http://example.com/a.png"));
        assert!(!is_url("ftp://example.com/a.png"));
        assert!(!is_url("/tmp/a.png"));
        assert!(!is_url(""));
    }

    #[tokio::test]
    async fn url_passes_through_after_head_check() {
        let dir = TempDir::new().unwrap();
        let p = preparer(dir.path(), probe(&[("https://x.test/a.png", 200, "image/png")]));
        let got = p.prepare("https://x.test/a.png").await.unwrap();
        assert_eq!(
            got,
            PreparedContent::Url {
                url: "https://x.test/a.png".into()
            }
        );
    }

    #[tokio::test]
    async fn non_image_content_type_only_warns() {
        let dir = TempDir::new().unwrap();
        let p = preparer(dir.path(), probe(&[("https://x.test/page", 200, "text/html")]));
        assert!(p.prepare("https://x.test/page").await.is_ok());
    }

    #[tokio::test]
    async fn bad_status_is_invalid_url() {
        let dir = TempDir::new().unwrap();
        let p = preparer(dir.path(), probe(&[("https://x.test/gone.png", 404, "text/html")]));
        let err = p.prepare("https://x.test/gone.png").await.unwrap_err();
        assert_eq!(err.error_type(), "InvalidURL");
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn local_file_becomes_binary() {
        let dir = TempDir::new().unwrap();
        let bytes = write_png(&dir.path().join("a.png"));
        let p = preparer(dir.path(), probe(&[]));
        let got = p.prepare("a.png").await.unwrap();
        assert_eq!(
            got,
            PreparedContent::Binary {
                media_type: "image/png",
                payload: bytes
            }
        );
    }

    #[tokio::test]
    async fn directory_is_not_a_file() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("shots")).unwrap();
        let p = preparer(dir.path(), probe(&[]));
        let err = p.prepare("shots").await.unwrap_err();
        assert_eq!(err.error_type(), "NotAFile");
    }

    #[tokio::test]
    async fn missing_absolute_path_is_not_found() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.png");
        let p = preparer(dir.path(), probe(&[]));
        let err = p.prepare(missing.to_str().unwrap()).await.unwrap_err();
        assert_eq!(err.error_type(), "FileNotFoundError");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn fallback_resolution_runs_on_single_threaded_runtime() {
        let dir = TempDir::new().unwrap();
        let bytes = write_png(&dir.path().join("b.png"));
        write_png(&dir.path().join("a.png"));
        let p = preparer(dir.path(), probe(&[]));

        let refs = vec!["proj/b.png".to_string(), "a.png".to_string(), "proj/b.png".to_string()];
        let got = p.prepare_all(&refs).await.unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0], got[2]);
        assert_eq!(
            got[0],
            PreparedContent::Binary {
                media_type: "image/png",
                payload: bytes
            }
        );

        let err = p.prepare("proj/none.png").await.unwrap_err();
        assert_eq!(err.error_type(), "FileNotFoundError");
    }

    #[tokio::test]
    async fn repeated_preparation_is_identical() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("same.png");
        write_png(&path);
        let p = preparer(dir.path(), probe(&[]));
        let a = p.prepare(path.to_str().unwrap()).await.unwrap();
        let b = p.prepare(path.to_str().unwrap()).await.unwrap();
        assert_eq!(a, b);
    }
}
