//! Path-resolution behaviour seen through the public API.

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use llm_image_analyzer::pipeline::normalize::FormatNormalizer;
use llm_image_analyzer::pipeline::prepare::{ImagePreparer, UrlProbe};
use llm_image_analyzer::pipeline::resolve::PathResolver;
use llm_image_analyzer::{AnalyzerError, MediaTypePolicy, ProbeResponse};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct NoNetwork;

#[async_trait::async_trait]
impl UrlProbe for NoNetwork {
    async fn head(&self, url: &str) -> Result<ProbeResponse, AnalyzerError> {
        panic!("unexpected HEAD {url}");
    }
}

fn write_png(path: &Path) {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    std::fs::write(path, buf).unwrap();
}

fn preparer(base: &Path) -> ImagePreparer {
    ImagePreparer::new(
        PathResolver::new(base),
        FormatNormalizer::new(MediaTypePolicy::Permissive, 4.0),
        Arc::new(NoNetwork),
    )
}

#[tokio::test]
async fn project_prefixed_path_falls_back_once() {
    // Layout: <tmp>/someproject/pics/swan.png, running inside <tmp>/someproject.
    let tmp = TempDir::new().unwrap();
    let project = tmp.path().join("someproject");
    std::fs::create_dir_all(project.join("pics")).unwrap();
    write_png(&project.join("pics/swan.png"));

    let p = preparer(&project);
    let content = p.prepare("someproject/pics/swan.png").await.unwrap();
    assert_eq!(content.media_type(), Some("image/png"));

    // Only one leading component is stripped.
    let err = p.prepare("a/someproject/pics/swan.png").await.unwrap_err();
    match err {
        AnalyzerError::NotFound { attempts, .. } => {
            assert_eq!(attempts.len(), 2);
            assert!(attempts[0].ends_with("someproject/a/someproject/pics/swan.png"));
            assert!(attempts[1].ends_with("someproject/someproject/pics/swan.png"));
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn directory_is_not_a_file() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir(tmp.path().join("folder")).unwrap();
    let err = preparer(tmp.path()).prepare("folder").await.unwrap_err();
    assert_eq!(err.error_type(), "NotAFile");
}

#[tokio::test]
async fn home_relative_paths_expand() {
    let home = TempDir::new().unwrap();
    write_png(&home.path().join("me.png"));
    let elsewhere = TempDir::new().unwrap();

    let resolver = PathResolver::new(elsewhere.path()).with_home_dir(home.path());
    let resolved = resolver.resolve("~/me.png").unwrap();
    assert_eq!(resolved, std::fs::canonicalize(home.path().join("me.png")).unwrap());
}
