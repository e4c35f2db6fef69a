//! Format normalisation: local file → `(media type, bytes)` the model can read.
//!
//! Raster files (JPEG, PNG, GIF, WebP) are passed through byte-for-byte after
//! a header decode proves they are images. SVG is rasterised to PNG first:
//! vision APIs do not accept vector input, and a 4× upscale keeps small
//! drawing labels legible.
//!
//! Decoding and rasterising are CPU-bound, so both run in `spawn_blocking`.
//!
//! SVG `<text>` needs a font database: without one usvg drops every text
//! node. System fonts are loaded once per process, on first rasterisation.

use crate::config::MediaTypePolicy;
use crate::error::AnalyzerError;
use image::ImageFormat;
use once_cell::sync::Lazy;
use resvg::usvg::fontdb;
use resvg::{tiny_skia, usvg};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A normalised image ready for encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub media_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Media types the model boundary accepts for local content.
pub const SUPPORTED_MEDIA_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Converts local files into payloads with a reliable media type.
#[derive(Debug, Clone, Copy)]
pub struct FormatNormalizer {
    policy: MediaTypePolicy,
    svg_scale: f32,
}

impl FormatNormalizer {
    pub fn new(policy: MediaTypePolicy, svg_scale: f32) -> Self {
        Self { policy, svg_scale }
    }

    /// Read, validate and (for SVG) rasterise the file at `path`.
    ///
    /// `reference` is the caller's original string, used in error messages.
    pub async fn normalize(
        &self,
        reference: &str,
        path: &Path,
    ) -> Result<NormalizedImage, AnalyzerError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| AnalyzerError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let this = *self;
        let reference = reference.to_string();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || this.normalize_blocking(&reference, &path, bytes))
            .await
            .map_err(|e| AnalyzerError::Internal(format!("Normalise task panicked: {}", e)))?
    }

    /// Blocking implementation of [`Self::normalize`] on already-read bytes.
    pub fn normalize_blocking(
        &self,
        reference: &str,
        path: &Path,
        bytes: Vec<u8>,
    ) -> Result<NormalizedImage, AnalyzerError> {
        if is_vector(path) {
            info!("Detected SVG file, converting to PNG: {}", reference);
            let png = rasterise_svg(path, &bytes, self.svg_scale)?;
            info!("Converted SVG to PNG: {} ({} bytes)", path.display(), png.len());
            return Ok(NormalizedImage {
                media_type: "image/png",
                bytes: png,
            });
        }

        let sniffed = validate_raster(reference, &bytes)?;

        let media_type = match self.policy {
            MediaTypePolicy::Permissive => media_type_for_extension(path),
            MediaTypePolicy::Strict => {
                media_type_for_format(sniffed).ok_or_else(|| AnalyzerError::InvalidImage {
                    reference: reference.to_string(),
                    detail: format!("{:?} is not an accepted format", sniffed),
                })?
            }
        };

        info!("Using local image: {} ({} bytes)", reference, bytes.len());
        Ok(NormalizedImage { media_type, bytes })
    }
}

/// Vector input is detected by extension.
pub fn is_vector(path: &Path) -> bool {
    extension(path).as_deref() == Some("svg")
}

/// Extension → media type. Unknown extensions fall back to `image/jpeg`.
pub fn media_type_for_extension(path: &Path) -> &'static str {
    match extension(path).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

fn media_type_for_format(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Prove `bytes` is a well-formed raster image by decoding its header.
fn validate_raster(reference: &str, bytes: &[u8]) -> Result<ImageFormat, AnalyzerError> {
    let invalid = |detail: String| AnalyzerError::InvalidImage {
        reference: reference.to_string(),
        detail,
    };

    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| invalid(e.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| invalid("cannot identify image file".to_string()))?;
    let (w, h) = reader.into_dimensions().map_err(|e| invalid(e.to_string()))?;

    debug!("Image format: {:?}, size: {}x{}", format, w, h);
    Ok(format)
}

/// Family used for `<text>` without a `font-family`.
const DEFAULT_FONT_FAMILY: &str = "sans-serif";

/// System fonts, shared by every rasterisation.
static SYSTEM_FONTS: Lazy<Arc<fontdb::Database>> = Lazy::new(|| {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    // fontdb maps the generic families to Windows/macOS names; point them at
    // an installed face when those are missing (common on Linux).
    let sans = fontdb::Query {
        families: &[fontdb::Family::SansSerif],
        ..fontdb::Query::default()
    };
    if db.query(&sans).is_none() {
        let installed = db
            .faces()
            .find_map(|face| face.families.first().map(|(name, _)| name.clone()));
        if let Some(name) = installed {
            debug!("Using '{}' for generic SVG font families", name);
            db.set_serif_family(name.clone());
            db.set_sans_serif_family(name.clone());
            db.set_monospace_family(name);
        }
    }

    if db.is_empty() {
        warn!("No system fonts found; SVG text will not be rendered");
    } else {
        debug!("Loaded {} font faces for SVG text", db.len());
    }
    Arc::new(db)
});

/// Number of font faces available to SVG text (loads them on first call).
pub fn system_font_count() -> usize {
    SYSTEM_FONTS.len()
}

/// Rasterise an SVG document to PNG at `scale`× its intrinsic size.
pub fn rasterise_svg(path: &Path, svg: &[u8], scale: f32) -> Result<Vec<u8>, AnalyzerError> {
    let fail = |detail: String| AnalyzerError::Rasterisation {
        path: PathBuf::from(path),
        detail,
    };

    let options = usvg::Options {
        resources_dir: path.parent().map(Path::to_path_buf),
        font_family: DEFAULT_FONT_FAMILY.to_string(),
        fontdb: Arc::clone(&SYSTEM_FONTS),
        ..usvg::Options::default()
    };
    let tree = usvg::Tree::from_data(svg, &options).map_err(|e| fail(e.to_string()))?;

    let size = tree
        .size()
        .to_int_size()
        .scale_by(scale)
        .ok_or_else(|| fail(format!("cannot scale {:?} by {}", tree.size(), scale)))?;
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| fail(format!("empty raster size {}x{}", size.width(), size.height())))?;

    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );

    pixmap.encode_png().map_err(|e| fail(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="10">
        <rect width="20" height="10" fill="red"/></svg>"#;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    fn permissive() -> FormatNormalizer {
        FormatNormalizer::new(MediaTypePolicy::Permissive, 4.0)
    }

    #[test]
    fn extension_map() {
        assert_eq!(media_type_for_extension(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(media_type_for_extension(Path::new("a.png")), "image/png");
        assert_eq!(media_type_for_extension(Path::new("a.gif")), "image/gif");
        assert_eq!(media_type_for_extension(Path::new("a.webp")), "image/webp");
        assert_eq!(media_type_for_extension(Path::new("a.bmp")), "image/jpeg");
        assert_eq!(media_type_for_extension(Path::new("noext")), "image/jpeg");
    }

    #[test]
    fn raster_bytes_pass_through_unchanged() {
        let bytes = png_bytes();
        let out = permissive()
            .normalize_blocking("a.png", Path::new("a.png"), bytes.clone())
            .unwrap();
        assert_eq!(out.media_type, "image/png");
        assert_eq!(out.bytes, bytes);
    }

    #[test]
    fn permissive_trusts_extension() {
        // PNG content behind an unknown extension keeps the jpeg fallback.
        let out = permissive()
            .normalize_blocking("a.img", Path::new("a.img"), png_bytes())
            .unwrap();
        assert_eq!(out.media_type, "image/jpeg");
    }

    #[test]
    fn strict_uses_sniffed_format() {
        let strict = FormatNormalizer::new(MediaTypePolicy::Strict, 4.0);
        let out = strict
            .normalize_blocking("a.img", Path::new("a.img"), png_bytes())
            .unwrap();
        assert_eq!(out.media_type, "image/png");
    }

    #[test]
    fn garbage_is_invalid_image() {
        let err = permissive()
            .normalize_blocking("fake.jpg", Path::new("fake.jpg"), b"fake jpg data".to_vec())
            .unwrap_err();
        assert_eq!(err.error_type(), "InvalidImage");
        assert!(err.to_string().contains("fake.jpg"));
    }

    #[test]
    fn svg_is_rasterised_at_scale() {
        let out = permissive()
            .normalize_blocking("d.svg", Path::new("d.svg"), SVG.as_bytes().to_vec())
            .unwrap();
        assert_eq!(out.media_type, "image/png");
        let img = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!((img.width(), img.height()), (80, 40));
    }

    #[test]
    fn svg_text_is_drawn() {
        if system_font_count() == 0 {
            eprintln!("skipping: no system fonts installed");
            return;
        }
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="40">
            <rect width="200" height="40" fill="white"/>
            <text x="4" y="30" font-size="24" fill="black">HELLO LABEL</text></svg>"#;
        let png = rasterise_svg(Path::new("label.svg"), svg.as_bytes(), 4.0).unwrap();
        let img = image::load_from_memory(&png).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (800, 160));

        let dark = img.pixels().filter(|p| p.0[0] < 128).count();
        assert!(dark > 500, "label text missing from raster: {dark} dark pixels");
    }

    #[test]
    fn broken_svg_is_reported() {
        let err = rasterise_svg(Path::new("x.svg"), b"<svg", 4.0).unwrap_err();
        assert_eq!(err.error_type(), "InvalidImage");
        assert!(err.to_string().contains("x.svg"));
    }

    #[test]
    fn normalize_reads_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pic.png");
        std::fs::write(&path, png_bytes()).unwrap();
        let out = tokio_test::block_on(permissive().normalize("pic.png", &path)).unwrap();
        assert_eq!(out.media_type, "image/png");
    }
}
