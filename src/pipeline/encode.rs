//! Prepared content and its wire encodings.
//!
//! [`PreparedContent`] is the unit handed to the model and OCR boundaries:
//! either raw bytes with a media type (local files, rasterised SVG) or a
//! validated remote URL. Both vision APIs and the OCR endpoint take images
//! as URLs, so local bytes travel as base64 `data:` URLs.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// One image ready for a model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedContent {
    /// Local or converted content.
    Binary {
        media_type: &'static str,
        payload: Vec<u8>,
    },
    /// Remote content, passed through unchanged.
    Url { url: String },
}

impl PreparedContent {
    /// Base64 of the payload; `None` for URL content.
    pub fn base64(&self) -> Option<String> {
        match self {
            PreparedContent::Binary { payload, .. } => Some(STANDARD.encode(payload)),
            PreparedContent::Url { .. } => None,
        }
    }

    /// The URL form: the remote URL itself, or a `data:` URL for bytes.
    pub fn to_url(&self) -> String {
        match self {
            PreparedContent::Binary { media_type, payload } => {
                let url = data_url(media_type, payload);
                debug!("Encoded image → {} chars data URL", url.len());
                url
            }
            PreparedContent::Url { url } => url.clone(),
        }
    }

    pub fn media_type(&self) -> Option<&'static str> {
        match self {
            PreparedContent::Binary { media_type, .. } => Some(media_type),
            PreparedContent::Url { .. } => None,
        }
    }
}

/// `data:<media type>;base64,<payload>`
pub fn data_url(media_type: &str, payload: &[u8]) -> String {
    format!("data:{};base64,{}", media_type, STANDARD.encode(payload))
}
