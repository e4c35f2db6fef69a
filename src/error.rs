//! Error types for the llm-image-analyzer library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AnalyzerError`] — **Fatal**: the request cannot produce an answer
//!   (bad arguments, missing provider configuration, an image that cannot be
//!   resolved in the standard vision path, a failed model call). Converted
//!   into an [`crate::output::ErrorEnvelope`] at the top of
//!   [`crate::analyze::ImageAnalyzer::analyze_images`].
//!
//! * [`SectionError`] — **Non-fatal**: a single image failed in OCR mode.
//!   Rendered inline under that image's heading while the remaining images
//!   are still processed.

use std::error::Error as StdError;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the llm-image-analyzer library.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    // ── Caller input ──────────────────────────────────────────────────────
    /// A tool argument failed validation.
    #[error("{0}")]
    InvalidInput(String),

    /// A provider needed by the request is not configured.
    #[error("{0}")]
    Configuration(String),

    // ── Local files ───────────────────────────────────────────────────────
    /// No file exists at any of the attempted locations.
    #[error(
        "Image not found at path: {reference}. Tried: {}. Please check that the file exists and the path is correct.",
        join_attempts(.attempts)
    )]
    NotFound {
        reference: String,
        attempts: Vec<PathBuf>,
    },

    /// The reference resolved to something that is not a regular file.
    #[error("Path is not a file: {reference}. Please provide a path to an image file.")]
    NotAFile { reference: String },

    /// The file exists but could not be decoded as a supported image.
    #[error(
        "Invalid image file at {reference}. Supported formats: JPEG, PNG, GIF, WebP, SVG. Error: {detail}"
    )]
    InvalidImage { reference: String, detail: String },

    /// An SVG file could not be rasterised.
    #[error("Failed to convert SVG to PNG: {path}. Error: {detail}")]
    Rasterisation { path: PathBuf, detail: String },

    /// Reading a resolved file failed after it was found.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Network ───────────────────────────────────────────────────────────
    /// The URL answered with a non-success status or could not be reached.
    #[error("{message}")]
    InvalidUrl {
        url: String,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// A bounded network call exceeded its time limit.
    #[error("Timeout after {secs}s while accessing {target}. Please check your network connection and try again.")]
    Timeout { target: String, secs: u64 },

    /// The model or OCR endpoint returned a non-success response.
    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The endpoint answered successfully but the body was unusable.
    #[error("{0}")]
    MalformedResponse(String),

    /// Provider SDK or transport failure without an HTTP status.
    #[error("{provider} request failed: {detail}")]
    Provider { provider: String, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (join failure, caught panic, …).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalyzerError {
    /// The `error_type` string surfaced in error envelopes.
    pub fn error_type(&self) -> &'static str {
        match self {
            AnalyzerError::InvalidInput(_) => "ValueError",
            AnalyzerError::Configuration(_) => "ConfigurationError",
            AnalyzerError::NotFound { .. } => "FileNotFoundError",
            AnalyzerError::NotAFile { .. } => "NotAFile",
            AnalyzerError::InvalidImage { .. } | AnalyzerError::Rasterisation { .. } => {
                "InvalidImage"
            }
            AnalyzerError::Io { .. } => "IOError",
            AnalyzerError::InvalidUrl { .. } => "InvalidURL",
            AnalyzerError::Timeout { .. } => "Timeout",
            AnalyzerError::Api { .. }
            | AnalyzerError::MalformedResponse(_)
            | AnalyzerError::Provider { .. } => "APIError",
            AnalyzerError::Internal(_) => "InternalError",
        }
    }

    /// Classify a reqwest failure against `target`, honouring its timeout.
    pub(crate) fn from_transport(target: &str, secs: u64, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AnalyzerError::Timeout {
                target: target.to_string(),
                secs,
            }
        } else {
            AnalyzerError::Provider {
                provider: target.to_string(),
                detail: e.to_string(),
            }
        }
    }
}

fn join_attempts(attempts: &[PathBuf]) -> String {
    attempts
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Render `err` and its `source()` chain, one level per line.
pub fn render_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        current = cause.source();
    }
    out
}

/// A non-fatal failure for one image in an OCR batch.
///
/// Each variant renders as the inline marker placed under the image's
/// `=== <reference> ===` heading.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SectionError {
    /// The OCR endpoint answered with a non-success status.
    #[error("[Error: HTTP {status}: {body}]")]
    Http { status: u16, body: String },

    /// The OCR response body could not be interpreted.
    #[error("[Error extracting text: {0}]")]
    Extraction(String),

    /// The OCR call succeeded but no page carried any text.
    #[error("[No text extracted from {0}]")]
    Empty(String),

    /// Resolving, reading or sending the image failed.
    #[error("[Error: {0}]")]
    Failed(String),
}

impl From<AnalyzerError> for SectionError {
    fn from(e: AnalyzerError) -> Self {
        match e {
            AnalyzerError::Api { status, body } => SectionError::Http { status, body },
            AnalyzerError::MalformedResponse(detail) => SectionError::Extraction(detail),
            other => SectionError::Failed(other.to_string()),
        }
    }
}
