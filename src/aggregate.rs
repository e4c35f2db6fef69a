//! OCR mode: one labelled text section per image.
//!
//! Images are processed strictly one after another, in input order, so the
//! OCR endpoint never sees more than one request at a time from a single
//! call. Each image yields a `Result<String, SectionError>`; a failure is
//! rendered inline under its heading and never stops the batch.

use crate::error::{AnalyzerError, SectionError};
use crate::output::AnalysisResult;
use crate::pipeline::ocr::OcrClient;
use crate::pipeline::prepare::ImagePreparer;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Backend label used in the `model` field of OCR results.
pub const OCR_BACKEND: &str = "mistral";

/// The error for an OCR request with no endpoint configured.
pub fn not_configured() -> AnalyzerError {
    AnalyzerError::Configuration(
        "Azure configuration required for Mistral Document AI. \
         Please set AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_API_KEY."
            .into(),
    )
}

/// Runs a batch of images through the OCR boundary.
#[derive(Clone)]
pub struct OcrAggregator {
    preparer: ImagePreparer,
    client: Option<Arc<dyn OcrClient>>,
    deployment: String,
}

impl OcrAggregator {
    /// `client` is `None` when the OCR endpoint is not configured.
    pub fn new(
        preparer: ImagePreparer,
        client: Option<Arc<dyn OcrClient>>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            preparer,
            client,
            deployment: deployment.into(),
        }
    }

    /// Extract text from every reference and combine the sections.
    ///
    /// Only a missing endpoint configuration fails the call as a whole.
    pub async fn run(
        &self,
        prompt: &str,
        references: &[String],
    ) -> Result<AnalysisResult, AnalyzerError> {
        let client = self.client.as_deref().ok_or_else(not_configured)?;
        info!("Using Mistral Document AI: {}", self.deployment);

        let mut sections = Vec::with_capacity(references.len());
        for reference in references {
            let outcome = AssertUnwindSafe(self.extract_one(client, reference))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(SectionError::Failed(format!(
                        "internal error while processing {reference}"
                    )))
                });
            match &outcome {
                Ok(text) => info!("OCR extracted {} characters from {}", text.len(), reference),
                Err(SectionError::Empty(_)) => warn!("Empty OCR result for {}", reference),
                Err(e) => error!("OCR failed for {}: {}", reference, e),
            }
            sections.push(render_section(reference, &outcome));
        }

        if sections.is_empty() {
            return Err(AnalyzerError::MalformedResponse(
                "No results from Mistral Document AI".into(),
            ));
        }

        let combined = sections.join("\n\n");
        let analysis = if prompt.trim().is_empty() {
            combined
        } else {
            format!("User request: {prompt}\n\n{combined}")
        };

        info!("Mistral OCR complete: processed {} image(s)", references.len());
        Ok(AnalysisResult::text(
            analysis,
            format!("{OCR_BACKEND}:{}", self.deployment),
        ))
    }

    async fn extract_one(
        &self,
        client: &dyn OcrClient,
        reference: &str,
    ) -> Result<String, SectionError> {
        let content = self.preparer.prepare(reference).await?;
        let pages = client.extract(&self.deployment, &content.to_url()).await?;

        let text = pages
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if text.is_empty() {
            return Err(SectionError::Empty(reference.to_string()));
        }
        Ok(text)
    }
}

/// `=== <reference> ===` followed by the text or the inline marker.
pub fn render_section(reference: &str, outcome: &Result<String, SectionError>) -> String {
    match outcome {
        Ok(text) => format!("=== {reference} ===\n{text}"),
        Err(marker) => format!("=== {reference} ===\n{marker}"),
    }
}
