//! OCR boundary: one document URL in, per-page markdown out.
//!
//! The production client talks to the Mistral Document AI deployment on
//! Azure AI Foundry. The Foundry host differs from the Azure OpenAI host
//! only in its domain, so the OCR URL is derived from the configured
//! OpenAI endpoint with [`foundry_ocr_url`].

use crate::error::AnalyzerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const OPENAI_DOMAIN: &str = "cognitiveservices.azure.com";
const FOUNDRY_DOMAIN: &str = "services.ai.azure.com";
const OCR_PATH: &str = "/providers/mistral/azure/ocr";

/// `https://x.cognitiveservices.azure.com/` → `https://x.services.ai.azure.com/providers/mistral/azure/ocr`
pub fn foundry_ocr_url(openai_endpoint: &str) -> String {
    let base = openai_endpoint.replace(OPENAI_DOMAIN, FOUNDRY_DOMAIN);
    format!("{}{}", base.trim_end_matches('/'), OCR_PATH)
}

/// The OCR boundary.
#[async_trait]
pub trait OcrClient: Send + Sync {
    /// Extract page text from `document_url` (a remote URL or a data URL).
    ///
    /// Non-success responses are [`AnalyzerError::Api`]; a body without the
    /// expected shape is [`AnalyzerError::MalformedResponse`]. Pages are
    /// returned in document order and may be empty strings.
    async fn extract(&self, deployment: &str, document_url: &str)
        -> Result<Vec<String>, AnalyzerError>;
}

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: OcrDocument<'a>,
    include_image_base64: bool,
}

#[derive(Debug, Serialize)]
struct OcrDocument<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    image_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    pages: Vec<OcrPage>,
}

#[derive(Debug, Deserialize)]
struct OcrPage {
    #[serde(default)]
    markdown: Option<String>,
}

/// Parse an OCR response body into page texts.
pub fn parse_pages(body: &str) -> Result<Vec<String>, AnalyzerError> {
    let response: OcrResponse = serde_json::from_str(body)
        .map_err(|e| AnalyzerError::MalformedResponse(format!("unexpected OCR response: {e}")))?;
    Ok(response
        .pages
        .into_iter()
        .map(|p| p.markdown.unwrap_or_default())
        .collect())
}

/// Mistral Document AI on Azure AI Foundry.
#[derive(Debug, Clone)]
pub struct FoundryOcrClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    timeout_secs: u64,
}

impl FoundryOcrClient {
    pub fn new(openai_endpoint: &str, api_key: &str, timeout_secs: u64) -> Result<Self, AnalyzerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AnalyzerError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: foundry_ocr_url(openai_endpoint),
            api_key: api_key.to_string(),
            timeout_secs,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl OcrClient for FoundryOcrClient {
    async fn extract(
        &self,
        deployment: &str,
        document_url: &str,
    ) -> Result<Vec<String>, AnalyzerError> {
        let body = OcrRequest {
            model: deployment,
            document: OcrDocument {
                kind: "image_url",
                image_url: document_url,
            },
            include_image_base64: false,
        };
        debug!("POST {} ({} byte document URL)", self.url, document_url.len());

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalyzerError::from_transport(&self.url, self.timeout_secs, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AnalyzerError::from_transport(&self.url, self.timeout_secs, e))?;
        if status.as_u16() != 200 {
            return Err(AnalyzerError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let pages = parse_pages(&text)?;
        info!("OCR returned {} page(s)", pages.len());
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn foundry_url_derivation() {
        assert_eq!(
            foundry_ocr_url("https://res.cognitiveservices.azure.com/"),
            "https://res.services.ai.azure.com/providers/mistral/azure/ocr"
        );
        assert_eq!(
            foundry_ocr_url("https://res.services.ai.azure.com"),
            "https://res.services.ai.azure.com/providers/mistral/azure/ocr"
        );
    }

    #[test]
    fn request_body_shape() {
        let body = OcrRequest {
            model: "mistral-document-ai-2505",
            document: OcrDocument {
                kind: "image_url",
                image_url: "data:image/png;base64,AAAA",
            },
            include_image_base64: false,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "model": "mistral-document-ai-2505",
                "document": {"type": "image_url", "image_url": "data:image/png;base64,AAAA"},
                "include_image_base64": false
            })
        );
    }

    #[test]
    fn pages_keep_order_and_tolerate_missing_markdown() {
        let pages = parse_pages(
            r##"{"pages":[{"index":0,"markdown":"# One"},{"index":1},{"markdown":"Two"}],"model":"m"}"##,
        )
        .unwrap();
        assert_eq!(pages, vec!["# One", "", "Two"]);
        assert!(parse_pages("{}").unwrap().is_empty());
        assert!(parse_pages("not json").is_err());
    }

    #[test]
    fn client_targets_foundry_host() {
        let c = FoundryOcrClient::new("https://res.cognitiveservices.azure.com/", "k", 60).unwrap();
        assert_eq!(c.url(), "https://res.services.ai.azure.com/providers/mistral/azure/ocr");
    }
}
