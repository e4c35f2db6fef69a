//! The model-invocation boundary.
//!
//! [`VisionModel`] is the single seam between the orchestrator and any
//! vision-capable LLM: prompt + ordered images + settings (+ an optional
//! output contract) in, text or a structured record (+ usage) out.
//!
//! Two backends implement it:
//!
//! * [`EdgequakeVisionModel`] — every provider `edgequake-llm` knows
//!   (`openai:`, `anthropic:`, `gemini:`, `mistral:`, `ollama:`, …).
//! * [`crate::pipeline::azure::AzureChatClient`] — direct HTTP to Azure
//!   OpenAI for `azure:` identifiers.
//!
//! [`ModelRouter`] picks between them by provider prefix.

use crate::config::{AnalyzerConfig, ImageDetail};
use crate::error::AnalyzerError;
use crate::output::Usage;
use crate::pipeline::azure::AzureChatClient;
use crate::pipeline::encode::PreparedContent;
use crate::pipeline::params::ProviderSettings;
use crate::pipeline::schema::OutputContract;
use crate::prompts::{strip_json_fences, structured_output_instruction};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Provider assumed for identifiers without a `provider:` prefix.
pub const DEFAULT_PROVIDER: &str = "openai";

/// A parsed `provider:model-name` identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelId {
    pub provider: String,
    pub name: String,
}

impl ModelId {
    pub fn parse(identifier: &str) -> Self {
        match identifier.split_once(':') {
            Some((provider, name)) if !provider.is_empty() => Self {
                provider: provider.to_lowercase(),
                name: name.to_string(),
            },
            _ => Self {
                provider: DEFAULT_PROVIDER.to_string(),
                name: identifier.trim_start_matches(':').to_string(),
            },
        }
    }

    /// Providers that need the Azure endpoint and key.
    pub fn requires_azure(&self) -> bool {
        self.provider == "azure"
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.name)
    }
}

/// Everything a backend needs for one call.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: ModelId,
    pub prompt: String,
    pub images: Vec<PreparedContent>,
    pub settings: ProviderSettings,
    pub contract: Option<OutputContract>,
    pub detail: ImageDetail,
}

/// What the model produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Text(String),
    Structured(Map<String, Value>),
}

/// Output plus optional token accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub output: ModelOutput,
    pub usage: Option<Usage>,
}

/// The vision-model boundary.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelReply, AnalyzerError>;
}

/// Turn raw reply text into the requested output shape.
pub fn parse_output(
    text: String,
    contract: Option<&OutputContract>,
) -> Result<ModelOutput, AnalyzerError> {
    let Some(contract) = contract else {
        return Ok(ModelOutput::Text(text));
    };

    let value: Value = serde_json::from_str(strip_json_fences(&text)).map_err(|e| {
        AnalyzerError::MalformedResponse(format!("structured output is not valid JSON: {e}"))
    })?;
    match value {
        Value::Object(object) => Ok(ModelOutput::Structured(contract.conform(object)?)),
        other => Err(AnalyzerError::MalformedResponse(format!(
            "structured output must be a JSON object, got {other}"
        ))),
    }
}

// ── edgequake-llm backend ────────────────────────────────────────────────

/// Backend over `edgequake-llm` providers.
///
/// Reasoning effort has no request field in `CompletionOptions`; it is
/// recorded in the logs whatever [`crate::config::ReasoningEffortMode`] says.
/// Structured output is requested through a system instruction. Image
/// attachments are always inline, so URL images are fetched first.
#[derive(Clone, Default)]
pub struct EdgequakeVisionModel {
    provider: Option<Arc<dyn LLMProvider>>,
    http: reqwest::Client,
}

impl EdgequakeVisionModel {
    /// Create providers on demand through `ProviderFactory`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a pre-constructed provider for every call.
    pub fn with_provider(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider: Some(provider),
            ..Self::default()
        }
    }

    /// Inline a prepared image as an edgequake-llm attachment.
    async fn attach(
        &self,
        content: &PreparedContent,
        detail: ImageDetail,
    ) -> Result<ImageData, AnalyzerError> {
        match content {
            PreparedContent::Binary { media_type, payload } => {
                Ok(to_image_data(payload, media_type, detail))
            }
            PreparedContent::Url { url } => {
                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| AnalyzerError::InvalidUrl {
                        url: url.clone(),
                        message: format!("Failed to fetch image URL: {url}. Error: {e}"),
                        source: Some(e),
                    })?;
                let media_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|ct| ct.split(';').next())
                    .map(str::trim)
                    .filter(|ct| ct.starts_with("image/"))
                    .unwrap_or("image/jpeg")
                    .to_string();
                let bytes = response.bytes().await.map_err(|e| AnalyzerError::InvalidUrl {
                    url: url.clone(),
                    message: format!("Failed to read image URL: {url}. Error: {e}"),
                    source: Some(e),
                })?;
                debug!("Fetched {} bytes ({}) from {}", bytes.len(), media_type, url);
                Ok(to_image_data(&bytes, &media_type, detail))
            }
        }
    }

    fn resolve_provider(&self, model: &ModelId) -> Result<Arc<dyn LLMProvider>, AnalyzerError> {
        if let Some(ref provider) = self.provider {
            return Ok(Arc::clone(provider));
        }
        ProviderFactory::create_llm_provider(&model.provider, &model.name).map_err(|e| {
            AnalyzerError::Configuration(format!(
                "LLM provider '{}' is not configured: {e}",
                model.provider
            ))
        })
    }
}

impl fmt::Debug for EdgequakeVisionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgequakeVisionModel")
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .finish()
    }
}

/// Base64-wrap raw image bytes as an edgequake-llm attachment.
pub fn to_image_data(payload: &[u8], media_type: &str, detail: ImageDetail) -> ImageData {
    ImageData::new(STANDARD.encode(payload), media_type).with_detail(detail.as_str())
}

fn build_options(settings: &ProviderSettings) -> CompletionOptions {
    CompletionOptions {
        max_tokens: settings.token_limit().map(|n| n as usize),
        ..Default::default()
    }
}

#[async_trait]
impl VisionModel for EdgequakeVisionModel {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelReply, AnalyzerError> {
        let provider = self.resolve_provider(&request.model)?;

        if let Some(effort) = request.settings.reasoning_effort {
            info!(
                "Reasoning effort: {} (no request field for provider '{}')",
                effort, request.model.provider
            );
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(ref contract) = request.contract {
            messages.push(ChatMessage::system(structured_output_instruction(contract)));
        }
        let images = try_join_all(
            request
                .images
                .iter()
                .map(|c| self.attach(c, request.detail)),
        )
        .await?;
        messages.push(ChatMessage::user_with_images(request.prompt.as_str(), images));

        let options = build_options(&request.settings);
        info!(
            "Sending request to {}: {} image(s)",
            request.model,
            request.images.len()
        );

        let response = provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| AnalyzerError::Provider {
                provider: request.model.provider.clone(),
                detail: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            request.model, response.prompt_tokens, response.completion_tokens
        );

        let usage = Usage {
            prompt_tokens: Some(response.prompt_tokens as u64),
            completion_tokens: Some(response.completion_tokens as u64),
            total_tokens: Some((response.prompt_tokens + response.completion_tokens) as u64),
        };

        Ok(ModelReply {
            output: parse_output(response.content, request.contract.as_ref())?,
            usage: Some(usage),
        })
    }
}

// ── Routing ──────────────────────────────────────────────────────────────

/// Dispatches by provider prefix: `azure:` → direct HTTP, else edgequake-llm.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    azure: Option<AzureChatClient>,
    generic: EdgequakeVisionModel,
}

impl ModelRouter {
    /// Build from config. The Azure backend exists only when credentials do.
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let azure = match config.azure_credentials() {
            Some((endpoint, key)) => Some(AzureChatClient::new(
                endpoint,
                key,
                &config.azure_api_version,
            )?),
            None => None,
        };
        Ok(Self {
            azure,
            generic: EdgequakeVisionModel::new(),
        })
    }

    pub fn with_generic(mut self, generic: EdgequakeVisionModel) -> Self {
        self.generic = generic;
        self
    }
}

#[async_trait]
impl VisionModel for ModelRouter {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelReply, AnalyzerError> {
        if request.model.requires_azure() {
            let azure = self.azure.as_ref().ok_or_else(|| {
                AnalyzerError::Configuration(
                    "Azure OpenAI not configured. Please set AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_API_KEY."
                        .into(),
                )
            })?;
            return azure.invoke(request).await;
        }
        self.generic.invoke(request).await
    }
}
