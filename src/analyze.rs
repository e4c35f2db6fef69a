//! The `analyze_images` entry point.
//!
//! [`ImageAnalyzer`] validates the tool arguments, then takes one of two
//! paths:
//!
//! ```text
//! validate ──┬─ use_mistral ─▶ OcrAggregator (sequential, per-image errors inline)
//!            │
//!            └─ otherwise ───▶ prepare_all (concurrent, order-preserving, fail-fast)
//!                              ─▶ ModelParameterAdapter + OutputContract
//!                              ─▶ VisionModel::invoke ─▶ AnalysisResult
//! ```
//!
//! Every outcome, including a panic anywhere below, comes back as a
//! [`ToolResponse`]; nothing is propagated to the caller as an `Err`.

use crate::aggregate::{self, OcrAggregator};
use crate::config::AnalyzerConfig;
use crate::error::AnalyzerError;
use crate::output::{AnalysisResult, ErrorEnvelope, ToolResponse};
use crate::pipeline::llm::{ModelId, ModelOutput, ModelRequest, ModelRouter, VisionModel};
use crate::pipeline::normalize::FormatNormalizer;
use crate::pipeline::ocr::{FoundryOcrClient, OcrClient};
use crate::pipeline::params::ModelParameterAdapter;
use crate::pipeline::prepare::{HttpUrlProbe, ImagePreparer, UrlProbe};
use crate::pipeline::resolve::PathResolver;
use crate::pipeline::schema::OutputContract;
use crate::request::{AnalyzeRequest, ReasoningEffort};
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Name under which the operation is registered with a host runtime.
pub const TOOL_NAME: &str = "analyze_images";

/// Orchestrates one `analyze_images` call.
///
/// Holds the configuration snapshot and the three external boundaries. It
/// is cheap to share behind an `Arc` and safe to call concurrently.
#[derive(Clone)]
pub struct ImageAnalyzer {
    config: Arc<AnalyzerConfig>,
    probe: Arc<dyn UrlProbe>,
    model: Arc<dyn VisionModel>,
    ocr: Option<Arc<dyn OcrClient>>,
}

impl ImageAnalyzer {
    /// Production wiring: reqwest HEAD probe, model router, Foundry OCR client.
    pub fn new(config: AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let probe = Arc::new(HttpUrlProbe::new(config.url_timeout_secs)?);
        let model = Arc::new(ModelRouter::from_config(&config)?);
        let ocr = match config.azure_credentials() {
            Some((endpoint, key)) => Some(Arc::new(FoundryOcrClient::new(
                endpoint,
                key,
                config.ocr_timeout_secs,
            )?) as Arc<dyn OcrClient>),
            None => None,
        };
        Ok(Self::with_components(config, probe, model, ocr))
    }

    /// Wire explicit boundary implementations.
    ///
    /// `ocr` is `None` when no OCR endpoint is configured; OCR requests then
    /// fail with a configuration error.
    pub fn with_components(
        config: AnalyzerConfig,
        probe: Arc<dyn UrlProbe>,
        model: Arc<dyn VisionModel>,
        ocr: Option<Arc<dyn OcrClient>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            probe,
            model,
            ocr,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Run one request to completion.
    pub async fn analyze_images(&self, request: AnalyzeRequest) -> ToolResponse {
        let debug_mode = self.config.debug_mode;
        let outcome = AssertUnwindSafe(self.run(request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(AnalyzerError::Internal(panic_message(panic))));

        match outcome {
            Ok(result) => result.into(),
            Err(e) => ErrorEnvelope::from_error(&e, debug_mode).into(),
        }
    }

    async fn run(&self, request: AnalyzeRequest) -> Result<AnalysisResult, AnalyzerError> {
        // ── Step 1-3: Validate arguments ─────────────────────────────────────
        if request.prompt.trim().is_empty() {
            return Err(AnalyzerError::InvalidInput(
                "Prompt cannot be empty. Please provide a question or instruction for analyzing the image(s)."
                    .into(),
            ));
        }
        let references = request.image_paths.into_vec();
        if references.is_empty() {
            return Err(AnalyzerError::InvalidInput(
                "At least one image path is required. Provide local file paths or URLs.".into(),
            ));
        }
        let effort: ReasoningEffort = request.reasoning_effort.parse()?;

        // ── Step 4: OCR mode ─────────────────────────────────────────────────
        if request.use_mistral {
            // Endpoint configuration is checked before anything touches the
            // filesystem, including the working directory lookup.
            let client = self.ocr.clone().ok_or_else(aggregate::not_configured)?;
            return self
                .aggregator(client)?
                .run(&request.prompt, &references)
                .await;
        }

        // ── Step 5-6: Model selection ────────────────────────────────────────
        let model_name = request
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.config.default_model.clone());
        info!("Using model: {}", model_name);
        let model = ModelId::parse(&model_name);
        if model.requires_azure() && self.config.azure_credentials().is_none() {
            return Err(AnalyzerError::Configuration(
                "Azure OpenAI not configured. Please set AZURE_OPENAI_ENDPOINT and \
                 AZURE_OPENAI_API_KEY or use a different model provider \
                 (e.g., 'openai:gpt-4o', 'anthropic:claude-sonnet-4')."
                    .into(),
            ));
        }

        // ── Step 7: Prepare images ───────────────────────────────────────────
        let images = self.preparer()?.prepare_all(&references).await?;

        // ── Step 8: Build the call ───────────────────────────────────────────
        let settings = ModelParameterAdapter::new(self.config.reasoning_effort_mode).adapt(
            &model_name,
            request.max_tokens,
            effort,
        );
        let contract = request
            .output_schema
            .as_ref()
            .filter(|schema| !is_blank_schema(schema))
            .map(OutputContract::compile);
        info!(
            "Sending request: {} images, reasoning_effort={}",
            images.len(),
            effort
        );

        let model_request = ModelRequest {
            model,
            prompt: request.prompt,
            images,
            settings,
            contract,
            detail: self.config.image_detail,
        };

        // ── Step 9: Invoke and assemble ──────────────────────────────────────
        let reply = match self.config.model_timeout_secs {
            Some(secs) => tokio::time::timeout(
                Duration::from_secs(secs),
                self.model.invoke(&model_request),
            )
            .await
            .map_err(|_| AnalyzerError::Timeout {
                target: model_name.clone(),
                secs,
            })??,
            None => self.model.invoke(&model_request).await?,
        };

        let result = match reply.output {
            ModelOutput::Text(text) => AnalysisResult::text(text, model_name),
            ModelOutput::Structured(data) => AnalysisResult::data(data, model_name),
        }
        .with_usage(reply.usage);

        match result.usage.and_then(|u| u.total_tokens) {
            Some(total) => info!("Analysis complete: {} tokens", total),
            None => info!("Analysis complete"),
        }
        Ok(result)
    }

    fn preparer(&self) -> Result<ImagePreparer, AnalyzerError> {
        Ok(ImagePreparer::new(
            PathResolver::new(self.config.base_dir()?),
            FormatNormalizer::new(self.config.media_type_policy, self.config.svg_scale),
            Arc::clone(&self.probe),
        ))
    }

    fn aggregator(&self, client: Arc<dyn OcrClient>) -> Result<OcrAggregator, AnalyzerError> {
        Ok(OcrAggregator::new(
            self.preparer()?,
            Some(client),
            self.config.ocr_deployment.clone(),
        ))
    }
}

/// `null` and `{}` both mean "no schema".
fn is_blank_schema(schema: &Value) -> bool {
    match schema {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic while handling request".to_string()
    }
}

/// Name, description and JSON input schema of the tool.
pub fn tool_definition() -> Value {
    json!({
        "name": TOOL_NAME,
        "description": "Analyze one or more images with a vision-capable LLM. \
            Accepts local paths (absolute, relative, or starting with ~) and http(s) URLs. \
            Supports JPEG, PNG, GIF, WebP and SVG (rasterised to PNG). \
            Returns free-text analysis, or structured data when output_schema is given. \
            Set use_mistral to extract text with Mistral Document AI instead.",
        "input_schema": {
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The question or instruction for analyzing the image(s)"
                },
                "image_paths": {
                    "description": "Single image path or URL, or a list of them",
                    "anyOf": [
                        {"type": "string"},
                        {"type": "array", "items": {"type": "string"}}
                    ]
                },
                "model": {
                    "type": "string",
                    "description": "Model identifier in provider:model-name form"
                },
                "max_tokens": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum tokens in the response"
                },
                "reasoning_effort": {
                    "type": "string",
                    "enum": ["low", "medium", "high"],
                    "default": "high"
                },
                "output_schema": {
                    "type": "object",
                    "description": "JSON schema the response data must match"
                },
                "use_mistral": {
                    "type": "boolean",
                    "default": false,
                    "description": "Use Mistral Document AI OCR via Azure AI Foundry"
                }
            },
            "required": ["prompt", "image_paths"]
        }
    })
}
