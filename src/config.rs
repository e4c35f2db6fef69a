//! Configuration for image analysis.
//!
//! All process-wide settings live in one immutable [`AnalyzerConfig`]
//! snapshot. It is built once, either from the environment with
//! [`AnalyzerConfig::from_env`] or explicitly through
//! [`AnalyzerConfig::builder`], and then handed to
//! [`crate::analyze::ImageAnalyzer::new`]. Nothing below the analyzer reads
//! the environment, so every configuration-dependent branch (missing Azure
//! credentials, strict media types, …) is testable by building a config
//! value instead of mutating process state.
//!
//! Missing Azure credentials are *not* a construction error: they only
//! become a `ConfigurationError` when a request actually needs them.

use crate::error::AnalyzerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default model identifier when neither the request nor `MODEL` names one.
pub const DEFAULT_MODEL: &str = "azure:gpt-5.2";

/// Default Mistral Document AI deployment on Azure Foundry.
pub const DEFAULT_OCR_DEPLOYMENT: &str = "mistral-document-ai-2505";

/// Default Azure OpenAI REST API version.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-12-01-preview";

/// Immutable configuration snapshot for an [`crate::analyze::ImageAnalyzer`].
#[derive(Clone)]
pub struct AnalyzerConfig {
    /// Model used when a request does not name one. Format `provider:model`.
    pub default_model: String,

    /// Azure OpenAI resource endpoint, e.g. `https://x.cognitiveservices.azure.com`.
    pub azure_endpoint: Option<String>,

    /// Azure OpenAI API key. Also used as the bearer token for Foundry OCR.
    pub azure_api_key: Option<String>,

    /// Azure OpenAI REST API version for chat completions.
    pub azure_api_version: String,

    /// Mistral Document AI deployment used by the OCR backend.
    pub ocr_deployment: String,

    /// Include a rendered error chain and backtrace in error envelopes.
    pub debug_mode: bool,

    /// How media types are assigned to local raster files.
    pub media_type_policy: MediaTypePolicy,

    /// Whether reasoning effort is forwarded to providers that accept it.
    pub reasoning_effort_mode: ReasoningEffortMode,

    /// Detail hint attached to every image part.
    pub image_detail: ImageDetail,

    /// Timeout for URL HEAD validation, in seconds. Default: 10.
    pub url_timeout_secs: u64,

    /// Timeout for each OCR call, in seconds. Default: 60.
    ///
    /// OCR responses on multi-page scans are much slower than a HEAD check.
    pub ocr_timeout_secs: u64,

    /// Optional timeout for the vision-model call. Default: none.
    pub model_timeout_secs: Option<u64>,

    /// Linear upscale factor for SVG rasterisation. Default: 4.0.
    ///
    /// 4× turns an A3 drawing at 96 user units per inch into roughly a
    /// 300 DPI bitmap, which is what OCR-grade reading needs.
    pub svg_scale: f32,

    /// Base directory for relative image paths. `None` = process cwd at call time.
    pub working_dir: Option<PathBuf>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            azure_endpoint: None,
            azure_api_key: None,
            azure_api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            ocr_deployment: DEFAULT_OCR_DEPLOYMENT.to_string(),
            debug_mode: false,
            media_type_policy: MediaTypePolicy::default(),
            reasoning_effort_mode: ReasoningEffortMode::default(),
            image_detail: ImageDetail::default(),
            url_timeout_secs: 10,
            ocr_timeout_secs: 60,
            model_timeout_secs: None,
            svg_scale: 4.0,
            working_dir: None,
        }
    }
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("default_model", &self.default_model)
            .field("azure_endpoint", &self.azure_endpoint)
            .field("azure_api_key", &self.azure_api_key.as_ref().map(|_| "<redacted>"))
            .field("azure_api_version", &self.azure_api_version)
            .field("ocr_deployment", &self.ocr_deployment)
            .field("debug_mode", &self.debug_mode)
            .field("media_type_policy", &self.media_type_policy)
            .field("reasoning_effort_mode", &self.reasoning_effort_mode)
            .field("image_detail", &self.image_detail)
            .field("url_timeout_secs", &self.url_timeout_secs)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("model_timeout_secs", &self.model_timeout_secs)
            .field("svg_scale", &self.svg_scale)
            .field("working_dir", &self.working_dir)
            .finish()
    }
}

impl AnalyzerConfig {
    /// Create a new builder for `AnalyzerConfig`.
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Reopen this config for further overrides.
    pub fn to_builder(self) -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder { config: self }
    }

    /// Snapshot the process environment.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `MODEL` | `default_model` |
    /// | `AZURE_OPENAI_ENDPOINT` | `azure_endpoint` |
    /// | `AZURE_OPENAI_API_KEY` | `azure_api_key` |
    /// | `AZURE_OPENAI_API_VERSION` | `azure_api_version` |
    /// | `AZURE_MISTRAL_DEPLOYMENT` | `ocr_deployment` |
    /// | `MCP_DEBUG` | `debug_mode` (`true`, `1`, `yes`) |
    /// | `IMAGE_ANALYZER_STRICT_MEDIA_TYPES` | `media_type_policy` |
    /// | `IMAGE_ANALYZER_REASONING_EFFORT` | `reasoning_effort_mode` (`forward`, `log-only`) |
    /// | `IMAGE_ANALYZER_IMAGE_DETAIL` | `image_detail` (`auto`, `low`, `high`) |
    /// | `IMAGE_ANALYZER_MODEL_TIMEOUT` | `model_timeout_secs` |
    pub fn from_env() -> Result<Self, AnalyzerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AnalyzerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut builder = Self::builder();

        if let Some(model) = get("MODEL") {
            builder = builder.default_model(model);
        }
        if let Some(endpoint) = get("AZURE_OPENAI_ENDPOINT") {
            builder = builder.azure_endpoint(endpoint);
        }
        if let Some(key) = get("AZURE_OPENAI_API_KEY") {
            builder = builder.azure_api_key(key);
        }
        if let Some(version) = get("AZURE_OPENAI_API_VERSION") {
            builder = builder.azure_api_version(version);
        }
        if let Some(deployment) = get("AZURE_MISTRAL_DEPLOYMENT") {
            builder = builder.ocr_deployment(deployment);
        }
        builder = builder.debug_mode(get("MCP_DEBUG").is_some_and(|v| is_truthy(&v)));

        if get("IMAGE_ANALYZER_STRICT_MEDIA_TYPES").is_some_and(|v| is_truthy(&v)) {
            builder = builder.media_type_policy(MediaTypePolicy::Strict);
        }
        if let Some(mode) = get("IMAGE_ANALYZER_REASONING_EFFORT") {
            builder = builder.reasoning_effort_mode(mode.parse()?);
        }
        if let Some(detail) = get("IMAGE_ANALYZER_IMAGE_DETAIL") {
            builder = builder.image_detail(detail.parse()?);
        }
        if let Some(secs) = get("IMAGE_ANALYZER_MODEL_TIMEOUT") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                AnalyzerError::Configuration(format!(
                    "IMAGE_ANALYZER_MODEL_TIMEOUT must be a whole number of seconds, got '{secs}'"
                ))
            })?;
            builder = builder.model_timeout_secs(secs);
        }

        builder.build()
    }

    /// Endpoint and key, when both are configured.
    pub fn azure_credentials(&self) -> Option<(&str, &str)> {
        match (self.azure_endpoint.as_deref(), self.azure_api_key.as_deref()) {
            (Some(endpoint), Some(key)) => Some((endpoint, key)),
            _ => None,
        }
    }

    /// Base directory relative image paths resolve against.
    pub fn base_dir(&self) -> Result<PathBuf, AnalyzerError> {
        match &self.working_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().map_err(|e| {
                AnalyzerError::Internal(format!("cannot read current directory: {e}"))
            }),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Builder for [`AnalyzerConfig`].
#[derive(Debug)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = model.into();
        self
    }

    pub fn azure_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.azure_endpoint = Some(endpoint.into());
        self
    }

    pub fn azure_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.azure_api_key = Some(key.into());
        self
    }

    pub fn azure_api_version(mut self, version: impl Into<String>) -> Self {
        self.config.azure_api_version = version.into();
        self
    }

    pub fn ocr_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.config.ocr_deployment = deployment.into();
        self
    }

    pub fn debug_mode(mut self, v: bool) -> Self {
        self.config.debug_mode = v;
        self
    }

    pub fn media_type_policy(mut self, policy: MediaTypePolicy) -> Self {
        self.config.media_type_policy = policy;
        self
    }

    pub fn reasoning_effort_mode(mut self, mode: ReasoningEffortMode) -> Self {
        self.config.reasoning_effort_mode = mode;
        self
    }

    pub fn image_detail(mut self, detail: ImageDetail) -> Self {
        self.config.image_detail = detail;
        self
    }

    pub fn url_timeout_secs(mut self, secs: u64) -> Self {
        self.config.url_timeout_secs = secs;
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn model_timeout_secs(mut self, secs: u64) -> Self {
        self.config.model_timeout_secs = Some(secs);
        self
    }

    pub fn svg_scale(mut self, scale: f32) -> Self {
        self.config.svg_scale = scale;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.working_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalyzerConfig, AnalyzerError> {
        let c = &self.config;
        if c.default_model.trim().is_empty() {
            return Err(AnalyzerError::Configuration(
                "default model must not be empty".into(),
            ));
        }
        if c.url_timeout_secs == 0 || c.ocr_timeout_secs == 0 {
            return Err(AnalyzerError::Configuration(
                "timeouts must be at least 1 second".into(),
            ));
        }
        if c.model_timeout_secs == Some(0) {
            return Err(AnalyzerError::Configuration(
                "model timeout must be at least 1 second".into(),
            ));
        }
        if !(c.svg_scale.is_finite() && c.svg_scale > 0.0) {
            return Err(AnalyzerError::Configuration(format!(
                "SVG scale must be a positive number, got {}",
                c.svg_scale
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How a local raster file gets its media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MediaTypePolicy {
    /// Map the file extension; unknown extensions fall back to `image/jpeg`. (default)
    #[default]
    Permissive,
    /// Sniff the content; anything but JPEG, PNG, GIF or WebP is rejected.
    Strict,
}

/// What happens to the caller's reasoning effort.
///
/// The two model backends differ here:
///
/// | Mode | Azure direct HTTP | Generic edgequake-llm providers |
/// |------|-------------------|---------------------------------|
/// | `Forward` | sent as top-level `reasoning_effort` | logged only (no request slot) |
/// | `LogOnly` | logged only | logged only |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReasoningEffortMode {
    /// Forward to providers with a request field for it. (default)
    #[default]
    Forward,
    /// Never forward; record it in logs.
    LogOnly,
}

impl std::str::FromStr for ReasoningEffortMode {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "forward" => Ok(Self::Forward),
            "log-only" | "log_only" | "log" => Ok(Self::LogOnly),
            other => Err(AnalyzerError::Configuration(format!(
                "Invalid reasoning effort mode '{other}'. Must be 'forward' or 'log-only'."
            ))),
        }
    }
}

/// Image detail hint for vision APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    /// Let the model decide. (default)
    #[default]
    Auto,
    /// Single low-resolution tile; cheapest.
    Low,
    /// Full tiling; reads fine print.
    High,
}

impl ImageDetail {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageDetail::Auto => "auto",
            ImageDetail::Low => "low",
            ImageDetail::High => "high",
        }
    }
}

impl std::str::FromStr for ImageDetail {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "low" => Ok(Self::Low),
            "high" => Ok(Self::High),
            other => Err(AnalyzerError::Configuration(format!(
                "Invalid detail level: {other}. Must be 'auto', 'low', or 'high'."
            ))),
        }
    }
}
