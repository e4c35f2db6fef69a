//! Tool arguments for `analyze_images`.
//!
//! [`AnalyzeRequest`] deserialises exactly what a host runtime passes to the
//! tool, including the loose shapes callers actually send (`image_paths` as
//! a single string, `reasoning_effort` omitted). Validation is deliberately
//! *not* done at deserialisation time: the orchestrator validates in a fixed
//! order so the first failing argument is the one reported.

use crate::error::AnalyzerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Arguments of one `analyze_images` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// The question or instruction for the image(s).
    pub prompt: String,

    /// One path/URL or a list of them.
    pub image_paths: ImagePaths,

    /// Model identifier (`provider:model-name`). Defaults to the configured model.
    #[serde(default)]
    pub model: Option<String>,

    /// Maximum tokens in the response. `None` = provider default.
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// `low`, `medium` or `high`. Kept as a string until validation.
    #[serde(default = "default_reasoning_effort")]
    pub reasoning_effort: String,

    /// JSON-schema-like description of the structured output.
    #[serde(default)]
    pub output_schema: Option<Value>,

    /// Route to Mistral Document AI OCR instead of the vision model.
    #[serde(default)]
    pub use_mistral: bool,
}

fn default_reasoning_effort() -> String {
    ReasoningEffort::High.as_str().to_string()
}

impl AnalyzeRequest {
    pub fn new(prompt: impl Into<String>, image_paths: impl Into<ImagePaths>) -> Self {
        Self {
            prompt: prompt.into(),
            image_paths: image_paths.into(),
            model: None,
            max_tokens: None,
            reasoning_effort: default_reasoning_effort(),
            output_schema: None,
            use_mistral: false,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    pub fn reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning_effort = effort.into();
        self
    }

    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn use_mistral(mut self, v: bool) -> Self {
        self.use_mistral = v;
        self
    }
}

/// `image_paths` as sent by callers: a bare string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImagePaths {
    One(String),
    Many(Vec<String>),
}

impl ImagePaths {
    /// Normalise to an ordered list; a single string becomes a one-element list.
    pub fn into_vec(self) -> Vec<String> {
        match self {
            ImagePaths::One(s) => vec![s],
            ImagePaths::Many(v) => v,
        }
    }
}

impl From<&str> for ImagePaths {
    fn from(s: &str) -> Self {
        ImagePaths::One(s.to_string())
    }
}

impl From<String> for ImagePaths {
    fn from(s: String) -> Self {
        ImagePaths::One(s)
    }
}

impl From<Vec<String>> for ImagePaths {
    fn from(v: Vec<String>) -> Self {
        ImagePaths::Many(v)
    }
}

impl From<Vec<&str>> for ImagePaths {
    fn from(v: Vec<&str>) -> Self {
        ImagePaths::Many(v.into_iter().map(str::to_string).collect())
    }
}

/// How hard the model should think.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReasoningEffort {
    type Err = AnalyzerError;

    /// Exact, case-sensitive match, as the tool contract documents the values.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(AnalyzerError::InvalidInput(format!(
                "Invalid reasoning_effort: {other}. Must be 'low', 'medium', or 'high'."
            ))),
        }
    }
}
