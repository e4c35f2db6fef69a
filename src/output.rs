//! Response envelopes returned by `analyze_images`.
//!
//! Exactly one of [`AnalysisResult`] or [`ErrorEnvelope`] comes back per
//! request, wrapped in [`ToolResponse`]. Both serialise to flat JSON
//! objects so a host runtime can hand them to a client unchanged:
//!
//! ```text
//! {"analysis": "...", "model": "azure:gpt-5.2", "usage": {...}}
//! {"data": {...},     "model": "openai:gpt-4o"}
//! {"error": "...", "error_type": "ValueError", "debug_mode": false}
//! ```

use crate::error::{render_chain, AnalyzerError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::backtrace::Backtrace;
use tracing::error;

/// Token counts reported by the model boundary.
///
/// Fields the provider did not report are omitted from the JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl Usage {
    /// `None` when no count at all was reported.
    pub fn non_empty(self) -> Option<Self> {
        if self.prompt_tokens.is_none()
            && self.completion_tokens.is_none()
            && self.total_tokens.is_none()
        {
            None
        } else {
            Some(self)
        }
    }
}

/// Free text or schema-shaped data; never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisBody {
    Data { data: Map<String, Value> },
    Text { analysis: String },
}

/// Successful result of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(flatten)]
    pub body: AnalysisBody,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl AnalysisResult {
    pub fn text(analysis: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            body: AnalysisBody::Text {
                analysis: analysis.into(),
            },
            model: model.into(),
            usage: None,
        }
    }

    pub fn data(data: Map<String, Value>, model: impl Into<String>) -> Self {
        Self {
            body: AnalysisBody::Data { data },
            model: model.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: Option<Usage>) -> Self {
        self.usage = usage.and_then(Usage::non_empty);
        self
    }

    pub fn analysis(&self) -> Option<&str> {
        match &self.body {
            AnalysisBody::Text { analysis } => Some(analysis),
            AnalysisBody::Data { .. } => None,
        }
    }

    pub fn structured(&self) -> Option<&Map<String, Value>> {
        match &self.body {
            AnalysisBody::Data { data } => Some(data),
            AnalysisBody::Text { .. } => None,
        }
    }
}

/// Failure of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub error_type: String,
    pub debug_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl ErrorEnvelope {
    /// Convert a fatal error, logging it.
    ///
    /// The full chain always reaches the log; it is only copied into the
    /// envelope when `debug_mode` is on.
    ///
    /// The `source()` chain is the record of where the error came from. The
    /// appended stack backtrace is captured here, at envelope construction,
    /// so it shows the caller's frames (usually `analyze_images`), not the
    /// frame that raised the error.
    pub fn from_error(err: &AnalyzerError, debug_mode: bool) -> Self {
        let chain = render_chain(err);
        let traceback = if debug_mode {
            let trace = format!("{chain}\n\nstack backtrace:\n{}", Backtrace::force_capture());
            error!("Tool error with traceback:\n{}", trace);
            Some(trace)
        } else {
            error!("Tool error: {}: {}", err.error_type(), chain);
            None
        };

        Self {
            error: err.to_string(),
            error_type: err.error_type().to_string(),
            debug_mode,
            traceback,
        }
    }
}

/// What `analyze_images` returns: a result or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResponse {
    Failure(ErrorEnvelope),
    Success(AnalysisResult),
}

impl ToolResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolResponse::Failure(_))
    }

    pub fn as_result(&self) -> Option<&AnalysisResult> {
        match self {
            ToolResponse::Success(r) => Some(r),
            ToolResponse::Failure(_) => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorEnvelope> {
        match self {
            ToolResponse::Failure(e) => Some(e),
            ToolResponse::Success(_) => None,
        }
    }

    /// Serialise to the flat JSON object a host runtime expects.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "error": format!("failed to serialise response: {e}"),
                "error_type": "InternalError",
                "debug_mode": false,
            })
        })
    }
}

impl From<AnalysisResult> for ToolResponse {
    fn from(r: AnalysisResult) -> Self {
        ToolResponse::Success(r)
    }
}

impl From<ErrorEnvelope> for ToolResponse {
    fn from(e: ErrorEnvelope) -> Self {
        ToolResponse::Failure(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_result_serialises_flat() {
        let r = AnalysisResult::text("a cat", "azure:gpt-5.2").with_usage(Some(Usage {
            prompt_tokens: Some(10),
            completion_tokens: Some(5),
            total_tokens: Some(15),
        }));
        let v = ToolResponse::from(r).to_value();
        assert_eq!(
            v,
            json!({
                "analysis": "a cat",
                "model": "azure:gpt-5.2",
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            })
        );
    }

    #[test]
    fn unreported_usage_fields_are_omitted() {
        let r = AnalysisResult::text("x", "m").with_usage(Some(Usage {
            total_tokens: Some(7),
            ..Default::default()
        }));
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["usage"], json!({"total_tokens": 7}));
    }

    #[test]
    fn empty_usage_is_dropped() {
        let r = AnalysisResult::text("x", "m").with_usage(Some(Usage::default()));
        let v = serde_json::to_value(&r).unwrap();
        assert!(v.get("usage").is_none());
    }

    #[test]
    fn data_result_has_no_analysis_key() {
        let mut data = Map::new();
        data.insert("count".into(), json!(3));
        let v = serde_json::to_value(AnalysisResult::data(data, "m")).unwrap();
        assert!(v.get("analysis").is_none());
        assert_eq!(v["data"]["count"], 3);
    }

    #[test]
    fn error_envelope_without_debug_has_no_traceback() {
        let err = AnalyzerError::InvalidInput("Prompt cannot be empty.".into());
        let env = ErrorEnvelope::from_error(&err, false);
        assert_eq!(env.error_type, "ValueError");
        assert!(!env.debug_mode);
        let v = serde_json::to_value(&env).unwrap();
        assert!(v.get("traceback").is_none());
    }

    #[test]
    fn error_envelope_in_debug_carries_chain() {
        let err = AnalyzerError::Io {
            path: "/x.png".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let env = ErrorEnvelope::from_error(&err, true);
        let tb = env.traceback.expect("debug mode includes traceback");
        // The origin is carried by the chain, which leads; the stack follows.
        assert!(tb.starts_with("Failed to read '/x.png'"));
        let chain_end = tb.find("caused by: denied").unwrap();
        assert!(chain_end < tb.find("stack backtrace").unwrap());
    }
}
