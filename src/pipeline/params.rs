//! Model parameter translation.
//!
//! Callers pass generic settings (a token limit, a reasoning effort); the
//! model family decides which request field they land in. GPT-5 class
//! models reject `max_tokens` and require `max_completion_tokens`, so the
//! limit is routed by name, and only one of the two is ever set.

use crate::config::ReasoningEffortMode;
use crate::request::ReasoningEffort;
use tracing::info;

/// Substring that marks the next-generation family (matched case-insensitively).
pub const NEXT_GEN_MARKER: &str = "gpt-5";

/// Provider-facing settings for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderSettings {
    /// Legacy `max_tokens` field.
    pub max_tokens: Option<u32>,
    /// `max_completion_tokens` field for next-generation models.
    pub max_completion_tokens: Option<u32>,
    /// Set only when the config forwards reasoning effort.
    pub reasoning_effort: Option<ReasoningEffort>,
}

impl ProviderSettings {
    /// Whichever limit is set, for backends with a single limit slot.
    pub fn token_limit(&self) -> Option<u32> {
        self.max_completion_tokens.or(self.max_tokens)
    }
}

/// Whether `model_name` belongs to the next-generation family.
pub fn is_next_gen_model(model_name: &str) -> bool {
    model_name.to_lowercase().contains(NEXT_GEN_MARKER)
}

/// Translates generic settings for a specific model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelParameterAdapter {
    mode: ReasoningEffortMode,
}

impl ModelParameterAdapter {
    pub fn new(mode: ReasoningEffortMode) -> Self {
        Self { mode }
    }

    /// Route `token_limit` by model family and attach reasoning effort per mode.
    pub fn adapt(
        &self,
        model_name: &str,
        token_limit: Option<u32>,
        effort: ReasoningEffort,
    ) -> ProviderSettings {
        let mut settings = ProviderSettings::default();

        if let Some(limit) = token_limit {
            if is_next_gen_model(model_name) {
                settings.max_completion_tokens = Some(limit);
                info!("Using max_completion_tokens={} for GPT-5 model", limit);
            } else {
                settings.max_tokens = Some(limit);
                info!("Using max_tokens={}", limit);
            }
        }

        match self.mode {
            ReasoningEffortMode::Forward => settings.reasoning_effort = Some(effort),
            ReasoningEffortMode::LogOnly => info!("Reasoning effort: {} (not forwarded)", effort),
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> ModelParameterAdapter {
        ModelParameterAdapter::new(ReasoningEffortMode::Forward)
    }

    #[test]
    fn marker_is_case_insensitive() {
        assert!(is_next_gen_model("azure:GPT-5.2"));
        assert!(is_next_gen_model("openai:gpt-5-mini"));
        assert!(!is_next_gen_model("openai:gpt-4o"));
        assert!(!is_next_gen_model("anthropic:claude-sonnet-4"));
    }

    #[test]
    fn next_gen_uses_completion_limit_only() {
        let s = adapter().adapt("azure:gpt-5.2", Some(500), ReasoningEffort::High);
        assert_eq!(s.max_completion_tokens, Some(500));
        assert_eq!(s.max_tokens, None);
        assert_eq!(s.token_limit(), Some(500));
    }

    #[test]
    fn legacy_uses_max_tokens_only() {
        let s = adapter().adapt("openai:gpt-4o", Some(500), ReasoningEffort::High);
        assert_eq!(s.max_tokens, Some(500));
        assert_eq!(s.max_completion_tokens, None);
    }

    #[test]
    fn no_limit_sets_neither() {
        let s = adapter().adapt("azure:gpt-5.2", None, ReasoningEffort::Low);
        assert_eq!(s.max_tokens, None);
        assert_eq!(s.max_completion_tokens, None);
        assert_eq!(s.token_limit(), None);
    }

    #[test]
    fn effort_follows_mode() {
        let fwd = adapter().adapt("m", None, ReasoningEffort::Medium);
        assert_eq!(fwd.reasoning_effort, Some(ReasoningEffort::Medium));

        let log_only = ModelParameterAdapter::new(ReasoningEffortMode::LogOnly).adapt(
            "m",
            None,
            ReasoningEffort::Medium,
        );
        assert_eq!(log_only.reasoning_effort, None);
    }
}
