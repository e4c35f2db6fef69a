//! Prompts and reply clean-up for structured output.
//!
//! Backends without a native JSON-schema response mode get the contract as
//! a system instruction instead, and their reply is unwrapped from any
//! markdown fence before it is parsed.

use crate::pipeline::schema::OutputContract;
use once_cell::sync::Lazy;
use regex::Regex;

/// System instruction for structured output on prompt-only backends.
pub fn structured_output_instruction(contract: &OutputContract) -> String {
    let schema = serde_json::to_string_pretty(&contract.to_json_schema())
        .unwrap_or_else(|_| "{}".to_string());
    format!(
        "Answer with a single JSON object and nothing else.\n\
         The object must match this JSON schema:\n\
         {schema}\n\
         Use null for optional fields you cannot determine. \
         Do not wrap the JSON in markdown fences."
    )
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*?)\n?```\s*$").unwrap());

/// Strip an outer ```` ``` ```` / ```` ```json ```` fence if the model added one.
pub fn strip_json_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps.get(1).map_or(trimmed, |m| m.as_str().trim()),
        None => trimmed,
    }
}
