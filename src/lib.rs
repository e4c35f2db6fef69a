//! # llm-image-analyzer
//!
//! Ask a vision-capable LLM a question about one or more images.
//!
//! ## Why this crate?
//!
//! Image references arrive in every shape: absolute paths, paths relative
//! to some other directory than the one the process runs in, `~` paths,
//! URLs, SVGs that no vision model accepts. This crate turns them into
//! validated payloads with correct media types, translates generic request
//! settings into what each model family expects, and returns one uniform
//! envelope (text or schema-shaped data plus token usage, or a classified
//! error). An OCR mode runs each image through Mistral Document AI instead
//! and stitches the per-image text together, tolerating per-image failure.
//!
//! ## Pipeline Overview
//!
//! ```text
//! prompt + image_paths
//!  │
//!  ├─ 1. Validate  prompt, image list, reasoning effort
//!  ├─ 2. Prepare   resolve paths, SVG → PNG, HEAD-check URLs (concurrent)
//!  ├─ 3. Adapt     max_tokens vs max_completion_tokens, reasoning effort
//!  ├─ 4. Contract  optional output_schema → OutputContract
//!  ├─ 5. Invoke    azure: direct HTTP │ others: edgequake-llm
//!  └─ 6. Envelope  {analysis|data, model, usage} or {error, error_type, …}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use llm_image_analyzer::{AnalyzeRequest, AnalyzerConfig, ImageAnalyzer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads MODEL, AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_API_KEY, …
//!     let analyzer = ImageAnalyzer::new(AnalyzerConfig::from_env()?)?;
//!     let request = AnalyzeRequest::new("What bird is this?", "~/photos/swan.jpg")
//!         .model("openai:gpt-4o");
//!     println!("{}", analyzer.analyze_images(request).await.to_value());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `image-analyzer` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod aggregate;
pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod request;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use aggregate::OcrAggregator;
pub use analyze::{tool_definition, ImageAnalyzer, TOOL_NAME};
pub use config::{
    AnalyzerConfig, AnalyzerConfigBuilder, ImageDetail, MediaTypePolicy, ReasoningEffortMode,
};
pub use error::{AnalyzerError, SectionError};
pub use output::{AnalysisBody, AnalysisResult, ErrorEnvelope, ToolResponse, Usage};
pub use pipeline::llm::{ModelId, ModelOutput, ModelReply, ModelRequest, ModelRouter, VisionModel};
pub use pipeline::ocr::OcrClient;
pub use pipeline::prepare::{ProbeResponse, UrlProbe};
pub use request::{AnalyzeRequest, ImagePaths, ReasoningEffort};
