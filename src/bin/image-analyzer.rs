//! CLI binary for llm-image-analyzer.
//!
//! A thin shim over the library crate: flags (or a JSON request on stdin)
//! become an `AnalyzeRequest`, the envelope goes to stdout as JSON, logs
//! go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use llm_image_analyzer::{
    tool_definition, AnalyzeRequest, AnalyzerConfig, AnalyzerError, ErrorEnvelope, ImageAnalyzer,
    ToolResponse,
};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Describe a local image with the default model
  image-analyzer "What is in this picture?" ~/photos/swan.jpg

  # Compare two images with a specific provider
  image-analyzer --model openai:gpt-4o "What changed?" before.png after.png

  # Structured output
  image-analyzer --schema '{"properties":{"animal":{"type":"string"}},"required":["animal"]}' \
      "Which animal is this?" https://example.com/bird.jpg

  # OCR with Mistral Document AI
  image-analyzer --mistral "Extract the text" scan-1.png scan-2.png

  # Full request as JSON
  echo '{"prompt":"Describe","image_paths":"a.svg"}' | image-analyzer --stdin

  # Print the tool definition
  image-analyzer --describe

ENVIRONMENT VARIABLES:
  MODEL                              Default model (azure:gpt-5.2)
  AZURE_OPENAI_ENDPOINT              Azure OpenAI endpoint (azure: models, OCR)
  AZURE_OPENAI_API_KEY               Azure OpenAI API key
  AZURE_OPENAI_API_VERSION           Azure API version (2024-12-01-preview)
  AZURE_MISTRAL_DEPLOYMENT           OCR deployment (mistral-document-ai-2505)
  MCP_DEBUG                          Include tracebacks in error envelopes
  IMAGE_ANALYZER_STRICT_MEDIA_TYPES  Sniff media types and reject unknown formats
  IMAGE_ANALYZER_REASONING_EFFORT    forward | log-only
  IMAGE_ANALYZER_IMAGE_DETAIL        auto | low | high
  IMAGE_ANALYZER_MODEL_TIMEOUT       Model call timeout in seconds
  OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, …  for non-azure providers

EXIT STATUS:
  0  a result envelope was printed
  1  an error envelope was printed
"#;

/// Analyze images with vision LLMs or Mistral Document AI OCR.
#[derive(Parser, Debug)]
#[command(
    name = "image-analyzer",
    version,
    about = "Analyze local or remote images with vision LLMs",
    long_about = "Ask a vision-capable LLM about one or more images (local paths, ~ paths, \
or URLs; JPEG, PNG, GIF, WebP, SVG). Prints a JSON envelope: {analysis|data, model, usage} \
on success, {error, error_type, debug_mode} on failure.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Question or instruction for the image(s).
    #[arg(required_unless_present_any = ["stdin", "describe"])]
    prompt: Option<String>,

    /// Image paths or URLs, in the order the model should see them.
    images: Vec<String>,

    /// Model identifier (provider:model-name).
    #[arg(short, long)]
    model: Option<String>,

    /// Maximum tokens in the response.
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Reasoning effort: low, medium, high.
    #[arg(long, default_value = "high")]
    reasoning_effort: String,

    /// JSON schema for structured output (inline JSON).
    #[arg(long, conflicts_with = "schema_file")]
    schema: Option<String>,

    /// JSON schema for structured output (file).
    #[arg(long)]
    schema_file: Option<PathBuf>,

    /// Use Mistral Document AI OCR instead of a vision model.
    #[arg(long)]
    mistral: bool,

    /// Read a JSON `analyze_images` request from stdin.
    #[arg(long, conflicts_with_all = ["prompt", "images"])]
    stdin: bool,

    /// Print the tool definition and exit.
    #[arg(long)]
    describe: bool,

    /// Resolve relative image paths against this directory.
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Pretty-print the JSON envelope.
    #[arg(long)]
    pretty: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.describe {
        println!("{}", serde_json::to_string_pretty(&tool_definition())?);
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli, |key| std::env::var(key).ok());
    let debug_mode = config.as_ref().is_ok_and(|c| c.debug_mode);

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose || debug_mode {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Run ──────────────────────────────────────────────────────────────
    // Start-up failures (configuration, request parsing) still produce an
    // error envelope on stdout.
    let response = match setup(&cli, config) {
        Ok((analyzer, request)) => analyzer.analyze_images(request).await,
        Err(e) => ErrorEnvelope::from_error(&e, debug_mode).into(),
    };

    let value = response.to_value();
    let json = if cli.pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .context("Failed to serialise response")?;
    println!("{json}");

    Ok(match response {
        ToolResponse::Success(_) => ExitCode::SUCCESS,
        ToolResponse::Failure(_) => ExitCode::FAILURE,
    })
}

fn load_config<F>(cli: &Cli, lookup: F) -> Result<AnalyzerConfig, AnalyzerError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut builder = AnalyzerConfig::from_lookup(lookup)?.to_builder();
    if let Some(ref dir) = cli.working_dir {
        builder = builder.working_dir(dir.clone());
    }
    builder.build()
}

fn setup(
    cli: &Cli,
    config: Result<AnalyzerConfig, AnalyzerError>,
) -> Result<(ImageAnalyzer, AnalyzeRequest), AnalyzerError> {
    let config = config?;
    let request = if cli.stdin {
        let mut raw = String::new();
        io::stdin().read_to_string(&mut raw).map_err(|e| {
            AnalyzerError::InvalidInput(format!("Failed to read request from stdin: {e}"))
        })?;
        parse_request(&raw)?
    } else {
        build_request(cli)?
    };
    let analyzer = ImageAnalyzer::new(config)?;
    Ok((analyzer, request))
}

fn parse_request(raw: &str) -> Result<AnalyzeRequest, AnalyzerError> {
    serde_json::from_str(raw).map_err(|e| {
        AnalyzerError::InvalidInput(format!("stdin is not a valid analyze_images request: {e}"))
    })
}

fn build_request(cli: &Cli) -> Result<AnalyzeRequest, AnalyzerError> {
    let prompt = cli.prompt.clone().unwrap_or_default();
    let mut request = AnalyzeRequest::new(prompt, cli.images.clone())
        .reasoning_effort(cli.reasoning_effort.clone())
        .use_mistral(cli.mistral);

    if let Some(ref model) = cli.model {
        request = request.model(model.clone());
    }
    if let Some(n) = cli.max_tokens {
        request = request.max_tokens(n);
    }

    let schema_text = match (&cli.schema, &cli.schema_file) {
        (Some(inline), _) => Some(inline.clone()),
        (None, Some(path)) => Some(std::fs::read_to_string(path).map_err(|e| {
            AnalyzerError::InvalidInput(format!(
                "Failed to read schema file {}: {e}",
                path.display()
            ))
        })?),
        (None, None) => None,
    };
    if let Some(text) = schema_text {
        let schema: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| AnalyzerError::InvalidInput(format!("Schema is not valid JSON: {e}")))?;
        if !schema.is_object() {
            return Err(AnalyzerError::InvalidInput(
                "Schema must be a JSON object".into(),
            ));
        }
        request = request.output_schema(schema);
    }

    Ok(request)
}
