//! Direct Azure OpenAI chat-completions backend.
//!
//! Used for `azure:<deployment>` identifiers. Going straight to the REST
//! API gives exact control over the request body, which the generic
//! backend cannot offer:
//!
//! * the token limit goes under whichever name
//!   [`crate::pipeline::params::ModelParameterAdapter`] chose
//!   (`max_tokens` or `max_completion_tokens`);
//! * reasoning effort, when forwarded, is a top-level `reasoning_effort`;
//! * structured output uses `response_format: json_schema`.

use crate::error::AnalyzerError;
use crate::output::Usage;
use crate::pipeline::encode::PreparedContent;
use crate::pipeline::llm::{parse_output, ModelReply, ModelRequest, VisionModel};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

/// HTTP client for one Azure OpenAI resource.
#[derive(Debug, Clone)]
pub struct AzureChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    api_version: String,
}

impl AzureChatClient {
    pub fn new(endpoint: &str, api_key: &str, api_version: &str) -> Result<Self, AnalyzerError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AnalyzerError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_version: api_version.to_string(),
        })
    }

    /// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version=…`
    pub fn completions_url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, deployment, self.api_version
        )
    }
}

/// Build the chat-completions JSON body for `request`.
pub fn build_body(request: &ModelRequest) -> Value {
    let mut content = vec![json!({"type": "text", "text": request.prompt})];
    content.extend(request.images.iter().map(|image| {
        json!({
            "type": "image_url",
            "image_url": {"url": image_url(image), "detail": request.detail.as_str()},
        })
    }));

    let mut body = Map::new();
    body.insert("model".into(), json!(request.model.name));
    body.insert(
        "messages".into(),
        json!([{"role": "user", "content": content}]),
    );

    let settings = &request.settings;
    if let Some(n) = settings.max_completion_tokens {
        body.insert("max_completion_tokens".into(), json!(n));
    } else if let Some(n) = settings.max_tokens {
        body.insert("max_tokens".into(), json!(n));
    }
    if let Some(effort) = settings.reasoning_effort {
        body.insert("reasoning_effort".into(), json!(effort.as_str()));
    }
    if let Some(ref contract) = request.contract {
        body.insert(
            "response_format".into(),
            json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "DynamicResult",
                    "schema": contract.to_json_schema(),
                    "strict": false,
                },
            }),
        );
    }

    Value::Object(body)
}

fn image_url(image: &PreparedContent) -> String {
    image.to_url()
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull content and usage out of a chat-completions response body.
fn parse_completion(body: &str) -> Result<(String, Option<Usage>), AnalyzerError> {
    let completion: ChatCompletion = serde_json::from_str(body).map_err(|e| {
        AnalyzerError::MalformedResponse(format!("unexpected chat completion body: {e}"))
    })?;
    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| AnalyzerError::MalformedResponse("chat completion has no content".into()))?;
    Ok((content, completion.usage))
}

#[async_trait]
impl VisionModel for AzureChatClient {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelReply, AnalyzerError> {
        let url = self.completions_url(&request.model.name);
        info!(
            "Sending request to Azure OpenAI: {} images, detail={}, reasoning_effort={}",
            request.images.len(),
            request.detail.as_str(),
            request
                .settings
                .reasoning_effort
                .map_or("not forwarded", |e| e.as_str())
        );

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.api_key)
            .json(&build_body(request))
            .send()
            .await
            .map_err(|e| AnalyzerError::Provider {
                provider: "azure".into(),
                detail: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| AnalyzerError::Provider {
            provider: "azure".into(),
            detail: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(AnalyzerError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let (content, usage) = parse_completion(&text)?;
        if let Some(ref u) = usage {
            debug!("Azure usage: {:?}", u);
        }

        Ok(ModelReply {
            output: parse_output(content, request.contract.as_ref())?,
            usage,
        })
    }
}
