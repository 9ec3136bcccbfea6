//! Claude (Anthropic Messages API) provider implementation.
//!
//! Supports extended thinking: when the request carries a thinking budget,
//! thinking blocks are returned separately from the answer text, and in
//! streaming mode `thinking_delta` events become thinking chunks.

use crate::client::{
    LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage,
};
use crate::lines::into_lines;
use futures::StreamExt;
use ragloop_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com";
const DEFAULT_API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ThinkingParam {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

/// Messages API request body.
#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingParam>,
    stream: bool,
}

/// Non-streaming response body.
#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    model: String,
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// Server-sent event payloads.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: MessageInfo,
    },
    ContentBlockDelta {
        delta: Delta,
    },
    MessageDelta {
        #[serde(default)]
        usage: Option<DeltaUsage>,
    },
    MessageStop,
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageInfo {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Per-stream bookkeeping for usage and model name.
#[derive(Debug)]
struct StreamState {
    model: String,
    input_tokens: u32,
    output_tokens: u32,
}

impl StreamState {
    /// Translate one SSE line into an optional chunk.
    fn adapt(&mut self, line: &str) -> AppResult<Option<LlmStreamChunk>> {
        // Skip event:, id:, and comment lines
        let Some(json_str) = line.strip_prefix("data:").map(str::trim) else {
            return Ok(None);
        };
        if json_str.is_empty() || json_str == "[DONE]" {
            return Ok(None);
        }

        let event: StreamEvent = serde_json::from_str(json_str)
            .map_err(|e| AppError::Llm(format!("Failed to parse Claude event: {}", e)))?;

        let chunk = match event {
            StreamEvent::MessageStart { message } => {
                if let Some(model) = message.model {
                    self.model = model;
                }
                if let Some(usage) = message.usage {
                    self.input_tokens = usage.input_tokens;
                    self.output_tokens = usage.output_tokens;
                }
                None
            }
            StreamEvent::ContentBlockDelta { delta } => match delta {
                Delta::TextDelta { text } => Some(LlmStreamChunk::text(text, &self.model)),
                Delta::ThinkingDelta { thinking } => {
                    Some(LlmStreamChunk::thinking(thinking, &self.model))
                }
                Delta::Other => None,
            },
            StreamEvent::MessageDelta { usage } => {
                if let Some(usage) = usage {
                    self.output_tokens = usage.output_tokens;
                }
                None
            }
            StreamEvent::MessageStop => Some(LlmStreamChunk::finished(
                &self.model,
                Some(LlmUsage::new(self.input_tokens, self.output_tokens)),
            )),
            StreamEvent::Error { error } => {
                return Err(AppError::Llm(format!("Claude stream error: {}", error.message)))
            }
            StreamEvent::Unknown => None,
        };

        Ok(chunk)
    }
}

/// Claude LLM client.
pub struct ClaudeClient {
    base_url: String,
    api_key: String,
    api_version: String,
    client: reqwest::Client,
}

impl ClaudeClient {
    /// Create a client against the public Anthropic endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_ENDPOINT, api_key)
    }

    /// Create a client with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the `anthropic-version` header.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    fn to_claude_request(&self, request: &LlmRequest, stream: bool) -> ClaudeRequest {
        let messages = request
            .conversation()
            .into_iter()
            .map(|m| ClaudeMessage {
                role: m.role.as_str(),
                content: m.content,
            })
            .collect();

        let thinking = request.thinking_budget.map(|budget| ThinkingParam {
            kind: "enabled",
            budget_tokens: budget,
        });

        // max_tokens must exceed the thinking budget
        let mut max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        if let Some(budget) = request.thinking_budget {
            max_tokens = max_tokens.max(budget + DEFAULT_MAX_TOKENS);
        }

        ClaudeRequest {
            model: request.model.clone(),
            max_tokens,
            messages,
            system: request.system.clone(),
            // Sampling temperature is not accepted together with thinking
            temperature: if thinking.is_some() {
                None
            } else {
                request.temperature
            },
            thinking,
            stream,
        }
    }

    async fn post(&self, body: &ClaudeRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Claude: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Claude API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl LlmClient for ClaudeClient {
    fn provider_name(&self) -> &str {
        "claude"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::info!("Sending completion request to Claude");
        tracing::debug!("Request: {:?}", request);

        let body = self.to_claude_request(request, false);
        let response: ClaudeResponse = self
            .post(&body)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Claude response: {}", e)))?;

        let mut content = String::new();
        let mut thinking = String::new();
        for block in response.content {
            match block {
                ResponseBlock::Text { text } => content.push_str(&text),
                ResponseBlock::Thinking { thinking: t } => thinking.push_str(&t),
                ResponseBlock::Other => {}
            }
        }

        let usage = response
            .usage
            .map(|u| LlmUsage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default();

        tracing::info!("Received completion from Claude");

        Ok(LlmResponse {
            content,
            thinking: (!thinking.is_empty()).then_some(thinking),
            model: response.model,
            usage,
            done: true,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::info!("Starting streaming request to Claude");
        tracing::debug!("Request: {:?}", request);

        let body = self.to_claude_request(request, true);
        let response = self.post(&body).await?;

        let mut state = StreamState {
            model: request.model.clone(),
            input_tokens: 0,
            output_tokens: 0,
        };

        let stream = into_lines(response.bytes_stream()).filter_map(move |line| {
            let item = match line.and_then(|l| state.adapt(&l)) {
                Ok(Some(chunk)) => Some(Ok(chunk)),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            };
            futures::future::ready(item)
        });

        Ok(Box::pin(stream))
    }
}
