//! Ollama LLM provider implementation.
//!
//! This module provides integration with Ollama, a local LLM runtime.
//! Requests go to the chat endpoint so that prior turns are sent as messages.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use crate::lines::into_lines;
use futures::StreamExt;
use ragloop_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Ollama chat message format.
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thinking: Option<String>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    options: OllamaOptions,
    /// Ask reasoning models to return their thinking separately
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    think: bool,
    stream: bool,
}

/// Ollama API response format (one object, or one NDJSON line when streaming).
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

/// Ollama LLM client.
pub struct OllamaClient {
    /// Base URL for Ollama API
    base_url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client with default settings.
    ///
    /// Default URL: http://localhost:11434
    pub fn new() -> Self {
        Self::with_base_url("http://localhost:11434")
    }

    /// Create a new Ollama client with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Convert LlmRequest to Ollama format.
    fn to_ollama_request(&self, request: &LlmRequest) -> OllamaRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 2);
        if let Some(ref system) = request.system {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: system.clone(),
                thinking: None,
            });
        }
        messages.extend(request.conversation().into_iter().map(|m| OllamaMessage {
            role: m.role.as_str().to_string(),
            content: m.content,
            thinking: None,
        }));

        OllamaRequest {
            model: request.model.clone(),
            messages,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
            think: request.thinking_budget.is_some(),
            stream: request.stream,
        }
    }

    /// Convert Ollama response to LlmResponse.
    fn convert_response(&self, response: OllamaResponse) -> LlmResponse {
        let usage = LlmUsage::new(
            response.prompt_eval_count.unwrap_or(0),
            response.eval_count.unwrap_or(0),
        );
        let (content, thinking) = match response.message {
            Some(message) => (message.content, message.thinking.filter(|t| !t.is_empty())),
            None => (String::new(), None),
        };

        LlmResponse {
            content,
            thinking,
            model: response.model,
            usage,
            done: response.done,
        }
    }

    async fn post(&self, body: &OllamaRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn one NDJSON line into zero or more stream chunks.
fn parse_stream_line(line: &str) -> AppResult<Vec<LlmStreamChunk>> {
    let response: OllamaResponse = serde_json::from_str(line)
        .map_err(|e| AppError::Llm(format!("Failed to parse chunk: {}", e)))?;

    if let Some(error) = response.error {
        return Err(AppError::Llm(format!("Ollama stream error: {}", error)));
    }

    let mut chunks = Vec::new();
    if let Some(message) = response.message {
        if let Some(thinking) = message.thinking.filter(|t| !t.is_empty()) {
            chunks.push(LlmStreamChunk::thinking(thinking, &response.model));
        }
        if !message.content.is_empty() {
            chunks.push(LlmStreamChunk::text(message.content, &response.model));
        }
    }
    if response.done {
        chunks.push(LlmStreamChunk::finished(
            &response.model,
            Some(LlmUsage::new(
                response.prompt_eval_count.unwrap_or(0),
                response.eval_count.unwrap_or(0),
            )),
        ));
    }

    Ok(chunks)
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::info!("Sending completion request to Ollama");
        tracing::debug!("Request: {:?}", request);

        let mut ollama_request = self.to_ollama_request(request);
        ollama_request.stream = false;

        let response = self.post(&ollama_request).await?;

        // For non-streaming, Ollama returns a single JSON object
        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::info!("Received completion from Ollama");
        tracing::debug!("Response: {:?}", ollama_response);

        if let Some(ref error) = ollama_response.error {
            return Err(AppError::Llm(format!("Ollama error: {}", error)));
        }

        Ok(self.convert_response(ollama_response))
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::info!("Starting streaming request to Ollama");
        tracing::debug!("Request: {:?}", request);

        let mut ollama_request = self.to_ollama_request(request);
        ollama_request.stream = true; // Ensure streaming is enabled

        let response = self.post(&ollama_request).await?;

        // Ollama sends newline-delimited JSON
        let stream = into_lines(response.bytes_stream()).flat_map(|line| {
            let chunks = match line.and_then(|l| parse_stream_line(&l)) {
                Ok(chunks) => chunks.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            futures::stream::iter(chunks)
        });

        Ok(Box::pin(stream))
    }
}
