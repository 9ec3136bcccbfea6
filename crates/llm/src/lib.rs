//! LLM integration crate for ragloop.
//!
//! This crate provides a provider-agnostic abstraction for interacting with
//! Large Language Models (LLMs). Requests carry the prior conversation and
//! streamed chunks are tagged as either thinking or answer text.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **Claude**: Anthropic Messages API with extended thinking
//!
//! # Example
//! ```no_run
//! use ragloop_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

mod lines;

// Re-export main types
pub use client::{
    ChatMessage, ChatRole, ChunkKind, LlmClient, LlmRequest, LlmResponse, LlmStream,
    LlmStreamChunk, LlmUsage,
};
pub use factory::{client_for, create_client};
pub use providers::{ClaudeClient, OllamaClient};
pub use types::ProviderType;
