//! LLM provider factory.
//!
//! This module provides a factory for creating LLM clients based on
//! application configuration. It handles provider resolution and secret
//! injection.

use crate::client::LlmClient;
use crate::providers::{ClaudeClient, OllamaClient};
use crate::types::ProviderType;
use ragloop_core::config::ProviderConfig;
use ragloop_core::{AppConfig, AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("claude", "anthropic", "ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key (for providers that require it)
///
/// # Errors
/// Returns error if:
/// - Provider is unknown
/// - Required secrets are missing
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    match ProviderType::parse(provider) {
        Some(ProviderType::Ollama) => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            Ok(Arc::new(OllamaClient::with_base_url(base_url)))
        }
        Some(ProviderType::Claude) => {
            let api_key = api_key.ok_or_else(|| {
                AppError::Config("Claude provider requires API key".to_string())
            })?;
            let client = match endpoint {
                Some(url) => ClaudeClient::with_base_url(url, api_key),
                None => ClaudeClient::new(api_key),
            };
            Ok(Arc::new(client))
        }
        None => Err(AppError::Config(format!("Unknown provider: {}", provider))),
    }
}

/// Create a client for `provider` using the endpoint, API version and key
/// resolved from the application configuration.
pub fn client_for(config: &AppConfig, provider: &str) -> AppResult<Arc<dyn LlmClient>> {
    let provider_config = config.get_provider_config(provider);
    let endpoint = provider_config.as_ref().and_then(|p| p.endpoint());
    let api_key = config.resolve_api_key(provider);

    tracing::debug!("Creating LLM client for provider '{}'", provider);

    if let Some(ProviderConfig::Claude {
        api_version: Some(ref version),
        ..
    }) = provider_config
    {
        let api_key = api_key.ok_or_else(|| {
            AppError::Config("Claude provider requires API key".to_string())
        })?;
        let client = match endpoint {
            Some(url) => ClaudeClient::with_base_url(url, api_key),
            None => ClaudeClient::new(api_key),
        };
        return Ok(Arc::new(client.with_api_version(version.clone())));
    }

    create_client(provider, endpoint, api_key.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_client() {
        let client = create_client("ollama", None, None).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_create_ollama_with_custom_endpoint() {
        let client = create_client("ollama", Some("http://localhost:8080"), None);
        assert!(client.is_ok());
    }

    #[test]
    fn test_claude_requires_api_key() {
        match create_client("claude", None, None) {
            Err(err) => assert!(err.to_string().contains("Claude provider requires API key")),
            Ok(_) => panic!("Expected error for Claude without API key"),
        }
    }

    #[test]
    fn test_create_claude_client() {
        let client = create_client("anthropic", None, Some("sk-test")).unwrap();
        assert_eq!(client.provider_name(), "claude");
    }

    #[test]
    fn test_unknown_provider() {
        match create_client("unknown", None, None) {
            Err(err) => assert!(err.to_string().contains("Unknown provider")),
            Ok(_) => panic!("Expected error for unknown provider"),
        }
    }

    #[test]
    fn test_client_for_default_config() {
        let config = AppConfig::default();
        let client = client_for(&config, "ollama").unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }
}
