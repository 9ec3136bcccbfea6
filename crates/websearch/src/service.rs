//! Web search service with a pluggable provider.

use crate::provider::SearchProvider;
use crate::providers::{DuckDuckGoProvider, TavilyProvider};
use crate::types::SearchResult;
use ragloop_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct WebSearchService {
    provider: Arc<dyn SearchProvider>,
}

impl WebSearchService {
    /// Create a service for the named provider.
    ///
    /// - `"tavily"` requires an API key
    /// - `"duckduckgo"` works without an API key
    pub fn new(provider_name: &str, api_key: Option<&str>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("ragloop/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Search(format!("Failed to create HTTP client: {}", e)))?;

        let provider: Arc<dyn SearchProvider> = match provider_name.to_lowercase().as_str() {
            "tavily" => {
                let key = api_key.filter(|k| !k.is_empty()).ok_or_else(|| {
                    AppError::Config(
                        "Tavily requires an API key. Set TAVILY_API_KEY or search.apiKeyEnv."
                            .to_string(),
                    )
                })?;
                Arc::new(TavilyProvider::new(client, key))
            }
            "duckduckgo" | "" => Arc::new(DuckDuckGoProvider::new(client)),
            other => {
                return Err(AppError::Config(format!(
                    "Unknown search provider: '{}'. Supported: tavily, duckduckgo",
                    other
                )))
            }
        };

        Ok(Self { provider })
    }

    /// Wrap an already constructed provider.
    pub fn with_provider(provider: Arc<dyn SearchProvider>) -> Self {
        Self { provider }
    }

    /// Run a query. Control characters are stripped; an empty query is a
    /// validation error.
    pub async fn search(&self, query: &str, max_results: u32) -> AppResult<Vec<SearchResult>> {
        let query = sanitize_query(query);
        if query.is_empty() {
            return Err(AppError::Validation(
                "Search query cannot be empty".to_string(),
            ));
        }

        tracing::debug!(
            "Web search via {} (max {}): {}",
            self.provider.name(),
            max_results,
            query
        );

        let results = self.provider.search(&query, max_results).await?;

        tracing::debug!("Web search returned {} results", results.len());
        Ok(results)
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

fn sanitize_query(query: &str) -> String {
    query
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}
