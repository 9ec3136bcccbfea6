//! Tavily search provider (requires API key).

use crate::provider::SearchProvider;
use crate::types::SearchResult;
use ragloop_core::{AppError, AppResult};
use reqwest::Client;
use serde::Deserialize;

const DEFAULT_TAVILY_URL: &str = "https://api.tavily.com";

#[derive(Debug, Clone)]
pub struct TavilyProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilyProvider {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_TAVILY_URL.to_string(),
        }
    }

    /// Point the provider at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Parse a Tavily `/search` response body.
pub(crate) fn parse_response(body: &str, max_results: u32) -> AppResult<Vec<SearchResult>> {
    let response: TavilyResponse = serde_json::from_str(body)
        .map_err(|e| AppError::Search(format!("Failed to parse Tavily response: {}", e)))?;

    Ok(response
        .results
        .into_iter()
        .take(max_results as usize)
        .map(|r| SearchResult {
            title: r.title,
            url: r.url,
            content: r.content,
        })
        .collect())
}

#[async_trait::async_trait]
impl SearchProvider for TavilyProvider {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, max_results: u32) -> AppResult<Vec<SearchResult>> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": max_results,
            "include_answer": false,
        });

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Search(format!("Tavily request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::Search(format!("Failed to read Tavily response: {}", e)))?;

        if !status.is_success() {
            return Err(super::status_error("Tavily", status, &text));
        }

        parse_response(&text, max_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let body = r#"{
            "query": "weather in tokyo",
            "results": [
                {"title": "Tokyo forecast", "url": "https://a.example", "content": "Sunny, 21C", "score": 0.9},
                {"title": "JMA", "url": "https://b.example", "content": "Clear skies"},
                {"title": "Extra", "url": "https://c.example", "content": "Ignored"}
            ]
        }"#;

        let results = parse_response(body, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "Sunny, 21C");
        assert_eq!(results[1].url, "https://b.example");
    }

    #[test]
    fn test_parse_response_without_results() {
        assert!(parse_response(r#"{"query": "x"}"#, 3).unwrap().is_empty());
        assert!(parse_response("not json", 3).is_err());
    }

    #[test]
    fn test_base_url_trimmed() {
        let provider = TavilyProvider::new(Client::new(), "key").with_base_url("http://localhost:9/");
        assert_eq!(provider.base_url, "http://localhost:9");
    }
}
