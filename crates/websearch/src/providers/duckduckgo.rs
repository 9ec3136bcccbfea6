//! DuckDuckGo instant answer provider (no API key, limited results).

use crate::provider::SearchProvider;
use crate::types::SearchResult;
use ragloop_core::{AppError, AppResult};
use reqwest::Client;
use serde_json::Value;

const DEFAULT_DUCKDUCKGO_URL: &str = "https://api.duckduckgo.com";

#[derive(Debug, Clone)]
pub struct DuckDuckGoProvider {
    client: Client,
    base_url: String,
}

impl DuckDuckGoProvider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_DUCKDUCKGO_URL.to_string(),
        }
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Parse an instant answer body: the abstract first, then related topics.
///
/// Topic groups (`{"Name": ..., "Topics": [...]}`) are flattened in order.
pub(crate) fn parse_response(body: &str, max_results: u32) -> AppResult<Vec<SearchResult>> {
    let data: Value = serde_json::from_str(body)
        .map_err(|e| AppError::Search(format!("Failed to parse DuckDuckGo response: {}", e)))?;

    let limit = max_results as usize;
    let mut results = Vec::new();

    let abstract_text = str_field(&data, "AbstractText");
    if !abstract_text.is_empty() {
        let heading = str_field(&data, "Heading");
        results.push(SearchResult {
            title: if heading.is_empty() { "Result" } else { heading }.to_string(),
            url: str_field(&data, "AbstractURL").to_string(),
            content: abstract_text.to_string(),
        });
    }

    let topics = data
        .get("RelatedTopics")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let flattened = topics.iter().flat_map(|topic| match topic.get("Topics") {
        Some(Value::Array(nested)) => nested.iter().collect::<Vec<_>>(),
        _ => vec![topic],
    });

    for topic in flattened {
        if results.len() >= limit {
            break;
        }
        let text = str_field(topic, "Text");
        if text.is_empty() {
            continue;
        }
        results.push(SearchResult {
            title: text.chars().take(80).collect(),
            url: str_field(topic, "FirstURL").to_string(),
            content: text.to_string(),
        });
    }

    results.truncate(limit);
    Ok(results)
}

#[async_trait::async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: u32) -> AppResult<Vec<SearchResult>> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| AppError::Search(format!("DuckDuckGo request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::Search(format!("Failed to read DuckDuckGo response: {}", e)))?;

        if !status.is_success() {
            return Err(super::status_error("DuckDuckGo", status, &text));
        }

        parse_response(&text, max_results)
    }
}
