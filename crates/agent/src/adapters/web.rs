//! Web searcher port backed by [`WebSearchService`].

use super::retry::RetryPolicy;
use crate::ports::WebSearcher;
use crate::state::Evidence;
use ragloop_core::AppResult;
use ragloop_websearch::WebSearchService;
use serde_json::json;

/// Folds the top results into a single evidence item.
///
/// The item is produced even when the search finds nothing; its content is
/// then empty.
pub struct WebSearchRetriever {
    service: WebSearchService,
    retry: RetryPolicy,
}

impl WebSearchRetriever {
    pub fn new(service: WebSearchService) -> Self {
        Self {
            service,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait::async_trait]
impl WebSearcher for WebSearchRetriever {
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<Evidence>> {
        let max_results = u32::try_from(k).unwrap_or(u32::MAX);
        let results = self
            .retry
            .run("web_searcher", || self.service.search(query, max_results))
            .await?;

        let contents: Vec<&str> = results
            .iter()
            .map(|r| r.content.trim())
            .filter(|c| !c.is_empty())
            .collect();
        if contents.is_empty() {
            tracing::debug!("Web search found nothing for: {}", query);
        }

        let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        Ok(vec![Evidence::web(contents.join("\n"))
            .with_metadata("urls", json!(urls))
            .with_metadata("provider", json!(self.service.provider_name()))])
    }
}
