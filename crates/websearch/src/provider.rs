//! Search provider trait.

use crate::types::SearchResult;
use ragloop_core::AppResult;

/// Trait for pluggable search providers.
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync + std::fmt::Debug {
    /// Provider name (e.g., "tavily", "duckduckgo")
    fn name(&self) -> &str;

    /// Execute a search query, returning at most `max_results` entries.
    async fn search(&self, query: &str, max_results: u32) -> AppResult<Vec<SearchResult>>;
}
