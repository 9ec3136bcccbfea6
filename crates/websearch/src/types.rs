use serde::{Deserialize, Serialize};

/// A search result entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,

    /// Text body of the result (Tavily `content`, DuckDuckGo `Text`)
    pub content: String,
}
