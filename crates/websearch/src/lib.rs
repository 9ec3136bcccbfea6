//! Live web search for ragloop.
//!
//! A [`WebSearchService`] wraps one pluggable [`SearchProvider`]
//! (Tavily or DuckDuckGo) and returns plain [`SearchResult`] entries.

pub mod provider;
pub mod providers;
mod service;
pub mod types;

pub use provider::SearchProvider;
pub use providers::{DuckDuckGoProvider, TavilyProvider};
pub use service::WebSearchService;
pub use types::SearchResult;
