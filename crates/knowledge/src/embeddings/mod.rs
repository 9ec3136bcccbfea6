//! Embedding providers for knowledge bases.
//!
//! The provider is chosen per base from its `config.yaml`.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
