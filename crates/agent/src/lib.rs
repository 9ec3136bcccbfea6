//! Adaptive retrieval loop for ragloop.
//!
//! This crate provides the question-answering control loop:
//! - Routing between the knowledge base and web search
//! - Per-snippet relevance grading and question rewriting
//! - Streamed generation with groundedness and usefulness checks
//! - Capability ports with LLM, knowledge base and web adapters
//!
//! # Example
//! ```no_run
//! use ragloop_agent::{adapters::build_loop, TurnOutcome};
//! use ragloop_core::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! let rag = build_loop(&config)?;
//! let outcome = TurnOutcome::collect(rag.run_turn("What is prompt engineering?", vec![])).await?;
//! println!("{}", outcome.response);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod driver;
pub mod events;
mod guard;
pub mod outcome;
pub mod ports;
pub mod stages;
pub mod state;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types
pub use driver::{RagLoop, TurnStream, DEFAULT_KNOWLEDGE_TOP_K, DEFAULT_WEB_RESULTS};
pub use events::{TurnCompletion, TurnEvent};
pub use outcome::TurnOutcome;
pub use ports::{
    ChunkStream, Classifier, GenerationChunk, GenerationTask, Generator, KnowledgeRetriever,
    PromptContext, TaskKind, WebSearcher,
};
pub use state::{
    ConversationState, Evidence, EvidenceSource, Message, Node, Question, RewriteCause, Role,
};
