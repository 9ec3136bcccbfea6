//! Command handlers for the ragloop CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod chat;
pub mod knowledge;
pub mod threads;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use knowledge::KnowledgeCommand;
pub use threads::ThreadsCommand;
