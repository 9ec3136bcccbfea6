//! Prompt system for ragloop.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions
//! - Built-in prompts for every decision point of the retrieval loop
//! - Workspace overrides in `.ragloop/prompts/<id>.yml`
//! - Handlebars template rendering

pub mod builder;
pub mod builtin;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use builtin::{
    builtin_prompt_ids, GENERATE, GRADE_DOCUMENT, GRADE_GROUNDEDNESS, GRADE_USEFULNESS, REWRITE,
    ROUTE, THREAD_TITLE,
};
pub use loader::{list_prompts, load_prompt};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptOutputSpec};
