//! Capability ports consumed by the control loop.
//!
//! The loop only talks to models, the knowledge index and web search
//! through these traits. Production adapters live in [`crate::adapters`];
//! deterministic stubs live in `crate::testing`.

use crate::state::{Evidence, Message};
use futures::Stream;
use ragloop_core::AppResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;

/// Decision a classifier is asked to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Inputs: `question`. Labels: knowledge base or web.
    Route,
    /// Inputs: `question`, `document`. Labels: yes / no.
    GradeDocument,
    /// Inputs: `documents`, `generation`. Labels: yes / no.
    GradeGroundedness,
    /// Inputs: `question`, `generation`. Labels: yes / no.
    GradeUsefulness,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::GradeDocument => "grade_document",
            Self::GradeGroundedness => "grade_groundedness",
            Self::GradeUsefulness => "grade_usefulness",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing and grading decisions.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    /// Return the raw categorical label for `task` given `inputs`.
    async fn classify(&self, task: TaskKind, inputs: &HashMap<String, String>)
        -> AppResult<String>;
}

/// What the generator is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTask {
    /// Variables: `question`, `documents`
    Answer,
    /// Variables: `question`
    Rewrite,
}

/// Input of one generator call.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub task: GenerationTask,
    pub variables: HashMap<String, String>,
    pub history: Vec<Message>,
}

impl PromptContext {
    pub fn new(task: GenerationTask) -> Self {
        Self {
            task,
            variables: HashMap::new(),
            history: Vec::new(),
        }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn variable(&self, key: &str) -> &str {
        self.variables.get(key).map(String::as_str).unwrap_or("")
    }
}

/// A partial generator output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationChunk {
    Thought(String),
    Answer(String),
}

/// Ordered, finite stream of generator chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = AppResult<GenerationChunk>> + Send>>;

/// Streaming text generation.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, context: &PromptContext) -> AppResult<ChunkStream>;
}

/// Similarity search over the indexed corpus.
#[async_trait::async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Up to `k` snippets, most similar first.
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<Evidence>>;
}

/// Live web search.
#[async_trait::async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<Evidence>>;
}
