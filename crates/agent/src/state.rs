//! Data model of a conversation turn.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The user's question, or a rewrite of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Question(String);

impl Question {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Question {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Question {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    KnowledgeBase,
    Web,
}

/// One retrieved snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub content: String,
    pub source: EvidenceSource,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Evidence {
    pub fn new(content: impl Into<String>, source: EvidenceSource) -> Self {
        Self {
            content: content.into(),
            source,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn knowledge(content: impl Into<String>) -> Self {
        Self::new(content, EvidenceSource::KnowledgeBase)
    }

    pub fn web(content: impl Into<String>) -> Self {
        Self::new(content, EvidenceSource::Web)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    AssistantThought,
    AssistantResponse,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::AssistantThought => "assistant_thought",
            Self::AssistantResponse => "assistant_response",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn thought(content: impl Into<String>) -> Self {
        Self {
            role: Role::AssistantThought,
            content: content.into(),
        }
    }

    pub fn response(content: impl Into<String>) -> Self {
        Self {
            role: Role::AssistantResponse,
            content: content.into(),
        }
    }
}

/// States of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Node {
    Start,
    Route,
    WebSearch,
    Retrieve,
    GradeDocs,
    Rewrite,
    Generate,
    GradeGen,
    Done,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Route => "ROUTE",
            Self::WebSearch => "WEB_SEARCH",
            Self::Retrieve => "RETRIEVE",
            Self::GradeDocs => "GRADE_DOCS",
            Self::Rewrite => "REWRITE",
            Self::Generate => "GENERATE",
            Self::GradeGen => "GRADE_GEN",
            Self::Done => "DONE",
        }
    }

    /// Whether `self -> next` is an edge of the loop.
    pub fn can_transition_to(&self, next: Node) -> bool {
        use Node::*;
        matches!(
            (self, next),
            (Start, Route)
                | (Route, WebSearch)
                | (Route, Retrieve)
                | (WebSearch, Generate)
                | (Retrieve, GradeDocs)
                | (GradeDocs, Rewrite)
                | (GradeDocs, Generate)
                | (Rewrite, Retrieve)
                | (Generate, GradeGen)
                | (GradeGen, Generate)
                | (GradeGen, Done)
                | (GradeGen, Rewrite)
        )
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What sent the loop to REWRITE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteCause {
    EmptyEvidence,
    UnhelpfulAnswer,
}

/// Mutable state threaded through one turn.
#[derive(Debug, Clone)]
pub struct ConversationState {
    /// The question as asked
    pub original_question: Question,

    /// The question currently used for retrieval and generation
    pub question: Question,

    /// Evidence of the current retrieval, replaced wholesale by grading
    pub evidence: Vec<Evidence>,

    /// Latest complete generation
    pub generation: Option<String>,

    /// Reasoning streamed with the latest generation
    pub thought: Option<String>,

    /// Prior conversation, oldest first
    pub history: Vec<Message>,

    /// REWRITE entries so far this turn
    pub rewrites: u32,

    /// Regenerations for the current evidence set
    pub regenerations: u32,

    /// Visited nodes, in order
    pub trace: Vec<Node>,
}

impl ConversationState {
    pub fn new(question: Question, history: Vec<Message>) -> Self {
        Self {
            original_question: question.clone(),
            question,
            evidence: Vec::new(),
            generation: None,
            thought: None,
            history,
            rewrites: 0,
            regenerations: 0,
            trace: vec![Node::Start],
        }
    }

    /// Replace the evidence set. Resets the regeneration counter.
    pub fn set_evidence(&mut self, evidence: Vec<Evidence>) {
        self.evidence = evidence;
        self.regenerations = 0;
    }
}
