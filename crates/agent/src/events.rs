//! Events produced by a running turn.

use crate::state::{Message, Node};
use serde::{Deserialize, Serialize};

/// One step of observable turn progress.
///
/// Answer chunks belong to the generation in flight. A
/// `GRADE_GEN -> GENERATE` transition discards the answer streamed so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    StateTransition { from: Node, to: Node },
    ThoughtChunk { content: String },
    AnswerChunk { content: String },
    Completed(TurnCompletion),
}

/// Final payload of a successful turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnCompletion {
    /// The accepted answer
    pub response: Message,

    /// Reasoning that accompanied the accepted answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<Message>,

    /// Prior history plus this turn's user, thought and response messages
    pub history: Vec<Message>,

    pub rewrites: u32,
    pub regenerations: u32,
}
