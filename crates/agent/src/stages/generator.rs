//! Prompt context for answer generation.

use crate::ports::{GenerationTask, PromptContext};
use crate::state::{Evidence, Message, Question};

/// Separator placed between evidence items in the context block.
pub const EVIDENCE_DELIMITER: &str = "\n\n---\n\n";

/// Concatenate evidence content in order.
pub fn format_documents(evidence: &[Evidence]) -> String {
    evidence
        .iter()
        .map(|e| e.content.trim())
        .collect::<Vec<_>>()
        .join(EVIDENCE_DELIMITER)
}

/// Context for answering `question` from `evidence` after `history`.
pub fn answer_context(
    question: &Question,
    evidence: &[Evidence],
    history: &[Message],
) -> PromptContext {
    PromptContext::new(GenerationTask::Answer)
        .with_variable("question", question.as_str())
        .with_variable("documents", format_documents(evidence))
        .with_history(history.to_vec())
}
