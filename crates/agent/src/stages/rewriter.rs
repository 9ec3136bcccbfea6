//! Query rewriting for knowledge base retrieval.

use crate::ports::{GenerationChunk, GenerationTask, Generator, PromptContext};
use crate::state::Question;
use futures::StreamExt;
use ragloop_core::AppResult;

/// Reformulate `question` for retrieval.
///
/// Reasoning chunks are ignored. An empty rewrite falls back to the input.
pub async fn rewrite(generator: &dyn Generator, question: &Question) -> AppResult<Question> {
    let context =
        PromptContext::new(GenerationTask::Rewrite).with_variable("question", question.as_str());

    let mut stream = generator.generate(&context).await?;
    let mut text = String::new();

    while let Some(chunk) = stream.next().await {
        if let GenerationChunk::Answer(part) = chunk? {
            text.push_str(&part);
        }
    }

    let rewritten = text.trim().trim_matches('"').trim();
    if rewritten.is_empty() {
        tracing::warn!("Rewrite produced no text, keeping the current question");
        return Ok(question.clone());
    }

    tracing::debug!("Rewrote question: '{}' -> '{}'", question, rewritten);
    Ok(Question::new(rewritten))
}
