//! Folding a turn's event stream into its result.

use crate::driver::TurnStream;
use crate::events::TurnEvent;
use crate::state::{Message, Node};
use futures::StreamExt;
use ragloop_core::{AppError, AppResult};

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub response: String,
    pub thought: Option<String>,

    /// Prior history plus this turn's messages
    pub history: Vec<Message>,

    /// Visited nodes, starting at `START`
    pub trace: Vec<Node>,

    pub rewrites: u32,
    pub regenerations: u32,
}

impl TurnOutcome {
    /// Drain `stream`. Fails with the turn's error, or if it never completed.
    pub async fn collect(mut stream: TurnStream) -> AppResult<Self> {
        let mut trace = vec![Node::Start];

        while let Some(event) = stream.next().await {
            match event? {
                TurnEvent::StateTransition { to, .. } => trace.push(to),
                TurnEvent::ThoughtChunk { .. } | TurnEvent::AnswerChunk { .. } => {}
                TurnEvent::Completed(completion) => {
                    return Ok(Self {
                        response: completion.response.content,
                        thought: completion.thought.map(|m| m.content),
                        history: completion.history,
                        trace,
                        rewrites: completion.rewrites,
                        regenerations: completion.regenerations,
                    });
                }
            }
        }

        Err(AppError::Other(format!(
            "Turn ended without an answer (last state: {})",
            trace.last().copied().unwrap_or(Node::Start)
        )))
    }

    /// Number of times `node` was entered.
    pub fn visits(&self, node: Node) -> usize {
        self.trace.iter().filter(|n| **n == node).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TurnCompletion;
    use futures::stream;

    fn events(items: Vec<AppResult<TurnEvent>>) -> TurnStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn test_collect_completed_turn() {
        let stream = events(vec![
            Ok(TurnEvent::StateTransition {
                from: Node::Start,
                to: Node::Route,
            }),
            Ok(TurnEvent::AnswerChunk {
                content: "hi".to_string(),
            }),
            Ok(TurnEvent::Completed(TurnCompletion {
                response: Message::response("hi"),
                thought: Some(Message::thought("hmm")),
                history: vec![Message::user("q"), Message::response("hi")],
                rewrites: 0,
                regenerations: 1,
            })),
        ]);

        let outcome = TurnOutcome::collect(stream).await.unwrap();
        assert_eq!(outcome.response, "hi");
        assert_eq!(outcome.thought.as_deref(), Some("hmm"));
        assert_eq!(outcome.trace, vec![Node::Start, Node::Route]);
        assert_eq!(outcome.regenerations, 1);
        assert_eq!(outcome.visits(Node::Route), 1);
    }

    #[tokio::test]
    async fn test_incomplete_stream_is_error() {
        let stream = events(vec![Ok(TurnEvent::StateTransition {
            from: Node::Start,
            to: Node::Route,
        })]);

        let err = TurnOutcome::collect(stream).await.unwrap_err();
        assert!(err.to_string().contains("ROUTE"));
    }

    #[tokio::test]
    async fn test_turn_error_propagates() {
        let stream = events(vec![Err(AppError::EmptyEvidenceExhausted { attempts: 3 })]);
        let err = TurnOutcome::collect(stream).await.unwrap_err();
        assert_eq!(err.kind().as_str(), "empty_evidence_exhausted");
    }
}
