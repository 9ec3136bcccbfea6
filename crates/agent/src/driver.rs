//! The adaptive retrieval loop.
//!
//! [`RagLoop::run_turn`] returns a lazy stream of [`TurnEvent`]s. Each poll
//! advances the state machine by at most one node (or one generator chunk),
//! so consumers observe every transition as it happens:
//!
//! ```text
//! START -> ROUTE
//! ROUTE -> WEB_SEARCH | RETRIEVE
//! WEB_SEARCH -> GENERATE
//! RETRIEVE -> GRADE_DOCS
//! GRADE_DOCS -> REWRITE (no relevant evidence) | GENERATE
//! REWRITE -> RETRIEVE
//! GENERATE -> GRADE_GEN
//! GRADE_GEN -> GENERATE (not grounded) | REWRITE (not useful) | DONE
//! ```
//!
//! Rewrites and regenerations are capped by [`LoopConfig`]; exceeding a cap
//! ends the turn with the matching error. Any error is yielded once and
//! ends the stream without a `Completed` event.

use crate::events::{TurnCompletion, TurnEvent};
use crate::guard::Guarded;
use crate::ports::{
    ChunkStream, Classifier, GenerationChunk, Generator, KnowledgeRetriever, WebSearcher,
};
use crate::stages::{generator, grader, rewriter, router};
use crate::state::{ConversationState, Message, Node, Question, RewriteCause};
use futures::{stream, Stream, StreamExt};
use ragloop_core::{AppError, AppResult, LoopConfig};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use tracing::Instrument;

/// Knowledge base snippets retrieved per query.
pub const DEFAULT_KNOWLEDGE_TOP_K: usize = 15;

/// Web results merged into one evidence item.
pub const DEFAULT_WEB_RESULTS: usize = 3;

/// Events of one turn, ending after `Completed` or the first error.
pub type TurnStream = Pin<Box<dyn Stream<Item = AppResult<TurnEvent>> + Send>>;

/// The control loop with its injected ports.
#[derive(Clone)]
pub struct RagLoop {
    classifier: Arc<dyn Classifier>,
    generator: Arc<dyn Generator>,
    knowledge: Arc<dyn KnowledgeRetriever>,
    web: Arc<dyn WebSearcher>,
    limits: LoopConfig,
    knowledge_top_k: usize,
    web_results: usize,
}

impl RagLoop {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        generator: Arc<dyn Generator>,
        knowledge: Arc<dyn KnowledgeRetriever>,
        web: Arc<dyn WebSearcher>,
    ) -> Self {
        Self {
            classifier,
            generator,
            knowledge,
            web,
            limits: LoopConfig::default(),
            knowledge_top_k: DEFAULT_KNOWLEDGE_TOP_K,
            web_results: DEFAULT_WEB_RESULTS,
        }
    }

    /// Iteration caps and the per-call timeout.
    pub fn with_limits(mut self, limits: LoopConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_knowledge_top_k(mut self, k: usize) -> Self {
        self.knowledge_top_k = k;
        self
    }

    pub fn with_web_results(mut self, k: usize) -> Self {
        self.web_results = k;
        self
    }

    pub fn limits(&self) -> &LoopConfig {
        &self.limits
    }

    /// Answer `question` given the prior conversation.
    ///
    /// Nothing runs until the returned stream is polled. A blank question
    /// yields a single `Validation` error without calling any port.
    pub fn run_turn(&self, question: impl Into<Question>, history: Vec<Message>) -> TurnStream {
        let question = question.into();
        if question.as_str().trim().is_empty() {
            return Box::pin(stream::once(async {
                tracing::warn!("Rejected blank question");
                Err(AppError::Validation("Question cannot be empty".to_string()))
            }));
        }

        let turn_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("turn", %turn_id);
        let driver = TurnDriver::new(self, question, history);

        Box::pin(stream::unfold(driver, move |mut driver| {
            let span = span.clone();
            async move {
                let event = driver.next_event().await?;
                Some((event, driver))
            }
            .instrument(span)
        }))
    }
}

/// A generation being streamed.
struct InFlight {
    stream: ChunkStream,
    answer: String,
    thought: String,
}

/// State machine of a single turn.
struct TurnDriver {
    classifier: Guarded<dyn Classifier>,
    generator: Guarded<dyn Generator>,
    knowledge: Guarded<dyn KnowledgeRetriever>,
    web: Guarded<dyn WebSearcher>,
    limits: LoopConfig,
    knowledge_top_k: usize,
    web_results: usize,
    state: ConversationState,
    node: Node,
    pending: VecDeque<TurnEvent>,
    generation: Option<InFlight>,
    finished: bool,
}

impl TurnDriver {
    fn new(rag: &RagLoop, question: Question, history: Vec<Message>) -> Self {
        let timeout = rag.limits.call_timeout();

        Self {
            classifier: Guarded::new(rag.classifier.clone(), "classifier", timeout),
            generator: Guarded::new(rag.generator.clone(), "generator", timeout),
            knowledge: Guarded::new(rag.knowledge.clone(), "knowledge_retriever", timeout),
            web: Guarded::new(rag.web.clone(), "web_searcher", timeout),
            limits: rag.limits,
            knowledge_top_k: rag.knowledge_top_k,
            web_results: rag.web_results,
            state: ConversationState::new(question, history),
            node: Node::Start,
            pending: VecDeque::new(),
            generation: None,
            finished: false,
        }
    }

    async fn next_event(&mut self) -> Option<AppResult<TurnEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.step().await {
                self.finished = true;
                self.generation = None;
                tracing::warn!(node = %self.node, kind = %e.kind(), "turn failed: {}", e);
                return Some(Err(e));
            }
        }
    }

    /// Run the current node, or pull one chunk of the generation in flight.
    async fn step(&mut self) -> AppResult<()> {
        if self.generation.is_some() {
            return self.pull_generation().await;
        }

        match self.node {
            Node::Start => self.transition(Node::Route),

            Node::Route => {
                let datasource = router::route(&self.classifier, &self.state.question).await?;
                tracing::debug!("Routed to {:?}", datasource);
                self.transition(datasource.next_node())
            }

            Node::WebSearch => {
                let evidence = self
                    .web
                    .search(self.state.question.as_str(), self.web_results)
                    .await?;
                tracing::debug!("Web search returned {} evidence items", evidence.len());
                self.state.set_evidence(evidence);
                self.transition(Node::Generate)
            }

            Node::Retrieve => {
                let evidence = self
                    .knowledge
                    .search(self.state.question.as_str(), self.knowledge_top_k)
                    .await?;
                tracing::debug!("Retrieved {} evidence items", evidence.len());
                self.state.set_evidence(evidence);
                self.transition(Node::GradeDocs)
            }

            Node::GradeDocs => {
                let relevant = grader::grade_documents(
                    &self.classifier,
                    &self.state.question,
                    &self.state.evidence,
                )
                .await?;
                self.state.evidence = relevant;

                if self.state.evidence.is_empty() {
                    self.enter_rewrite(RewriteCause::EmptyEvidence)
                } else {
                    self.transition(Node::Generate)
                }
            }

            Node::Rewrite => {
                let question = rewriter::rewrite(&self.generator, &self.state.question).await?;
                self.state.question = question;
                self.transition(Node::Retrieve)
            }

            Node::Generate => {
                let context = generator::answer_context(
                    &self.state.question,
                    &self.state.evidence,
                    &self.state.history,
                );
                let stream = self.generator.generate(&context).await?;
                self.generation = Some(InFlight {
                    stream,
                    answer: String::new(),
                    thought: String::new(),
                });
                Ok(())
            }

            Node::GradeGen => self.grade_generation().await,

            Node::Done => {
                self.finished = true;
                Ok(())
            }
        }
    }

    async fn pull_generation(&mut self) -> AppResult<()> {
        let Some(in_flight) = self.generation.as_mut() else {
            return Ok(());
        };

        match in_flight.stream.next().await {
            Some(Ok(GenerationChunk::Thought(content))) => {
                in_flight.thought.push_str(&content);
                self.pending.push_back(TurnEvent::ThoughtChunk { content });
                Ok(())
            }
            Some(Ok(GenerationChunk::Answer(content))) => {
                in_flight.answer.push_str(&content);
                self.pending.push_back(TurnEvent::AnswerChunk { content });
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => {
                if let Some(done) = self.generation.take() {
                    self.state.generation = Some(done.answer.trim().to_string());
                    self.state.thought = Some(done.thought.trim().to_string())
                        .filter(|thought| !thought.is_empty());
                }
                self.transition(Node::GradeGen)
            }
        }
    }

    async fn grade_generation(&mut self) -> AppResult<()> {
        let generation = self.state.generation.clone().unwrap_or_default();

        let grounded =
            grader::grade_groundedness(&self.classifier, &self.state.evidence, &generation).await?;

        if !grounded {
            if self.state.regenerations >= self.limits.max_regenerations {
                return Err(AppError::UngroundedRegenerationExhausted {
                    attempts: self.state.regenerations,
                });
            }
            self.state.regenerations += 1;
            tracing::info!(
                "Generation not grounded, regenerating ({}/{})",
                self.state.regenerations,
                self.limits.max_regenerations
            );
            return self.transition(Node::Generate);
        }

        let useful =
            grader::grade_usefulness(&self.classifier, &self.state.question, &generation).await?;

        if useful {
            self.transition(Node::Done)?;
            self.complete(generation);
            Ok(())
        } else {
            self.enter_rewrite(RewriteCause::UnhelpfulAnswer)
        }
    }

    fn enter_rewrite(&mut self, cause: RewriteCause) -> AppResult<()> {
        let attempts = self.state.rewrites;
        if attempts >= self.limits.max_rewrites {
            return Err(match cause {
                RewriteCause::EmptyEvidence => AppError::EmptyEvidenceExhausted { attempts },
                RewriteCause::UnhelpfulAnswer => AppError::UnhelpfulAnswerExhausted { attempts },
            });
        }

        self.state.rewrites += 1;
        tracing::info!(
            "Rewriting question after {:?} ({}/{})",
            cause,
            self.state.rewrites,
            self.limits.max_rewrites
        );
        self.transition(Node::Rewrite)
    }

    fn transition(&mut self, next: Node) -> AppResult<()> {
        let from = self.node;
        if !from.can_transition_to(next) {
            return Err(AppError::Other(format!(
                "Invalid loop transition {} -> {}",
                from, next
            )));
        }

        tracing::info!(
            node = %from,
            next = %next,
            rewrites = self.state.rewrites,
            regenerations = self.state.regenerations,
            "state transition"
        );

        self.node = next;
        self.state.trace.push(next);
        self.pending
            .push_back(TurnEvent::StateTransition { from, to: next });
        Ok(())
    }

    fn complete(&mut self, generation: String) {
        let response = Message::response(generation);
        let thought = self.state.thought.clone().map(Message::thought);

        let mut history = std::mem::take(&mut self.state.history);
        history.push(Message::user(self.state.original_question.as_str()));
        history.extend(thought.clone());
        history.push(response.clone());

        self.pending.push_back(TurnEvent::Completed(TurnCompletion {
            response,
            thought,
            history,
            rewrites: self.state.rewrites,
            regenerations: self.state.regenerations,
        }));
        self.finished = true;
    }
}
