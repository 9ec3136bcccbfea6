//! Deterministic stub ports for exercising the loop without live services.
//!
//! Every stub records its calls so tests can assert which ports ran and
//! with what inputs.

use crate::ports::{
    ChunkStream, Classifier, GenerationChunk, GenerationTask, Generator, KnowledgeRetriever,
    PromptContext, TaskKind, WebSearcher,
};
use crate::state::Evidence;
use futures::stream;
use ragloop_core::{AppError, AppResult};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct TaskScript {
    queue: VecDeque<String>,
    fallback: Option<String>,
    failure: Option<String>,
}

/// Classifier answering from per-task scripts.
///
/// A task first consumes its scripted labels in order, then repeats its
/// `always` label. A task with neither fails with an `Llm` error.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    scripts: Mutex<HashMap<TaskKind, TaskScript>>,
    calls: Mutex<Vec<(TaskKind, HashMap<String, String>)>>,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `label` whenever the script for `task` is exhausted.
    pub fn always(self, task: TaskKind, label: &str) -> Self {
        lock(&self.scripts).entry(task).or_default().fallback = Some(label.to_string());
        self
    }

    /// Answer these labels, in order, to the next calls for `task`.
    pub fn script<I, S>(self, task: TaskKind, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.scripts)
            .entry(task)
            .or_default()
            .queue
            .extend(labels.into_iter().map(Into::into));
        self
    }

    /// Fail every call for `task` with a transient error.
    pub fn fail(self, task: TaskKind, message: &str) -> Self {
        lock(&self.scripts).entry(task).or_default().failure = Some(message.to_string());
        self
    }

    /// Inputs of the calls made for `task`, in order.
    pub fn calls(&self, task: TaskKind) -> Vec<HashMap<String, String>> {
        lock(&self.calls)
            .iter()
            .filter(|(t, _)| *t == task)
            .map(|(_, inputs)| inputs.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait::async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(
        &self,
        task: TaskKind,
        inputs: &HashMap<String, String>,
    ) -> AppResult<String> {
        lock(&self.calls).push((task, inputs.clone()));

        let mut scripts = lock(&self.scripts);
        let script = scripts.entry(task).or_default();

        if let Some(ref message) = script.failure {
            return Err(AppError::Llm(message.clone()));
        }

        script
            .queue
            .pop_front()
            .or_else(|| script.fallback.clone())
            .ok_or_else(|| AppError::Llm(format!("no scripted label for {}", task)))
    }
}

#[derive(Debug, Clone)]
enum Behaviour {
    Scripted,
    Fail(String),
    Stall,
}

/// Generator replaying scripted chunk sequences.
///
/// Answers and rewrites have separate queues. When the answer queue runs
/// dry the last answer is repeated; when the rewrite queue runs dry the
/// question is echoed with a suffix.
#[derive(Debug)]
pub struct ScriptedGenerator {
    answers: Mutex<VecDeque<Vec<GenerationChunk>>>,
    last_answer: Mutex<Vec<GenerationChunk>>,
    rewrites: Mutex<VecDeque<Vec<GenerationChunk>>>,
    behaviour: Behaviour,
    calls: Mutex<Vec<PromptContext>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            last_answer: Mutex::new(split_words("Generated answer.")),
            rewrites: Mutex::new(VecDeque::new()),
            behaviour: Behaviour::Scripted,
            calls: Mutex::new(Vec::new()),
        }
    }
}

/// Split text into word-sized answer chunks.
fn split_words(text: &str) -> Vec<GenerationChunk> {
    text.split_inclusive(' ')
        .map(|word| GenerationChunk::Answer(word.to_string()))
        .collect()
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue answers, each streamed word by word.
    pub fn answers<I, S>(self, answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lock(&self.answers).extend(answers.into_iter().map(|a| split_words(a.as_ref())));
        self
    }

    /// Queue one answer with explicit chunks (e.g. thoughts before text).
    pub fn answer_chunks(self, chunks: Vec<GenerationChunk>) -> Self {
        lock(&self.answers).push_back(chunks);
        self
    }

    /// Queue rewrite outputs.
    pub fn rewrites<I, S>(self, rewrites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lock(&self.rewrites).extend(rewrites.into_iter().map(|r| split_words(r.as_ref())));
        self
    }

    /// Queue one rewrite with explicit chunks.
    pub fn rewrite_chunks(self, chunks: Vec<GenerationChunk>) -> Self {
        lock(&self.rewrites).push_back(chunks);
        self
    }

    /// Fail every call with a transient error.
    pub fn failing(mut self, message: &str) -> Self {
        self.behaviour = Behaviour::Fail(message.to_string());
        self
    }

    /// Return a stream that never yields.
    pub fn stalling(mut self) -> Self {
        self.behaviour = Behaviour::Stall;
        self
    }

    pub fn calls(&self) -> Vec<PromptContext> {
        lock(&self.calls).clone()
    }

    /// Calls made for `task`.
    pub fn calls_for(&self, task: GenerationTask) -> usize {
        lock(&self.calls).iter().filter(|c| c.task == task).count()
    }

    fn next_chunks(&self, context: &PromptContext) -> Vec<GenerationChunk> {
        match context.task {
            GenerationTask::Answer => match lock(&self.answers).pop_front() {
                Some(chunks) => {
                    *lock(&self.last_answer) = chunks.clone();
                    chunks
                }
                None => lock(&self.last_answer).clone(),
            },
            GenerationTask::Rewrite => lock(&self.rewrites).pop_front().unwrap_or_else(|| {
                split_words(&format!("{} (rephrased)", context.variable("question")))
            }),
        }
    }
}

#[async_trait::async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, context: &PromptContext) -> AppResult<ChunkStream> {
        lock(&self.calls).push(context.clone());

        match self.behaviour {
            Behaviour::Fail(ref message) => Err(AppError::Llm(message.clone())),
            Behaviour::Stall => Ok(Box::pin(stream::pending::<AppResult<GenerationChunk>>())),
            Behaviour::Scripted => {
                let chunks = self.next_chunks(context);
                Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok::<_, AppError>))))
            }
        }
    }
}

/// Knowledge retriever returning a fixed corpus, truncated to `k`.
#[derive(Debug, Default)]
pub struct StaticRetriever {
    evidence: Vec<Evidence>,
    failure: Option<String>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl StaticRetriever {
    pub fn new(evidence: Vec<Evidence>) -> Self {
        Self {
            evidence,
            ..Default::default()
        }
    }

    /// Fail every search with a `Knowledge` error.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// `(query, k)` of every search, in order.
    pub fn calls(&self) -> Vec<(String, usize)> {
        lock(&self.calls).clone()
    }
}

#[async_trait::async_trait]
impl KnowledgeRetriever for StaticRetriever {
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<Evidence>> {
        lock(&self.calls).push((query.to_string(), k));

        if let Some(ref message) = self.failure {
            return Err(AppError::Knowledge(message.clone()));
        }
        Ok(self.evidence.iter().take(k).cloned().collect())
    }
}

/// Web searcher returning a fixed result set.
#[derive(Debug, Default)]
pub struct StaticWebSearcher {
    evidence: Vec<Evidence>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl StaticWebSearcher {
    pub fn new(evidence: Vec<Evidence>) -> Self {
        Self {
            evidence,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, usize)> {
        lock(&self.calls).clone()
    }
}

#[async_trait::async_trait]
impl WebSearcher for StaticWebSearcher {
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<Evidence>> {
        lock(&self.calls).push((query.to_string(), k));
        Ok(self.evidence.clone())
    }
}

/// `n` knowledge base snippets named `snippet 0..n`.
pub fn knowledge_snippets(n: usize) -> Vec<Evidence> {
    (0..n)
        .map(|i| {
            Evidence::knowledge(format!("snippet {}", i))
                .with_metadata("position", serde_json::Value::from(i))
        })
        .collect()
}
