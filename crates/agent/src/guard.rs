//! Per-call timeouts around the ports.
//!
//! [`Guarded`] wraps a port and maps stalls and failures to
//! `UpstreamUnavailable`, so a turn never hangs on a silent collaborator.
//! Classification errors pass through untouched.

use crate::ports::{
    ChunkStream, Classifier, GenerationChunk, Generator, KnowledgeRetriever, PromptContext,
    TaskKind, WebSearcher,
};
use crate::state::Evidence;
use futures::{stream, Future, StreamExt};
use ragloop_core::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A port wrapped with a call timeout.
pub struct Guarded<P: ?Sized> {
    inner: Arc<P>,
    port: &'static str,
    timeout: Duration,
}

impl<P: ?Sized> Guarded<P> {
    pub fn new(inner: Arc<P>, port: &'static str, timeout: Duration) -> Self {
        Self {
            inner,
            port,
            timeout,
        }
    }

    async fn call<T>(&self, fut: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        guard_call(self.port, self.timeout, fut).await
    }
}

pub(crate) fn into_upstream(port: &str, error: AppError) -> AppError {
    match error {
        AppError::ClassificationAmbiguous { .. } | AppError::UpstreamUnavailable { .. } => error,
        other => AppError::upstream(port, other),
    }
}

async fn guard_call<T>(
    port: &str,
    timeout: Duration,
    fut: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(|e| into_upstream(port, e)),
        Err(_) => Err(AppError::upstream(
            port,
            format!("timed out after {}s", timeout.as_secs_f64()),
        )),
    }
}

#[async_trait::async_trait]
impl Classifier for Guarded<dyn Classifier> {
    async fn classify(
        &self,
        task: TaskKind,
        inputs: &HashMap<String, String>,
    ) -> AppResult<String> {
        tracing::debug!("classifier call: {}", task);
        self.call(self.inner.classify(task, inputs)).await
    }
}

#[async_trait::async_trait]
impl Generator for Guarded<dyn Generator> {
    /// The timeout applies to opening the stream and to each chunk.
    async fn generate(&self, context: &PromptContext) -> AppResult<ChunkStream> {
        tracing::debug!("generator call: {:?}", context.task);
        let inner = self.call(self.inner.generate(context)).await?;

        let port = self.port;
        let timeout = self.timeout;
        let guarded = stream::unfold(Some(inner), move |state| async move {
            let mut inner = state?;
            match tokio::time::timeout(timeout, inner.next()).await {
                Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(inner))),
                Ok(Some(Err(e))) => Some((Err(into_upstream(port, e)), None)),
                Ok(None) => None,
                Err(_) => Some((
                    Err::<GenerationChunk, _>(AppError::upstream(
                        port,
                        format!("stream stalled for {}s", timeout.as_secs_f64()),
                    )),
                    None,
                )),
            }
        });

        Ok(Box::pin(guarded))
    }
}

#[async_trait::async_trait]
impl KnowledgeRetriever for Guarded<dyn KnowledgeRetriever> {
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<Evidence>> {
        tracing::debug!("knowledge retriever call: k={}", k);
        self.call(self.inner.search(query, k)).await
    }
}

#[async_trait::async_trait]
impl WebSearcher for Guarded<dyn WebSearcher> {
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<Evidence>> {
        tracing::debug!("web searcher call: k={}", k);
        self.call(self.inner.search(query, k)).await
    }
}
