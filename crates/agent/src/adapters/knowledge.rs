//! Knowledge retriever port backed by a learned knowledge base.

use crate::ports::KnowledgeRetriever;
use crate::state::Evidence;
use ragloop_core::AppResult;
use ragloop_knowledge::{KnowledgeBase, ScoredChunk};
use serde_json::json;

pub struct KnowledgeBaseRetriever {
    base: KnowledgeBase,
}

impl KnowledgeBaseRetriever {
    pub fn new(base: KnowledgeBase) -> Self {
        Self { base }
    }
}

fn to_evidence(scored: ScoredChunk) -> Evidence {
    let chunk = scored.chunk;
    let mut evidence = Evidence::knowledge(chunk.text)
        .with_metadata("score", json!(scored.score))
        .with_metadata("chunk_id", json!(chunk.id))
        .with_metadata("position", json!(chunk.position));
    if let Some(source) = chunk.metadata.get("source") {
        evidence = evidence.with_metadata("source", source.clone());
    }
    evidence
}

#[async_trait::async_trait]
impl KnowledgeRetriever for KnowledgeBaseRetriever {
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<Evidence>> {
        let results = self.base.search(query, k).await?;
        Ok(results.into_iter().map(to_evidence).collect())
    }
}
