//! Question routing between the knowledge base and web search.

use super::normalize_label;
use crate::ports::{Classifier, TaskKind};
use crate::state::{Node, Question};
use ragloop_core::{AppError, AppResult};
use std::collections::HashMap;

/// Evidence source chosen by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datasource {
    KnowledgeBase,
    Web,
}

impl Datasource {
    /// Accepts `vectorstore` / `knowledge_base` and `web_search` / `web`.
    pub fn from_label(label: &str) -> Option<Self> {
        match normalize_label(label).as_str() {
            "vectorstore" | "knowledge_base" => Some(Self::KnowledgeBase),
            "web_search" | "web" => Some(Self::Web),
            _ => None,
        }
    }

    pub fn next_node(&self) -> Node {
        match self {
            Self::KnowledgeBase => Node::Retrieve,
            Self::Web => Node::WebSearch,
        }
    }
}

/// Ask the classifier where to look for evidence.
pub async fn route(classifier: &dyn Classifier, question: &Question) -> AppResult<Datasource> {
    let inputs = HashMap::from([("question".to_string(), question.to_string())]);
    let label = classifier.classify(TaskKind::Route, &inputs).await?;

    Datasource::from_label(&label).ok_or_else(|| AppError::ClassificationAmbiguous {
        task: TaskKind::Route.to_string(),
        label,
    })
}
