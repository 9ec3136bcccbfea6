//! Production implementations of the ports, and wiring from configuration.

pub mod classifier;
pub mod generator;
pub mod knowledge;
pub mod retry;
pub mod web;

pub use classifier::LlmClassifier;
pub use generator::LlmGenerator;
pub use knowledge::KnowledgeBaseRetriever;
pub use retry::RetryPolicy;
pub use web::WebSearchRetriever;

use crate::driver::RagLoop;
use ragloop_core::{AppConfig, AppResult};
use ragloop_knowledge::KnowledgeBase;
use ragloop_websearch::WebSearchService;
use std::sync::Arc;

/// Build a loop wired to the configured models, knowledge base and search provider.
///
/// Fails if a provider cannot be created or the knowledge base was never learned.
pub fn build_loop(config: &AppConfig) -> AppResult<RagLoop> {
    let retry = RetryPolicy::from_loop_config(&config.loop_config);

    let generator_client = ragloop_llm::client_for(config, &config.provider)?;
    let thinking_budget = config
        .get_provider_config(&config.provider)
        .and_then(|p| p.thinking_budget());
    let generator = LlmGenerator::new(generator_client, config.model.clone(), &config.workspace)?
        .with_thinking_budget(thinking_budget)
        .with_retry(retry);

    let (classifier_provider, classifier_model) = config.classifier_target();
    let classifier_client = ragloop_llm::client_for(config, &classifier_provider)?;
    let classifier = LlmClassifier::new(
        classifier_client,
        classifier_model.clone(),
        &config.workspace,
        config.knowledge.topics.clone(),
    )?
    .with_retry(retry);

    let base = KnowledgeBase::open(&config.workspace, &config.knowledge.base)?;
    let knowledge = KnowledgeBaseRetriever::new(base);

    let search_key = config.resolve_search_api_key();
    let service = WebSearchService::new(&config.search.provider, search_key.as_deref())?;
    let web = WebSearchRetriever::new(service).with_retry(retry);

    tracing::info!(
        generator = %config.model,
        classifier = %classifier_model,
        knowledge_base = %config.knowledge.base,
        search = %config.search.provider,
        "Retrieval loop ready"
    );

    Ok(RagLoop::new(
        Arc::new(classifier),
        Arc::new(generator),
        Arc::new(knowledge),
        Arc::new(web),
    )
    .with_limits(config.loop_config)
    .with_knowledge_top_k(config.knowledge.top_k as usize)
    .with_web_results(config.search.max_results as usize))
}
