//! Generator port backed by a streaming LLM.

use super::retry::RetryPolicy;
use crate::ports::{ChunkStream, GenerationChunk, GenerationTask, Generator, PromptContext};
use crate::state::{Message, Role};
use futures::{future, StreamExt};
use ragloop_core::AppResult;
use ragloop_llm::{ChatMessage, ChunkKind, LlmClient, LlmRequest};
use ragloop_prompt::{build_prompt, load_prompt, PromptDefinition};
use std::path::Path;
use std::sync::Arc;

/// Answers and rewrites questions with a chat model.
pub struct LlmGenerator {
    client: Arc<dyn LlmClient>,
    model: String,
    answer_prompt: PromptDefinition,
    rewrite_prompt: PromptDefinition,
    thinking_budget: Option<u32>,
    retry: RetryPolicy,
}

impl LlmGenerator {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        workspace: &Path,
    ) -> AppResult<Self> {
        Ok(Self {
            client,
            model: model.into(),
            answer_prompt: load_prompt(workspace, ragloop_prompt::GENERATE)?,
            rewrite_prompt: load_prompt(workspace, ragloop_prompt::REWRITE)?,
            thinking_budget: None,
            retry: RetryPolicy::none(),
        })
    }

    /// Ask for extended thinking on answers. Rewrites never think.
    pub fn with_thinking_budget(mut self, budget: Option<u32>) -> Self {
        self.thinking_budget = budget;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn request(&self, context: &PromptContext) -> AppResult<LlmRequest> {
        let definition = match context.task {
            GenerationTask::Answer => &self.answer_prompt,
            GenerationTask::Rewrite => &self.rewrite_prompt,
        };
        let built = build_prompt(definition, context.variables.clone())?;

        let mut request = LlmRequest::new(built.user, self.model.clone())
            .with_streaming()
            .with_messages(chat_history(&context.history));
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        if let (GenerationTask::Answer, Some(budget)) = (context.task, self.thinking_budget) {
            request = request.with_thinking(budget);
        }
        Ok(request)
    }
}

/// Prior user questions and final answers. Thoughts stay out of the prompt.
fn chat_history(history: &[Message]) -> Vec<ChatMessage> {
    history
        .iter()
        .filter_map(|message| match message.role {
            Role::User => Some(ChatMessage::user(message.content.clone())),
            Role::AssistantResponse => Some(ChatMessage::assistant(message.content.clone())),
            Role::AssistantThought => None,
        })
        .collect()
}

#[async_trait::async_trait]
impl Generator for LlmGenerator {
    async fn generate(&self, context: &PromptContext) -> AppResult<ChunkStream> {
        let request = self.request(context)?;
        tracing::debug!(
            "Generating {:?} with {} ({} prior messages)",
            context.task,
            self.model,
            request.messages.len()
        );

        let stream = self
            .retry
            .run("generator", || self.client.stream(&request))
            .await?;

        let chunks = stream.filter_map(|item| {
            future::ready(match item {
                Ok(chunk) if chunk.content.is_empty() => None,
                Ok(chunk) => Some(Ok(match chunk.kind {
                    ChunkKind::Thinking => GenerationChunk::Thought(chunk.content),
                    ChunkKind::Text => GenerationChunk::Answer(chunk.content),
                })),
                Err(e) => Some(Err(e)),
            })
        });

        Ok(Box::pin(chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use ragloop_core::AppError;
    use ragloop_llm::{LlmResponse, LlmStream, LlmStreamChunk};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct StreamingClient {
        requests: Mutex<Vec<LlmRequest>>,
    }

    #[async_trait::async_trait]
    impl LlmClient for StreamingClient {
        fn provider_name(&self) -> &str {
            "streaming"
        }

        async fn complete(&self, _request: &LlmRequest) -> AppResult<LlmResponse> {
            Err(AppError::Llm("not supported".to_string()))
        }

        async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
            self.requests.lock().unwrap().push(request.clone());
            let model = request.model.clone();
            Ok(Box::pin(stream::iter(vec![
                Ok(LlmStreamChunk::thinking("Looking at the documents.", &model)),
                Ok(LlmStreamChunk::text("Prompt engineering ", &model)),
                Ok(LlmStreamChunk::text("is a discipline.", &model)),
                Ok(LlmStreamChunk::finished(&model, None)),
            ])))
        }
    }

    fn generator(temp: &TempDir, client: Arc<StreamingClient>) -> LlmGenerator {
        LlmGenerator::new(client, "claude-3-7-sonnet-latest", temp.path()).unwrap()
    }

    #[tokio::test]
    async fn test_answer_stream_maps_chunk_kinds() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(StreamingClient::default());
        let generator = generator(&temp, client.clone()).with_thinking_budget(Some(1024));

        let context = PromptContext::new(GenerationTask::Answer)
            .with_variable("question", "What is prompt engineering?")
            .with_variable("documents", "doc one\n\n---\n\ndoc two");
        let chunks: Vec<GenerationChunk> = generator
            .generate(&context)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert_eq!(
            chunks,
            vec![
                GenerationChunk::Thought("Looking at the documents.".to_string()),
                GenerationChunk::Answer("Prompt engineering ".to_string()),
                GenerationChunk::Answer("is a discipline.".to_string()),
            ]
        );

        let requests = client.requests.lock().unwrap();
        assert!(requests[0].stream);
        assert_eq!(requests[0].thinking_budget, Some(1024));
        assert_eq!(requests[0].prompt, "What is prompt engineering?");
        assert!(requests[0].system.as_deref().unwrap().contains("doc two"));
    }

    #[tokio::test]
    async fn test_rewrite_skips_thinking() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(StreamingClient::default());
        let generator = generator(&temp, client.clone()).with_thinking_budget(Some(1024));

        let context =
            PromptContext::new(GenerationTask::Rewrite).with_variable("question", "agent memory?");
        generator.generate(&context).await.unwrap();

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].thinking_budget, None);
        assert!(requests[0].prompt.contains("agent memory?"));
    }

    #[test]
    fn test_chat_history_drops_thoughts() {
        let history = vec![
            Message::user("first question"),
            Message::thought("reasoning"),
            Message::response("first answer"),
        ];

        assert_eq!(
            chat_history(&history),
            vec![
                ChatMessage::user("first question"),
                ChatMessage::assistant("first answer"),
            ]
        );
    }
}
