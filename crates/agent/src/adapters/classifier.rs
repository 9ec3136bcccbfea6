//! Classifier port backed by an LLM.

use super::retry::RetryPolicy;
use crate::ports::{Classifier, TaskKind};
use ragloop_core::AppResult;
use ragloop_llm::{LlmClient, LlmRequest};
use ragloop_prompt::{build_prompt, load_prompt, PromptDefinition};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Short answers only; labels are a word or a tiny JSON object.
const CLASSIFIER_MAX_TOKENS: u32 = 64;

/// Routes and grades by prompting a (usually small) model.
pub struct LlmClassifier {
    client: Arc<dyn LlmClient>,
    model: String,
    prompts: HashMap<TaskKind, PromptDefinition>,
    topics: Vec<String>,
    retry: RetryPolicy,
}

impl LlmClassifier {
    /// Load the routing and grading prompts for `workspace`.
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        workspace: &Path,
        topics: Vec<String>,
    ) -> AppResult<Self> {
        let mut prompts = HashMap::new();
        for task in [
            TaskKind::Route,
            TaskKind::GradeDocument,
            TaskKind::GradeGroundedness,
            TaskKind::GradeUsefulness,
        ] {
            prompts.insert(task, load_prompt(workspace, prompt_id(task))?);
        }

        Ok(Self {
            client,
            model: model.into(),
            prompts,
            topics,
            retry: RetryPolicy::none(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn prompt_id(task: TaskKind) -> &'static str {
    match task {
        TaskKind::Route => ragloop_prompt::ROUTE,
        TaskKind::GradeDocument => ragloop_prompt::GRADE_DOCUMENT,
        TaskKind::GradeGroundedness => ragloop_prompt::GRADE_GROUNDEDNESS,
        TaskKind::GradeUsefulness => ragloop_prompt::GRADE_USEFULNESS,
    }
}

fn label_key(task: TaskKind) -> &'static str {
    match task {
        TaskKind::Route => "datasource",
        _ => "binary_score",
    }
}

/// Pull the label out of a model reply.
///
/// Prefers the task's key in the first JSON object of the reply, then any
/// lone string value, then the first non-empty line of bare text.
pub fn extract_label(task: TaskKind, reply: &str) -> String {
    let json = reply
        .find('{')
        .zip(reply.rfind('}'))
        .filter(|(start, end)| start < end)
        .and_then(|(start, end)| {
            serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(
                &reply[start..=end],
            )
            .ok()
        });

    if let Some(object) = json {
        if let Some(label) = object.get(label_key(task)).and_then(|v| v.as_str()) {
            return label.trim().to_string();
        }
        let strings: Vec<&str> = object.values().filter_map(|v| v.as_str()).collect();
        if let [only] = strings.as_slice() {
            return only.trim().to_string();
        }
    }

    reply
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string()
}

#[async_trait::async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        task: TaskKind,
        inputs: &HashMap<String, String>,
    ) -> AppResult<String> {
        let definition = &self.prompts[&task];

        let mut variables = inputs.clone();
        variables
            .entry("topics".to_string())
            .or_insert_with(|| self.topics.join(", "));

        let built = build_prompt(definition, variables)?;

        let mut request = LlmRequest::new(built.user, self.model.clone())
            .with_temperature(0.0)
            .with_max_tokens(CLASSIFIER_MAX_TOKENS);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        let response = self
            .retry
            .run("classifier", || self.client.complete(&request))
            .await?;

        let label = extract_label(task, &response.content);
        tracing::debug!("Classifier {} -> '{}'", task, label);
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragloop_core::{AppError, ErrorKind};
    use ragloop_llm::{LlmResponse, LlmStream, LlmUsage};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct CannedClient {
        replies: Mutex<Vec<AppResult<String>>>,
        requests: Mutex<Vec<LlmRequest>>,
    }

    impl CannedClient {
        fn new(replies: Vec<AppResult<String>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for CannedClient {
        fn provider_name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            self.requests.lock().unwrap().push(request.clone());
            let content = self.replies.lock().unwrap().remove(0)?;
            Ok(LlmResponse {
                content,
                thinking: None,
                model: request.model.clone(),
                usage: LlmUsage::default(),
                done: true,
            })
        }

        async fn stream(&self, _request: &LlmRequest) -> AppResult<LlmStream> {
            Err(AppError::Llm("not supported".to_string()))
        }
    }

    #[test]
    fn test_extract_label() {
        assert_eq!(
            extract_label(TaskKind::Route, r#"{"datasource": "web_search"}"#),
            "web_search"
        );
        assert_eq!(
            extract_label(
                TaskKind::GradeDocument,
                "Sure! ```json\n{\"binary_score\": \"yes\"}\n```"
            ),
            "yes"
        );
        assert_eq!(
            extract_label(TaskKind::GradeUsefulness, r#"{"score": "no"}"#),
            "no"
        );
        assert_eq!(extract_label(TaskKind::Route, "\n vectorstore \n"), "vectorstore");
        assert_eq!(extract_label(TaskKind::Route, ""), "");
    }

    #[tokio::test]
    async fn test_classify_renders_prompt() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(CannedClient::new(vec![Ok(
            r#"{"datasource": "vectorstore"}"#.to_string()
        )]));
        let classifier = LlmClassifier::new(
            client.clone(),
            "llama3.2",
            temp.path(),
            vec!["agents".to_string(), "prompt engineering".to_string()],
        )
        .unwrap();

        let inputs = HashMap::from([(
            "question".to_string(),
            "What is prompt engineering?".to_string(),
        )]);
        let label = classifier.classify(TaskKind::Route, &inputs).await.unwrap();
        assert_eq!(label, "vectorstore");

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].prompt, "What is prompt engineering?");
        assert_eq!(requests[0].temperature, Some(0.0));
        assert!(requests[0]
            .system
            .as_deref()
            .unwrap()
            .contains("agents, prompt engineering"));
    }

    #[tokio::test]
    async fn test_classify_retries_transient_errors() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(CannedClient::new(vec![
            Err(AppError::Llm("connection reset".to_string())),
            Ok("no".to_string()),
        ]));
        let classifier = LlmClassifier::new(client.clone(), "m", temp.path(), vec![])
            .unwrap()
            .with_retry(RetryPolicy {
                retries: 1,
                base_delay: std::time::Duration::from_millis(1),
            });

        let inputs = HashMap::from([
            ("question".to_string(), "q".to_string()),
            ("document".to_string(), "d".to_string()),
        ]);
        let label = classifier
            .classify(TaskKind::GradeDocument, &inputs)
            .await
            .unwrap();
        assert_eq!(label, "no");
        assert_eq!(client.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_classify_without_retries_fails_upstream() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(CannedClient::new(vec![Err(AppError::Llm(
            "refused".to_string(),
        ))]));
        let classifier = LlmClassifier::new(client, "m", temp.path(), vec![]).unwrap();

        let err = classifier
            .classify(TaskKind::GradeUsefulness, &HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    }
}
