//! Conversation threads persisted as JSON files.
//!
//! Each thread lives in `.ragloop/threads/<thread_id>.json`. Saves replace
//! the whole file, so concurrent writers resolve as last-writer-wins.

use chrono::{DateTime, Utc};
use ragloop_agent::{Message, TurnCompletion};
use ragloop_core::{AppError, AppResult};
use ragloop_llm::LlmClient;
use ragloop_prompt::{build_prompt, load_prompt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Name given to a thread when no title can be generated.
pub const DEFAULT_THREAD_NAME: &str = "General Chat";

const MAX_TITLE_CHARS: usize = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub thread_id: String,
    pub thread_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Thread {
    pub fn new(thread_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id: uuid::Uuid::new_v4().simple().to_string(),
            thread_name: thread_name.into(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// Replace the messages with the history returned by a completed turn.
    ///
    /// The turn was started from this thread's messages, so its history is
    /// the old messages plus the new user message, thought and response.
    pub fn record_turn(&mut self, completion: &TurnCompletion) {
        self.messages = completion.history.clone();
        self.updated_at = Utc::now();
    }
}

/// Directory of thread files.
#[derive(Debug, Clone)]
pub struct ThreadStore {
    dir: PathBuf,
}

impl ThreadStore {
    /// Store under `<ragloop_dir>/threads`.
    pub fn new(ragloop_dir: &Path) -> Self {
        Self {
            dir: ragloop_dir.join("threads"),
        }
    }

    fn path(&self, thread_id: &str) -> AppResult<PathBuf> {
        let valid = !thread_id.is_empty()
            && thread_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AppError::Config(format!(
                "Invalid thread id: '{}'",
                thread_id
            )));
        }
        Ok(self.dir.join(format!("{}.json", thread_id)))
    }

    pub fn load(&self, thread_id: &str) -> AppResult<Thread> {
        let path = self.path(thread_id)?;
        if !path.exists() {
            return Err(AppError::Other(format!(
                "Thread '{}' not found. Run 'ragloop threads list' to see saved threads.",
                thread_id
            )));
        }

        let contents = std::fs::read_to_string(&path)?;
        serde_json::from_str(&contents).map_err(|e| {
            AppError::Serialization(format!("Failed to parse thread {:?}: {}", path, e))
        })
    }

    pub fn save(&self, thread: &Thread) -> AppResult<()> {
        let path = self.path(&thread.thread_id)?;
        std::fs::create_dir_all(&self.dir)?;

        let json = serde_json::to_string_pretty(thread)
            .map_err(|e| AppError::Serialization(e.to_string()))?;

        // write-then-rename so readers never see a partial file
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;

        tracing::debug!("Saved thread {} ({} messages)", thread.thread_id, thread.messages.len());
        Ok(())
    }

    /// All threads, most recently updated first. Unreadable files are skipped.
    pub fn list(&self) -> AppResult<Vec<Thread>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.dir)?;

        let mut threads = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load(id) {
                Ok(thread) => threads.push(thread),
                Err(e) => tracing::warn!("Skipping thread file {:?}: {}", path, e),
            }
        }

        threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(threads)
    }
}

/// First line of a model-suggested title, without quotes or trailing dots.
pub fn clean_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .trim_start_matches(|c: char| c == '#' || c.is_whitespace())
        .trim_start_matches("Title:")
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*' || c == '.')
        .trim();
    if line.is_empty() {
        return None;
    }
    Some(line.chars().take(MAX_TITLE_CHARS).collect())
}

/// Summarise `first_message` into a short thread name.
///
/// Falls back to [`DEFAULT_THREAD_NAME`] if the model call fails.
pub async fn generate_title(
    client: &dyn LlmClient,
    model: &str,
    workspace: &Path,
    first_message: &str,
) -> String {
    let attempt = async {
        let definition = load_prompt(workspace, ragloop_prompt::THREAD_TITLE)?;
        let variables = HashMap::from([("prompt".to_string(), first_message.to_string())]);
        let built = build_prompt(&definition, variables)?;

        let mut request = ragloop_llm::LlmRequest::new(built.user, model)
            .with_temperature(0.2)
            .with_max_tokens(24);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        client.complete(&request).await.map(|r| r.content)
    };

    match attempt.await {
        Ok(raw) => clean_title(&raw).unwrap_or_else(|| DEFAULT_THREAD_NAME.to_string()),
        Err(e) => {
            tracing::warn!("Thread title generation failed: {}", e);
            DEFAULT_THREAD_NAME.to_string()
        }
    }
}
