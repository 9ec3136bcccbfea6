//! Ask command handler.
//!
//! Runs one turn of the retrieval loop, optionally inside a saved thread.

use crate::output::{completion_json, print_json, RenderOptions, TurnPrinter};
use crate::threads::{generate_title, Thread, ThreadStore};
use clap::Args;
use ragloop_agent::adapters::build_loop;
use ragloop_core::{config::AppConfig, AppError, AppResult};
use std::path::PathBuf;

/// Ask a question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Continue a saved thread
    #[arg(short, long)]
    pub thread: Option<String>,

    /// Save the exchange as a new thread
    #[arg(long, conflicts_with = "thread")]
    pub save: bool,

    /// Hide the model's reasoning
    #[arg(long)]
    pub no_thoughts: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self.question()?;
        config.validate()?;
        let rag = build_loop(config)?;

        let store = ThreadStore::new(&config.ragloop_dir());
        let mut thread = match self.thread {
            Some(ref id) => Some(store.load(id)?),
            None if self.save => Some(new_thread(config, &question).await?),
            None => None,
        };
        let history = thread.as_ref().map(|t| t.messages.clone()).unwrap_or_default();

        let mut printer = TurnPrinter::terminal(RenderOptions {
            show_thoughts: !self.no_thoughts,
            quiet: self.json,
        });
        let completion = printer.drive(rag.run_turn(question, history)).await?;

        if let Some(ref mut thread) = thread {
            thread.record_turn(&completion);
            store.save(thread)?;
            tracing::info!("Saved turn to thread {}", thread.thread_id);
        }

        if self.json {
            let output = completion_json(
                &completion,
                printer.trace(),
                thread.as_ref().map(|t| t.thread_id.as_str()),
            );
            print_json(&output)?;
        } else if let Some(ref thread) = thread {
            eprintln!("[thread {}]", thread.thread_id);
        }

        Ok(())
    }

    /// The question from the argument or the file.
    fn question(&self) -> AppResult<String> {
        let text = match (&self.question, &self.file) {
            (Some(question), _) => question.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)?,
            (None, None) => return Err(AppError::Validation("No question provided".to_string())),
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Question is empty".to_string()));
        }
        Ok(text.to_string())
    }
}

/// A new thread named after its first message by the classifier model.
pub async fn new_thread(config: &AppConfig, first_message: &str) -> AppResult<Thread> {
    let (provider, model) = config.classifier_target();
    let client = ragloop_llm::client_for(config, &provider)?;
    let name = generate_title(client.as_ref(), &model, &config.workspace, first_message).await;

    tracing::debug!("New thread '{}'", name);
    Ok(Thread::new(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(question: Option<&str>, file: Option<PathBuf>) -> AskCommand {
        AskCommand {
            question: question.map(String::from),
            file,
            thread: None,
            save: false,
            no_thoughts: false,
            json: false,
        }
    }

    #[test]
    fn test_question_from_argument_or_file() {
        assert_eq!(
            ask(Some("  What is RAG?\n"), None).question().unwrap(),
            "What is RAG?"
        );

        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "From a file\n").unwrap();
        assert_eq!(
            ask(None, Some(temp.path().to_path_buf())).question().unwrap(),
            "From a file"
        );
    }

    #[test]
    fn test_missing_or_blank_question() {
        assert!(ask(None, None).question().is_err());
        assert!(ask(Some("   "), None).question().is_err());
    }
}
