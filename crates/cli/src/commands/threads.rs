//! Threads command handler.

use crate::output::print_json;
use crate::threads::ThreadStore;
use clap::{Args, Subcommand};
use ragloop_agent::Role;
use ragloop_core::{config::AppConfig, AppError, AppResult};

/// Saved conversation threads
#[derive(Args, Debug)]
pub struct ThreadsCommand {
    #[command(subcommand)]
    pub action: ThreadsAction,
}

#[derive(Subcommand, Debug)]
pub enum ThreadsAction {
    /// List saved threads, most recent first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the messages of a thread
    Show {
        /// Thread id
        id: String,

        /// Include the model's reasoning
        #[arg(long)]
        thoughts: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl ThreadsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let store = ThreadStore::new(&config.ragloop_dir());

        match self.action {
            ThreadsAction::List { json } => {
                let threads = store.list()?;
                if json {
                    let output: Vec<_> = threads
                        .iter()
                        .map(|t| {
                            serde_json::json!({
                                "threadId": t.thread_id,
                                "threadName": t.thread_name,
                                "messages": t.messages.len(),
                                "updatedAt": t.updated_at,
                            })
                        })
                        .collect();
                    print_json(&serde_json::Value::Array(output))?;
                } else if threads.is_empty() {
                    println!("No saved threads.");
                } else {
                    for t in &threads {
                        println!(
                            "{}  {}  {} ({} messages)",
                            t.thread_id,
                            t.updated_at.format("%Y-%m-%d %H:%M"),
                            t.thread_name,
                            t.messages.len()
                        );
                    }
                }
            }

            ThreadsAction::Show {
                ref id,
                thoughts,
                json,
            } => {
                let thread = store.load(id)?;
                if json {
                    let output = serde_json::to_value(&thread)
                        .map_err(|e| AppError::Serialization(e.to_string()))?;
                    return print_json(&output);
                }

                println!("# {}", thread.thread_name);
                for message in &thread.messages {
                    if message.role == Role::AssistantThought && !thoughts {
                        continue;
                    }
                    println!();
                    println!("[{}]", message.role.as_str());
                    println!("{}", message.content);
                }
            }
        }

        Ok(())
    }
}
