//! Chat command handler.
//!
//! Interactive conversation; every completed turn is saved to the thread.

use super::ask::new_thread;
use crate::output::{RenderOptions, TurnPrinter};
use crate::threads::{Thread, ThreadStore};
use clap::Args;
use ragloop_agent::adapters::build_loop;
use ragloop_core::{config::AppConfig, AppResult};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive chat backed by a saved thread
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Resume a saved thread
    #[arg(short, long)]
    pub thread: Option<String>,

    /// Hide the model's reasoning
    #[arg(long)]
    pub no_thoughts: bool,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        config.validate()?;
        let rag = build_loop(config)?;
        let store = ThreadStore::new(&config.ragloop_dir());

        let mut thread: Option<Thread> = match self.thread {
            Some(ref id) => {
                let thread = store.load(id)?;
                eprintln!(
                    "Resuming '{}' ({} messages)",
                    thread.thread_name,
                    thread.messages.len()
                );
                Some(thread)
            }
            None => None,
        };
        eprintln!("Type /exit to quit.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            eprint!("> ");
            std::io::stderr().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            if matches!(question, "/exit" | "/quit") {
                break;
            }

            let mut current = match thread.take() {
                Some(thread) => thread,
                None => new_thread(config, question).await?,
            };

            let mut printer = TurnPrinter::terminal(RenderOptions {
                show_thoughts: !self.no_thoughts,
                quiet: false,
            });
            let result = printer
                .drive(rag.run_turn(question, current.messages.clone()))
                .await;

            match result {
                Ok(completion) => {
                    current.record_turn(&completion);
                    store.save(&current)?;
                }
                // a failed turn leaves the thread untouched
                Err(e) => {
                    tracing::warn!(kind = %e.kind(), "turn failed: {}", e);
                    eprintln!("Error: {}", e);
                }
            }
            thread = Some(current);
        }

        if let Some(thread) = thread.filter(|t| !t.messages.is_empty()) {
            eprintln!("Saved as thread {} ('{}')", thread.thread_id, thread.thread_name);
        }
        Ok(())
    }
}
