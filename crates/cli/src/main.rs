//! ragloop CLI
//!
//! Main entry point for the ragloop command-line tool.
//! Answers questions through an adaptive retrieval loop over a local
//! knowledge base and live web search.

mod commands;
mod output;
mod threads;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, KnowledgeCommand, ThreadsCommand};
use ragloop_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;
use tracing::Instrument;

/// ragloop - adaptive retrieval-augmented question answering
#[derive(Parser, Debug)]
#[command(name = "ragloop")]
#[command(about = "Adaptive retrieval-augmented question answering", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RAGLOOP_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RAGLOOP_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider for generation (ollama, claude)
    #[arg(short, long, global = true, env = "RAGLOOP_PROVIDER")]
    provider: Option<String>,

    /// Model identifier for generation
    #[arg(short, long, global = true, env = "RAGLOOP_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single question
    Ask(AskCommand),

    /// Interactive chat saved as a thread
    Chat(ChatCommand),

    /// Knowledge base management (local RAG)
    Knowledge(KnowledgeCommand),

    /// Saved conversation threads
    Threads(ThreadsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration; path flags decide which config file is read
    let config = AppConfig::load_with(cli.workspace, cli.config)?;

    // Apply CLI overrides
    let config = config.with_overrides(
        None,
        None,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("ragloop starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    // Ensure .ragloop directory exists
    config.ensure_ragloop_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Chat(_) => "chat",
        Commands::Knowledge(_) => "knowledge",
        Commands::Threads(_) => "threads",
    };
    let span = tracing::info_span!("command", name = command_name);

    let result = async {
        match cli.command {
            Commands::Ask(cmd) => cmd.execute(&config).await,
            Commands::Chat(cmd) => cmd.execute(&config).await,
            Commands::Knowledge(cmd) => cmd.execute(&config).await,
            Commands::Threads(cmd) => cmd.execute(&config),
        }
    }
    .instrument(span)
    .await;

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!(kind = %e.kind(), "Command failed: {}", e),
    }

    result
}
