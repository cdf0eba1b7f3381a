//! Agri Advisor CLI
//!
//! Main entry point for the `agri` command-line tool.
//! Answers farmers' questions from curated Golden and PoPs collections.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, CollectionsCommand, IngestCommand};
use agri_core::config::{AppConfig, STATE_DIR};
use agri_core::{logging, AppResult};
use std::path::PathBuf;

/// Agri Advisor CLI - agricultural question answering over curated collections
#[derive(Parser, Debug)]
#[command(name = "agri")]
#[command(about = "Agricultural advisory answers from curated collections", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "AGRI_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "AGRI_CONFIG")]
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

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Completion provider (ollama, openai)
    #[arg(short, long, global = true, env = "AGRI_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "AGRI_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single question
    Ask(AskCommand),

    /// Interactive multi-turn session
    Chat(ChatCommand),

    /// Load records or documents into a collection
    Ingest(IngestCommand),

    /// Show collection sizes
    Collections(CollectionsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from environment and the default workspace
    let mut config = AppConfig::load()?;

    // An explicit config file, or the config of an explicit workspace
    let config_file = cli.config.clone().or_else(|| {
        cli.workspace
            .as_ref()
            .map(|ws| ws.join(STATE_DIR).join("config.yaml"))
            .filter(|path| path.exists())
    });
    if let Some(path) = config_file {
        config = config.merge_yaml(&path)?;
    }

    // Apply CLI overrides
    let mut config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );
    if cli.log_json {
        config.log_json = true;
    }

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_json)?;

    tracing::info!("Agri Advisor CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.ensure_state_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Chat(_) => "chat",
        Commands::Ingest(_) => "ingest",
        Commands::Collections(_) => "collections",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Chat(cmd) => cmd.execute(&config).await,
        Commands::Ingest(cmd) => cmd.execute(&config).await,
        Commands::Collections(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
