//! lokal CLI — the main entry point.
//!
//! Commands:
//! - `onboard`        — Write a default config and create the workspace
//! - `chat`           — Interactive chat or single-message mode
//! - `conversations`  — List, show, rename or delete stored conversations
//! - `tools`          — List the built-in tools
//! - `doctor`         — Diagnose config, model backend and store

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "lokal",
    about = "lokal — a local conversational agent with tool use",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and workspace
    Onboard,

    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Mode to run in (chat, coder, analyst, agent, ...)
        #[arg(long)]
        mode: Option<String>,

        /// Continue a stored conversation
        #[arg(short, long)]
        conversation: Option<String>,
    },

    /// Manage stored conversations
    Conversations {
        #[command(subcommand)]
        action: ConversationAction,
    },

    /// List available tools
    Tools,

    /// Diagnose system health
    Doctor,
}

#[derive(Subcommand)]
enum ConversationAction {
    /// List conversations, newest first
    List,

    /// Print a conversation's most recent turns
    Show {
        id: String,

        /// Number of turns to print
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Change a conversation's title
    Rename { id: String, title: String },

    /// Delete a conversation and its turns
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat {
            message,
            mode,
            conversation,
        } => commands::chat::run(message, mode, conversation).await?,
        Commands::Conversations { action } => match action {
            ConversationAction::List => commands::conversations::list().await?,
            ConversationAction::Show { id, limit } => commands::conversations::show(&id, limit).await?,
            ConversationAction::Rename { id, title } => commands::conversations::rename(&id, &title).await?,
            ConversationAction::Delete { id } => commands::conversations::delete(&id).await?,
        },
        Commands::Tools => commands::tools::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
