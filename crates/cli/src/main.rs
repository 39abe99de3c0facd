//! Toolwright CLI: the main entry point.
//!
//! Commands:
//! - `onboard`: Write the default config
//! - `agent`: Interactive chat or single-message mode
//! - `gateway`: Start the HTTP API server
//! - `tools`: List registered tools and their schemas
//! - `session`: Inspect, export, and import sessions

use clap::{Parser, Subcommand};

mod commands;

use commands::session::SessionAction;

#[derive(Parser)]
#[command(
    name = "toolwright",
    about = "Toolwright: a tool-calling AI agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Onboard,

    /// Chat with the agent
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing session (a new id is generated otherwise)
        #[arg(short, long)]
        session: Option<String>,

        /// Approve gated tool calls without prompting
        #[arg(long)]
        approve: bool,
    },

    /// Start the HTTP gateway server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List the tools offered to the model
    Tools {
        /// Print the raw tool definitions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect, checkpoint, and restore sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr so answers stay clean on stdout
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Agent {
            message,
            session,
            approve,
        } => commands::agent::run(message, session, approve).await?,
        Commands::Gateway { port } => commands::gateway::run(port).await?,
        Commands::Tools { json } => commands::tools::run(json).await?,
        Commands::Session { action } => commands::session::run(action).await?,
    }

    Ok(())
}
