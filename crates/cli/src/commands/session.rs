//! `toolwright session`: Inspect, checkpoint, and restore sessions.

use std::path::PathBuf;

use toolwright_core::message::Message;
use toolwright_core::session::{Session, SessionId, Snapshot};
use toolwright_store::SessionStore;

use super::{load_config, open_store};

/// What to do with the session store.
#[derive(clap::Subcommand)]
pub enum SessionAction {
    /// List stored session ids
    List,

    /// Print a session's history
    Show {
        /// Session id
        id: String,
    },

    /// Write a checkpoint of a session as JSON
    Export {
        /// Session id
        id: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Restore a session from a checkpoint file
    Import {
        /// Session id to restore into (replaces any existing history)
        id: String,

        /// Checkpoint file produced by `export`
        file: PathBuf,
    },
}

pub async fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = open_store(&config).await?;
    execute(&store, action).await
}

async fn execute(
    store: &SessionStore,
    action: SessionAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SessionAction::List => {
            let ids = store.list().await?;
            if ids.is_empty() {
                println!("No sessions in the {} store.", store.backend_name());
            }
            for id in ids {
                println!("{id}");
            }
        }
        SessionAction::Show { id } => {
            let id = SessionId::from(id);
            let session = store
                .find(&id)
                .await?
                .ok_or_else(|| format!("Session {id} not found"))?;
            print!("{}", render_session(&session));
        }
        SessionAction::Export { id, output } => {
            let snapshot = store.checkpoint(&SessionId::from(id)).await?;
            let json = serde_json::to_string_pretty(&snapshot)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, json).await?;
                    eprintln!("Wrote {} messages to {}", snapshot.len(), path.display());
                }
                None => println!("{json}"),
            }
        }
        SessionAction::Import { id, file } => {
            let raw = tokio::fs::read_to_string(&file).await?;
            let snapshot: Snapshot = serde_json::from_str(&raw)?;
            let id = SessionId::from(id);
            let _guard = store.lock(&id).await;
            let session = store.restore(&id, snapshot).await?;
            println!("Restored {} messages into session {id}", session.messages.len());
        }
    }
    Ok(())
}

/// Human-readable transcript, one block per message.
pub fn render_session(session: &Session) -> String {
    let mut out = format!(
        "Session {} ({} messages, updated {})\n",
        session.id,
        session.messages.len(),
        session.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if session.awaiting_approval {
        out.push_str("Awaiting approval for pending tool calls\n");
    }
    out.push('\n');
    for message in &session.messages {
        out.push_str(&render_message(message));
        out.push('\n');
    }
    out
}

fn render_message(message: &Message) -> String {
    match message {
        Message::Tool {
            call_id,
            tool_name,
            success,
            content,
        } => {
            let status = if *success { "ok" } else { "failed" };
            format!("[tool {tool_name} #{call_id} {status}]\n{content}\n")
        }
        other => match other.text() {
            Some(text) => format!("[{}]\n{text}\n", other.role()),
            None => {
                let mut out = format!("[{}] requested tools\n", other.role());
                for call in other.requested_calls() {
                    out.push_str(&format!("  - {} #{} {}\n", call.name, call.id, call.arguments));
                }
                out
            }
        },
    }
}
