//! `toolwright agent`: Interactive or single-message chat mode.

use std::io::Write;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;
use toolwright_agent::{AgentLoop, Approval, ChunkObserver, TurnOutcome};
use toolwright_core::event::DomainEvent;
use toolwright_core::session::SessionId;

use super::{build_agent, load_config};

type Input = Lines<BufReader<Stdin>>;

pub async fn run(
    message: Option<String>,
    session: Option<String>,
    auto_approve: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    if !config.has_api_key() && config.provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    TOOLWRIGHT_API_KEY=sk-...      (generic)");
        eprintln!("    OPENAI_API_KEY=sk-...          (for OpenAI direct)");
        eprintln!("    OPENROUTER_API_KEY=sk-or-...   (for OpenRouter)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", toolwright_config::AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    // Streamed text is echoed live and remembered so the final answer is not
    // printed twice.
    let streamed = Arc::new(Mutex::new(String::new()));
    let observer: Option<ChunkObserver> = config.streaming.then(|| {
        let streamed = Arc::clone(&streamed);
        Arc::new(move |chunk: &str| {
            print!("{chunk}");
            let _ = std::io::stdout().flush();
            if let Ok(mut buf) = streamed.lock() {
                buf.push_str(chunk);
            }
        }) as ChunkObserver
    });

    let agent = build_agent(&config, observer).await?;
    let session_id = session.map(SessionId::from).unwrap_or_default();
    spawn_tool_printer(&agent);

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    if let Some(msg) = message {
        // Single message mode
        let outcome = agent.run_turn(&session_id, msg).await?;
        let answer = settle(&agent, &session_id, outcome, auto_approve, &mut input).await?;
        print_answer(&answer, &streamed, false);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Toolwright Agent (interactive)");
    println!();
    println!("  Provider:  {}", config.provider);
    println!("  Model:     {}", config.model);
    println!("  Tools:     {}", agent.tools().names().join(", "));
    println!("  Session:   {session_id}");
    println!("  Store:     {}", agent.store().backend_name());
    if agent.requires_approval() {
        let mode = if auto_approve { "auto-approve" } else { "ask" };
        println!("  Approval:  {mode}");
    }
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = input.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let result = match agent.run_turn(&session_id, line).await {
            Ok(outcome) => settle(&agent, &session_id, outcome, auto_approve, &mut input).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(answer) => print_answer(&answer, &streamed, true),
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Drive a turn through any approval gates until it yields an answer.
async fn settle(
    agent: &AgentLoop,
    session_id: &SessionId,
    mut outcome: TurnOutcome,
    auto_approve: bool,
    input: &mut Input,
) -> Result<String, Box<dyn std::error::Error>> {
    loop {
        match outcome {
            TurnOutcome::Completed { answer } => return Ok(answer),
            TurnOutcome::AwaitingApproval { pending } => {
                println!();
                println!("  The agent wants to run:");
                for call in &pending {
                    println!("    - {} {}", call.name, call.arguments);
                }

                let approved = if auto_approve {
                    println!("  (auto-approved)");
                    true
                } else {
                    print!("  Allow? [y/N] ");
                    std::io::stdout().flush()?;
                    let reply = input.next_line().await?.unwrap_or_default();
                    matches!(reply.trim().to_lowercase().as_str(), "y" | "yes")
                };

                let decision = if approved {
                    Approval::Approve
                } else {
                    Approval::Reject {
                        reason: "declined at the prompt".into(),
                    }
                };
                outcome = agent.resolve_approval(session_id, decision).await?;
            }
        }
    }
}

fn print_answer(answer: &str, streamed: &Mutex<String>, framed: bool) {
    let echoed = streamed
        .lock()
        .map(|mut buf| std::mem::take(&mut *buf))
        .unwrap_or_default();

    if !echoed.is_empty() && echoed.ends_with(answer) {
        println!();
    } else if framed {
        println!();
        for line in answer.lines() {
            println!("  Assistant > {line}");
        }
    } else {
        println!("{answer}");
    }
    if framed {
        println!();
    }
}

/// Print one line per tool call to stderr as the loop reports them.
fn spawn_tool_printer(agent: &AgentLoop) {
    let mut events = agent.events().subscribe();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            if let DomainEvent::ToolExecuted {
                tool_name,
                success,
                duration_ms,
                ..
            } = event.as_ref()
            {
                let status = if *success { "ok" } else { "failed" };
                eprintln!("  [tool] {tool_name} {status} ({duration_ms} ms)");
            }
        }
    });
}
