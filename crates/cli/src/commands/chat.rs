//! `lokal chat` — Interactive or single-message chat mode.

use std::io::Write;
use std::sync::Arc;

use lokal_agent::{
    AgentLoop, AgentStreamEvent, ContextManager, ConversationSession, ProviderSummarizer, TurnOutcome, TurnStatus,
};
use lokal_config::{AppConfig, LiveConfig};
use lokal_core::event::EventBus;
use lokal_core::message::ConversationId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{CliResult, load_config, open_store};

const TITLE_CHARS: usize = 48;

pub async fn run(message: Option<String>, mode: Option<String>, conversation: Option<String>) -> CliResult {
    let config = load_config()?;
    let live = LiveConfig::new(config.clone()).with_source(AppConfig::config_path());

    let provider = lokal_providers::build_from_config(&config.model);
    let tools = Arc::new(lokal_tools::default_registry(&config.tools));
    let events = EventBus::default();
    let store = open_store(&config).await?;

    let context = ContextManager::from_config(&config.context)
        .with_summarizer(Arc::new(ProviderSummarizer::new(provider.clone(), config.model.model.clone())))
        .with_event_bus(events.clone());

    let mut session = match conversation {
        Some(id) => {
            let mut session = ConversationSession::resume(
                store,
                &ConversationId::from(id.as_str()),
                context,
                config.agent.history_window,
                Some(events.clone()),
            )
            .await
            .map_err(|e| format!("Cannot open conversation {id}: {e}"))?;
            if let Some(mode) = mode.filter(|m| m != session.mode()) {
                session.set_mode(mode);
            }
            session
        }
        None => {
            let mode = mode.unwrap_or_else(|| config.agent.default_mode.clone());
            let title = message.as_deref().map(title_from).unwrap_or_else(|| "New conversation".into());
            ConversationSession::start(store, &title, &mode, context, Some(events.clone())).await?
        }
    };

    if !config.modes.contains_key(session.mode()) {
        tracing::warn!(mode = %session.mode(), "Unknown mode; running without tools");
    }

    let agent = AgentLoop::new(provider, tools, live.clone()).with_event_bus(events);

    if let Some(msg) = message {
        // Single message mode
        let (outcome, streamed) = run_one(&agent, &mut session, &msg).await;
        print_outcome(&outcome, streamed);
    } else {
        interactive(&agent, &live, &mut session).await?;
    }

    session.close().await;
    Ok(())
}

async fn interactive(agent: &AgentLoop, live: &LiveConfig, session: &mut ConversationSession) -> CliResult {
    let config = live.snapshot();
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║            lokal — Interactive Mode          ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:         {}", config.model.model);
    println!("  Backend:       {}", config.model.base_url);
    println!("  Mode:          {}", session.mode());
    println!("  Conversation:  {}", session.id());
    println!("  Tools:         {}", agent.tools().names().join(", "));
    println!();
    println!("  Type your message and press Enter. Ctrl+C cancels a running turn.");
    println!("  Commands: /mode <name>, /reload, exit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }
        if let Some(mode) = line.strip_prefix("/mode") {
            let mode = mode.trim();
            if mode.is_empty() {
                println!("  Current mode: {}", session.mode());
            } else {
                session.set_mode(mode);
                println!("  Switched to mode '{mode}'");
            }
            continue;
        }
        if line == "/reload" {
            match live.reload() {
                Ok(()) => println!("  Configuration reloaded"),
                Err(e) => eprintln!("  [Error] {e}"),
            }
            continue;
        }

        let (outcome, streamed) = run_one(agent, session, line).await;
        print_outcome(&outcome, streamed);
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Run one turn, rendering progress and cancelling on Ctrl+C.
///
/// Also reports whether the reply was already streamed to stdout.
async fn run_one(agent: &AgentLoop, session: &mut ConversationSession, message: &str) -> (TurnOutcome, bool) {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let (tx, rx) = mpsc::channel(64);
    let printer = tokio::spawn(render_events(rx));
    let outcome = agent.run_turn_with(session, message, Some(&tx), &cancel).await;
    drop(tx);
    watcher.abort();

    let streamed = printer.await.unwrap_or(false);
    if streamed {
        println!();
        println!();
    }
    (outcome, streamed)
}

/// Print stream events as they arrive. Returns whether reply text was
/// already streamed to stdout.
async fn render_events(mut rx: mpsc::Receiver<AgentStreamEvent>) -> bool {
    let mut streamed = false;
    while let Some(event) = rx.recv().await {
        match event {
            AgentStreamEvent::Chunk { content } => {
                if !streamed {
                    print!("\n  Assistant > ");
                    streamed = true;
                }
                print!("{content}");
                let _ = std::io::stdout().flush();
            }
            AgentStreamEvent::Thought { content } => {
                eprintln!("  💭 {}", first_line(&content, 120));
            }
            AgentStreamEvent::ToolCall { step, name, input } => {
                eprintln!("  🔧 [{step}] {name} {input}");
            }
            AgentStreamEvent::ToolResult {
                name,
                output,
                success,
                artifact,
                ..
            } => {
                let icon = if success { "✅" } else { "❌" };
                eprintln!("  {icon} {name}: {}", first_line(&output, 120));
                if let Some(path) = artifact {
                    eprintln!("  🖼  {path}");
                }
            }
            AgentStreamEvent::Error { message } => eprintln!("  [Error] {message}"),
            AgentStreamEvent::Done { .. } => {}
        }
    }
    streamed
}

fn print_outcome(outcome: &TurnOutcome, streamed: bool) {
    if !streamed || outcome.status != TurnStatus::Final {
        println!();
        for line in outcome.reply.lines() {
            println!("  Assistant > {line}");
        }
        println!();
    }
    for path in &outcome.artifacts {
        println!("  Artifact: {path}");
    }
}

fn first_line(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    match line.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}

/// Conversation title from the first message.
fn title_from(message: &str) -> String {
    let message = message.split_whitespace().collect::<Vec<_>>().join(" ");
    match message.char_indices().nth(TITLE_CHARS) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message,
    }
}
