//! `lokal conversations` — Inspect and manage stored conversations.

use lokal_core::message::ConversationId;

use super::{CliResult, load_config, open_store};

pub async fn list() -> CliResult {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let conversations = store.list_conversations().await?;

    if conversations.is_empty() {
        println!("  No conversations yet. Start one with `lokal chat`.");
        return Ok(());
    }

    println!("  {:<38} {:<10} {:<18} Title", "ID", "Mode", "Created");
    for info in conversations {
        println!(
            "  {:<38} {:<10} {:<18} {}",
            info.id.as_str(),
            info.mode,
            info.created_at.format("%Y-%m-%d %H:%M").to_string(),
            info.title
        );
    }
    Ok(())
}

pub async fn show(id: &str, limit: usize) -> CliResult {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let conversation = store.load_conversation(&ConversationId::from(id), limit).await?;

    println!("  {} ({}, mode: {})", conversation.title, conversation.id, conversation.mode);
    println!();
    for turn in &conversation.turns {
        let label = if turn.is_summary() { "summary".to_string() } else { turn.role.to_string() };
        let mut lines = turn.content.lines();
        println!("  [{}] {label:>9} > {}", turn.timestamp.format("%H:%M"), lines.next().unwrap_or(""));
        for line in lines {
            println!("  {:>19} {line}", "");
        }
    }
    Ok(())
}

pub async fn rename(id: &str, title: &str) -> CliResult {
    let config = load_config()?;
    let store = open_store(&config).await?;
    store.rename_conversation(&ConversationId::from(id), title).await?;
    println!("  ✅ Renamed {id} to '{title}'");
    Ok(())
}

pub async fn delete(id: &str) -> CliResult {
    let config = load_config()?;
    let store = open_store(&config).await?;
    store.delete_conversation(&ConversationId::from(id)).await?;
    println!("  ✅ Deleted {id}");
    Ok(())
}
