use crate::api::HttpChatApi;
use crate::client::{ChatClient, Outcome};
use crate::config::Config;
use crate::model::ConversationSummary;
use crate::new_conversation::{NewConversationFlow, StartedConversation};
use crate::state::ChatState;
use crate::viewport::{message_row, Alignment, EMPTY_PLACEHOLDER};
use anyhow::Context;
use colored::*;
use std::sync::Arc;

/// Shared CLI implementation for the `campuslink` binary.
pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let bin = args
        .first()
        .map(|s| s.as_str())
        .unwrap_or("campuslink")
        .to_string();

    if args.len() < 2 || matches!(args[1].as_str(), "-h" | "--help" | "help") {
        print_usage(&bin);
        return Ok(());
    }

    let (config, rest) =
        Config::from_args(&args[1..]).map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let Some(command) = rest.first() else {
        print_usage(&bin);
        return Ok(());
    };

    let client = ChatClient::new(Arc::new(HttpChatApi::new(&config)), config.viewer_id.clone());

    match command.as_str() {
        "conversations" | "ls" => list_conversations(&client).await?,
        "history" => {
            let Some(id) = rest.get(1) else {
                eprintln!("{}", format!("Usage: {} history <conversation_id> [pages]", bin).yellow());
                return Ok(());
            };
            let pages = rest
                .get(2)
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(1)
                .max(1);
            show_history(&client, id, pages).await?;
        }
        "send" => {
            if rest.len() < 3 {
                eprintln!("{}", format!("Usage: {} send <conversation_id> <message>", bin).yellow());
                return Ok(());
            }
            let message = rest[2..].join(" ");
            send_message(&client, &rest[1], &message).await?;
        }
        "dm" => {
            let Some(user_id) = rest.get(1) else {
                eprintln!("{}", format!("Usage: {} dm <user_id>", bin).yellow());
                return Ok(());
            };
            start_direct(&client, user_id).await?;
        }
        "read" => {
            let Some(id) = rest.get(1) else {
                eprintln!("{}", format!("Usage: {} read <conversation_id>", bin).yellow());
                return Ok(());
            };
            mark_read(&client, id).await?;
        }
        _ => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), command.red());
            print_usage(&bin);
        }
    }

    Ok(())
}

fn print_usage(bin: &str) {
    println!("{}", "⚡ CampusLink CLI".bright_cyan().bold());
    println!();
    println!("{}", "Usage:".bright_white().bold());
    println!("  {} [options] <command> [args]", bin.cyan());
    println!();
    println!("{}", "Commands:".bright_white().bold());
    println!("  {}                        List your conversations", "conversations".cyan());
    println!(
        "  {} <id> [pages]          Show messages, paging back through history",
        "history".cyan()
    );
    println!("  {} <id> <message>          Send a message", "send".cyan());
    println!(
        "  {} <user_id>                  Open or start a direct conversation",
        "dm".cyan()
    );
    println!("  {} <id>                     Mark incoming messages as read", "read".cyan());
    println!();
    println!("{}", "Options:".bright_white().bold());
    println!("  {} <url>     REST API root (CAMPUSLINK_BASE_URL)", "--base-url".cyan());
    println!("  {} <id>        Signed-in user id (CAMPUSLINK_VIEWER_ID)", "--viewer".cyan());
    println!("  {} <token>      Bearer token (CAMPUSLINK_TOKEN)", "--token".cyan());
    println!("  {} <file>      JSON config file", "--config".cyan());
    println!("  {} <secs>      Request timeout", "--timeout".cyan());
}

fn print_summary(summary: &ConversationSummary, viewer_id: &str) {
    let label = summary.label(viewer_id).bright_white().bold();
    let kind = format!("{:?}", summary.kind).to_lowercase().dimmed();
    println!("  {} [{}] {}", label, kind, summary.id.dimmed());
    if let Some(subtitle) = &summary.subtitle {
        println!("    {}", subtitle.dimmed());
    }
    if let Some(last) = &summary.last_message {
        let when = last.created_at.format("%Y-%m-%d %H:%M");
        println!("    {} {}", when.to_string().dimmed(), last.content);
    }
}

async fn list_conversations(client: &ChatClient<HttpChatApi>) -> anyhow::Result<()> {
    client
        .load_conversations()
        .await
        .context("Failed to load conversations")?;
    let state = client.snapshot().await;
    let items = &state.conversations.items;
    if items.is_empty() {
        println!("{}", "No conversations yet".yellow());
        return Ok(());
    }
    println!(
        "{}",
        format!("Conversations ({})", items.len()).bright_cyan().bold()
    );
    println!("{}", "─".repeat(60).dimmed());
    for summary in items {
        print_summary(summary, state.viewer_id());
    }
    Ok(())
}

fn print_messages(state: &ChatState) {
    if state.open.messages.is_empty() {
        println!("{}", EMPTY_PLACEHOLDER.dimmed());
        return;
    }
    for message in &state.open.messages {
        let row = message_row(message, state.viewer_id());
        let when = row.created_at.format("%H:%M").to_string();
        match row.align {
            Alignment::Trailing => println!(
                "{:>8} {} {} {}",
                when.dimmed(),
                "you:".green().bold(),
                row.content,
                row.status_glyph.unwrap_or_default().cyan()
            ),
            Alignment::Leading => println!(
                "{:>8} {} {}",
                when.dimmed(),
                format!("{}:", row.sender_name).bright_white().bold(),
                row.content
            ),
        }
    }
}

async fn show_history(
    client: &ChatClient<HttpChatApi>,
    conversation_id: &str,
    pages: usize,
) -> anyhow::Result<()> {
    client
        .open_conversation(conversation_id)
        .await
        .with_context(|| format!("Failed to open conversation {}", conversation_id))?;

    for _ in 1..pages {
        match client.load_older().await.context("Failed to load older messages")? {
            Outcome::Applied(_) => {}
            // Exhausted or nothing to page from
            Outcome::Skipped(_) | Outcome::Stale => break,
        }
    }

    let state = client.snapshot().await;
    let title = state
        .open
        .conversation
        .as_ref()
        .map(|c| ConversationSummary::from_conversation(c, state.viewer_id()).label(state.viewer_id()))
        .unwrap_or_else(|| conversation_id.to_string());
    println!("{}", title.bright_cyan().bold());
    println!("{}", "─".repeat(60).dimmed());
    print_messages(&state);

    let cursor = state.open.cursor;
    println!("{}", "─".repeat(60).dimmed());
    println!(
        "{} {}/{} loaded{}",
        "ℹ".blue(),
        cursor.fetched_count,
        cursor.total_count,
        if cursor.has_more { ", more available" } else { "" }
    );
    Ok(())
}

async fn send_message(
    client: &ChatClient<HttpChatApi>,
    conversation_id: &str,
    content: &str,
) -> anyhow::Result<()> {
    match client
        .send_message(conversation_id, content)
        .await
        .context("Failed to send message")?
    {
        Outcome::Applied(message) => {
            println!("{} Message sent! ID: {}", "✓".green().bold(), message.id.cyan());
        }
        Outcome::Skipped(reason) => {
            eprintln!("{} Not sent: {:?}", "✗".yellow().bold(), reason);
        }
        Outcome::Stale => {}
    }
    Ok(())
}

async fn start_direct(client: &ChatClient<HttpChatApi>, user_id: &str) -> anyhow::Result<()> {
    // Reuse only works against a loaded list
    client
        .load_conversations()
        .await
        .context("Failed to load conversations")?;

    let mut flow = NewConversationFlow::new();
    flow.select(user_id);
    match flow
        .confirm(client)
        .await
        .with_context(|| format!("Failed to start a conversation with {}", user_id))?
    {
        Outcome::Applied(StartedConversation::Reused(id)) => {
            println!("{} Existing conversation: {}", "✓".green().bold(), id.cyan());
        }
        Outcome::Applied(StartedConversation::Created(summary)) => {
            println!("{} Created conversation: {}", "✓".green().bold(), summary.id.cyan());
        }
        Outcome::Skipped(reason) => {
            eprintln!("{} Skipped: {:?}", "✗".yellow().bold(), reason);
        }
        Outcome::Stale => {}
    }
    Ok(())
}

async fn mark_read(client: &ChatClient<HttpChatApi>, conversation_id: &str) -> anyhow::Result<()> {
    client
        .open_conversation(conversation_id)
        .await
        .with_context(|| format!("Failed to open conversation {}", conversation_id))?;
    let outcome = client
        .mark_open_conversation_read()
        .await
        .context("Failed to mark messages as read")?;
    let count = outcome.applied().unwrap_or(0);
    println!(
        "{} Marked {} message{} as read",
        "✓".green().bold(),
        count.to_string().cyan(),
        if count == 1 { "" } else { "s" }
    );
    Ok(())
}
