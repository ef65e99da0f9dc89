//! Interactive chat loop: one invocation is one session and one thread

use anyhow::{Context as _, Result};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::startup_context;
use crate::config::Config;
use crate::llm::{CompletionClient, OpenAiClient};
use crate::session::ChatSession;
use crate::store::{ChatMessage, ChatStore, Context};

pub async fn run(
    store: Arc<ChatStore>,
    config: &Config,
    context: Option<String>,
    resume: bool,
) -> Result<()> {
    let client: Arc<dyn CompletionClient> = Arc::new(
        OpenAiClient::from_config(config).context("Failed to set up the completion client")?,
    );

    let resumed_thread = if resume { store.latest_thread_id()? } else { None };
    let session = match resumed_thread {
        Some(thread_id) => {
            ChatSession::with_thread(store, client, &config.model_name, thread_id)
        }
        None => ChatSession::new(store, client, &config.model_name),
    };

    let mut active = startup_context(&session, context.as_deref(), config)?;

    println!(
        "Chatting with {} on thread {} (context: {})",
        session.model(),
        session.thread_id(),
        context_label(active.as_ref())
    );
    println!("Commands: /context NAME, /context (clear), /history, /quit");

    if resumed_thread.is_some() {
        print_exchanges(&session.history(config.max_history_items)?);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let input = line.trim();

        match input {
            "/quit" | "/exit" => break,
            "/history" => {
                print_exchanges(&session.history(config.max_history_items)?);
                continue;
            }
            _ => {}
        }

        if let Some(name) = context_command(input) {
            match session.resolve_context(name) {
                Ok(context) => {
                    active = context;
                    println!("Context: {}", context_label(active.as_ref()));
                }
                Err(e) => println!("{}", e),
            }
            continue;
        }

        // Failed turns are reported and the loop carries on; retrying is up to the user
        match session.send_turn(input, active.as_ref()).await {
            Ok(Some(reply)) => println!("\nAssistant: {}", reply),
            Ok(None) => {}
            Err(e) => println!("\n[Error: {}]", e),
        }
    }

    Ok(())
}

/// Argument of a `/context` command; `None` when the input is something else
fn context_command(input: &str) -> Option<&str> {
    if input == "/context" {
        return Some("");
    }
    input.strip_prefix("/context ").map(str::trim)
}

fn context_label(context: Option<&Context>) -> &str {
    context.map(|c| c.name.as_str()).unwrap_or("none")
}

fn print_exchanges(messages: &[ChatMessage]) {
    if messages.is_empty() {
        println!("(no messages in this thread yet)");
        return;
    }

    for msg in messages {
        println!("\n[{}]", msg.timestamp.format("%Y-%m-%d %H:%M"));
        println!("You: {}", msg.user_message);
        println!("Assistant: {}", msg.assistant_message);
    }
}
