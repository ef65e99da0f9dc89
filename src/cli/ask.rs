//! Ask command implementation: a single turn

use anyhow::{Context as _, Result};
use std::sync::Arc;

use super::startup_context;
use crate::config::Config;
use crate::llm::{CompletionClient, OpenAiClient};
use crate::session::ChatSession;
use crate::store::ChatStore;

pub async fn run(
    store: Arc<ChatStore>,
    config: &Config,
    query: &str,
    context: Option<String>,
    thread: Option<i64>,
) -> Result<()> {
    let client: Arc<dyn CompletionClient> = Arc::new(
        OpenAiClient::from_config(config).context("Failed to set up the completion client")?,
    );

    let session = match thread {
        Some(thread_id) => ChatSession::with_thread(store, client, &config.model_name, thread_id),
        None => ChatSession::new(store, client, &config.model_name),
    };

    let context = startup_context(&session, context.as_deref(), config)?;

    match session.send_turn(query, context.as_ref()).await? {
        Some(reply) => println!("{}", reply),
        None => println!("Nothing to send."),
    }

    Ok(())
}
