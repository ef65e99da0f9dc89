//! History and search command implementations

use anyhow::Result;

use crate::store::{ChatStore, MessageFilter, SearchMode};

pub fn run(
    store: &ChatStore,
    thread: Option<i64>,
    context: Option<String>,
    limit: usize,
) -> Result<()> {
    let context_id = match context {
        Some(name) => Some(
            store
                .find_context_by_name(name.trim())?
                .ok_or_else(|| anyhow::anyhow!("Context not found: {}", name))?
                .id,
        ),
        None => None,
    };

    let filter = MessageFilter {
        thread_id: thread,
        context_id,
    };
    let messages = store.get_messages(&filter, limit)?;

    if messages.is_empty() {
        println!("No messages found.");
        return Ok(());
    }

    let mut current_thread = None;
    for msg in &messages {
        if msg.thread_id != current_thread {
            current_thread = msg.thread_id;
            let label = current_thread
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("\n{}", "=".repeat(80));
            println!("Thread: {}", label);
            println!("{}", "=".repeat(80));
        }

        println!("\n[{}]", msg.timestamp.format("%Y-%m-%d %H:%M"));
        println!("You: {}", msg.user_message);
        println!("Assistant: {}", msg.assistant_message);
        println!("{}", "-".repeat(40));
    }

    println!("\n{} message(s)", messages.len());
    Ok(())
}

pub fn search(store: &ChatStore, query: &str, mode: SearchMode, limit: usize) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        println!("Enter search terms.");
        return Ok(());
    }

    let hits = store.search_messages(query, mode, limit)?;

    println!(
        "{:<17} {:<10} {:<12} {:<30} {}",
        "Time", "Thread", "Context", "User Message", "Assistant Response"
    );
    println!("{}", "-".repeat(100));

    for hit in &hits {
        let msg = &hit.message;
        println!(
            "{:<17} {:<10} {:<12} {:<30} {}",
            msg.timestamp.format("%Y-%m-%d %H:%M"),
            msg.thread_id.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string()),
            super::truncate(hit.context_name.as_deref().unwrap_or("-"), 12),
            super::truncate(&msg.user_message, 30),
            super::truncate(&msg.assistant_message, 40),
        );
    }

    println!("\nFound {} results ({} mode)", hits.len(), mode.as_str());
    Ok(())
}
