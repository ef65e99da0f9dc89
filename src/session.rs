//! Chat session: one conversation surface talking to the completion backend
//!
//! A session sends at most one turn at a time. The busy flag is held by a
//! [`TurnGuard`] so it returns to idle however the turn ends, including when
//! the caller drops the future (timeout, abort).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::llm::{CompletionClient, PromptMessage};
use crate::store::{self, ChatMessage, ChatStore, Context, MessageFilter, NewChatMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingResponse,
}

pub struct ChatSession {
    store: Arc<ChatStore>,
    client: Arc<dyn CompletionClient>,
    model: String,
    thread_id: i64,
    busy: AtomicBool,
}

impl ChatSession {
    /// Start a session on a fresh thread
    pub fn new(
        store: Arc<ChatStore>,
        client: Arc<dyn CompletionClient>,
        model: impl Into<String>,
    ) -> Self {
        Self::with_thread(store, client, model, new_thread_id())
    }

    /// Continue an existing thread
    pub fn with_thread(
        store: Arc<ChatStore>,
        client: Arc<dyn CompletionClient>,
        model: impl Into<String>,
        thread_id: i64,
    ) -> Self {
        Self {
            store,
            client,
            model: model.into(),
            thread_id,
            busy: AtomicBool::new(false),
        }
    }

    pub fn thread_id(&self) -> i64 {
        self.thread_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn state(&self) -> SessionState {
        if self.busy.load(Ordering::Acquire) {
            SessionState::AwaitingResponse
        } else {
            SessionState::Idle
        }
    }

    /// Look a context up by name. An empty name means "no context".
    pub fn resolve_context(&self, name: &str) -> Result<Option<Context>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        self.store
            .find_context_by_name(name)?
            .map(Some)
            .ok_or_else(|| Error::ContextNotFound(name.to_string()))
    }

    /// Messages of this session's thread, oldest first
    pub fn history(&self, limit: usize) -> Result<Vec<ChatMessage>> {
        self.store
            .get_messages(&MessageFilter::thread(self.thread_id), limit)
    }

    /// Send one user turn and record the exchange.
    ///
    /// Returns `Ok(None)` without contacting the backend when the query is
    /// blank, and `Err(TurnInProgress)` when a previous turn has not resolved.
    /// Nothing is written unless the backend answers.
    pub async fn send_turn(&self, query: &str, context: Option<&Context>) -> Result<Option<String>> {
        let _guard = TurnGuard::acquire(&self.busy).ok_or_else(|| {
            warn!("Rejected turn on thread {}: previous turn still pending", self.thread_id);
            Error::TurnInProgress
        })?;

        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let messages = build_messages(query, context);
        debug!(
            "Thread {}: sending turn via {} (context: {})",
            self.thread_id,
            self.client.name(),
            context.map(|c| c.name.as_str()).unwrap_or("none")
        );

        let reply = self
            .client
            .complete(&self.model, &messages)
            .await
            .map_err(|e| {
                warn!("Completion failed on thread {}: {}", self.thread_id, e);
                Error::RemoteCallFailed(e)
            })?;

        let id = self.store.add_message(&NewChatMessage {
            user_message: query.to_string(),
            assistant_message: reply.clone(),
            context_id: context.map(|c| c.id),
            thread_id: Some(self.thread_id),
            timestamp: store::now(),
        })?;

        info!("Recorded message {} on thread {}", id, self.thread_id);
        Ok(Some(reply))
    }
}

/// Request body for one turn: optional system instruction, then the query
fn build_messages(query: &str, context: Option<&Context>) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(context) = context {
        if !context.content.trim().is_empty() {
            messages.push(PromptMessage::system(context.content.clone()));
        }
    }
    messages.push(PromptMessage::user(query));
    messages
}

/// Thread ids are grouping keys only; the session start time is unique enough
pub fn new_thread_id() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Holds a session in `AwaitingResponse` until dropped
struct TurnGuard<'a> {
    busy: &'a AtomicBool,
}

impl<'a> TurnGuard<'a> {
    fn acquire(busy: &'a AtomicBool) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { busy })
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
