//! Command implementations for the `toolbar-chat` binary

pub mod ask;
pub mod chat;
pub mod context;
pub mod history;
pub mod settings;

use tracing::warn;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::ChatSession;
use crate::store::Context;

/// Context for a new session: the one named on the command line, else the
/// configured default. A default that no longer exists is skipped with a
/// warning; a missing explicit name is an error.
pub(crate) fn startup_context(
    session: &ChatSession,
    explicit: Option<&str>,
    config: &Config,
) -> Result<Option<Context>> {
    if let Some(name) = explicit {
        return session.resolve_context(name);
    }

    let Some(name) = config.default_context() else {
        return Ok(None);
    };
    match session.resolve_context(name) {
        Err(Error::ContextNotFound(_)) => {
            warn!("Default context '{}' no longer exists; continuing without one", name);
            eprintln!(
                "Default context '{}' not found, continuing without a context \
                 (run `toolbar-chat config set default-context \"\"` to clear it)",
                name
            );
            Ok(None)
        }
        other => other,
    }
}

/// First line of `text`, shortened to `max` characters with an ellipsis
pub(crate) fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}
