//! Completion capability: the remote text-generation service called once per turn

mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CompletionError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message of a completion request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A chat-completion backend.
///
/// Implementations make exactly one request per call and never retry.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate the assistant reply for an ordered list of messages
    async fn complete(
        &self,
        model: &str,
        messages: &[PromptMessage],
    ) -> Result<String, CompletionError>;

    /// Human-readable backend name, used in logs
    fn name(&self) -> &str;
}
