pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod session;
pub mod store;

pub use config::Config;
pub use error::{CompletionError, Error, Result};
pub use llm::{CompletionClient, OpenAiClient, PromptMessage, Role};
pub use session::{ChatSession, SessionState};
pub use store::{
    ChatMessage, ChatStore, Context, MessageFilter, NewChatMessage, NewContext, SearchHit,
    SearchMode,
};
