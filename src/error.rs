//! Error types shared by the store, the completion client and the session

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors returned by a [`CompletionClient`](crate::llm::CompletionClient).
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The client could not be built (missing key, bad URL, ...)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request never produced an HTTP response
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,

    /// The endpoint answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The endpoint answered 2xx but the body carried no usable text
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum Error {
    /// A write would break a data-model invariant (duplicate or empty context name)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The database file cannot be opened, read or written
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The completion capability failed; nothing was persisted
    #[error("remote call failed: {0}")]
    RemoteCallFailed(#[from] CompletionError),

    /// Another turn from the same session is still awaiting its response
    #[error("a turn is already in progress for this session")]
    TurnInProgress,

    #[error("context not found: {0}")]
    ContextNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                Error::ConstraintViolation(err.to_string())
            }
            _ => Error::StorageUnavailable(err.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
