//! Error types for alca-chat

use thiserror::Error;

/// Errors raised locally by the chat client.
///
/// Transport failures are not represented here: they are recorded in the
/// message log as error-origin entries instead of being returned to callers.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Message text is empty")]
    EmptyMessage,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Unknown message: {0}")]
    UnknownMessage(String),

    #[error("Message {message_id} has no suggestion at index {index}")]
    NoSuchSuggestion { message_id: String, index: usize },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
