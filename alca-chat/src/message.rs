//! Messages and the append-only message log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    User,
    Assistant,
    System,
    Error,
}

/// One entry of the conversation as rendered by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Message {
    /// Opaque unique identifier
    pub id: String,
    /// Content
    pub text: String,
    /// Who produced it
    pub origin: MessageOrigin,
    /// When the client observed it
    pub timestamp: DateTime<Utc>,
    /// Quick-reply affordances, in display order
    pub suggestions: Vec<String>,
}

impl Message {
    fn new(origin: MessageOrigin, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            origin,
            timestamp: Utc::now(),
            suggestions: Vec::new(),
        }
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageOrigin::User, text)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageOrigin::Assistant, text)
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageOrigin::System, text)
    }

    /// Create an error message.
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageOrigin::Error, text)
    }

    /// Use a server-assigned id instead of the generated one.
    pub fn with_id(mut self, id: Option<String>) -> Self {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            self.id = id;
        }
        self
    }

    /// Attach quick-reply suggestions.
    pub fn with_suggestions(mut self, suggestions: Option<Vec<String>>) -> Self {
        self.suggestions = suggestions.unwrap_or_default();
        self
    }

    /// Use the backend's timestamp instead of the receive time.
    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        if let Some(ts) = timestamp {
            self.timestamp = ts;
        }
        self
    }
}

/// Ordered, append-only sequence of exchanged messages.
///
/// Entries are never mutated or removed once appended. Timestamps are
/// clamped so they never go backwards within the log.
pub struct MessageLog {
    entries: RwLock<Vec<Message>>,
}

impl MessageLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Create a log whose first entry is an assistant greeting.
    pub fn with_greeting(text: impl Into<String>) -> Self {
        Self {
            entries: RwLock::new(vec![Message::assistant(text)]),
        }
    }

    /// Append a message and return the stored copy.
    pub async fn append(&self, mut message: Message) -> Message {
        let mut entries = self.entries.write().await;

        if let Some(last) = entries.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }

        entries.push(message.clone());
        message
    }

    /// Copy of every entry, oldest first.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.entries.read().await.clone()
    }

    /// Look up an entry by id.
    pub async fn get(&self, id: &str) -> Option<Message> {
        let entries = self.entries.read().await;
        entries.iter().find(|m| m.id == id).cloned()
    }

    /// Most recent entry.
    pub async fn last(&self) -> Option<Message> {
        self.entries.read().await.last().cloned()
    }

    /// Get count.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}
