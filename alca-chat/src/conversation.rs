//! Conversation correlation.
//!
//! The backend assigns a conversation id on its first reply and may later
//! migrate to a new one. The client always adopts the most recently received
//! id and attaches it to every outbound frame.

use tokio::sync::RwLock;
use tracing::debug;

use crate::protocol::OutboundFrame;

/// Single source of truth for the active conversation id.
pub struct ConversationCorrelator {
    current: RwLock<Option<String>>,
}

impl ConversationCorrelator {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// Build an outbound frame carrying the current id (or `null`).
    pub async fn attach(&self, text: impl Into<String>) -> OutboundFrame {
        OutboundFrame {
            message: text.into(),
            conversation_id: self.current.read().await.clone(),
        }
    }

    /// Adopt the id from a reply. Last writer wins.
    ///
    /// Absent or empty ids are ignored. Returns `true` if the stored id
    /// changed.
    pub async fn adopt(&self, id: Option<&str>) -> bool {
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            return false;
        };

        let mut current = self.current.write().await;
        if current.as_deref() == Some(id) {
            return false;
        }

        debug!(
            previous = ?current.as_deref(),
            conversation_id = %id,
            "Adopting conversation id"
        );
        *current = Some(id.to_string());
        true
    }

    pub async fn current(&self) -> Option<String> {
        self.current.read().await.clone()
    }
}

impl Default for ConversationCorrelator {
    fn default() -> Self {
        Self::new()
    }
}
