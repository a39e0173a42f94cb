//! Fallback request/response transport.
//!
//! Used when no persistent channel is open. Each exchange is a single
//! independently authenticated request carrying the same frame a channel
//! send would carry. There is no retry here; the caller decides.

pub mod http;
pub mod mock;

use async_trait::async_trait;

use crate::protocol::{ChatReply, OutboundFrame};

pub use http::HttpFallback;
pub use mock::MockFallback;

/// Error types for fallback exchanges.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FallbackError {
    /// The request never got a response
    #[error("Network error: {0}")]
    Network(String),

    /// 401/403 from the backend
    #[error("Unauthorized ({status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    Unauthorized { status: u16, detail: Option<String> },

    /// 5xx from the backend
    #[error("Server error ({status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    Server { status: u16, detail: Option<String> },

    /// Any other non-success status
    #[error("Request rejected ({status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    Rejected { status: u16, detail: Option<String> },

    /// Success status but the body is not a valid reply
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl FallbackError {
    /// Human-readable reason supplied by the backend, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            FallbackError::Unauthorized { detail, .. }
            | FallbackError::Server { detail, .. }
            | FallbackError::Rejected { detail, .. } => detail.as_deref(),
            FallbackError::Network(_) | FallbackError::InvalidResponse(_) => None,
        }
    }

    /// Text to show the user: the backend's reason, or `default`.
    pub fn user_message(&self, default: &str) -> String {
        self.detail().unwrap_or(default).to_string()
    }

    /// Whether the failure is a malformed payload rather than a delivery failure.
    pub fn is_malformed(&self) -> bool {
        matches!(self, FallbackError::InvalidResponse(_))
    }
}

/// One-shot authenticated exchange with the chat backend.
#[async_trait]
pub trait FallbackTransport: Send + Sync {
    /// Send `frame` with `credential` as bearer token and wait for the reply.
    async fn exchange(
        &self,
        frame: &OutboundFrame,
        credential: &str,
    ) -> Result<ChatReply, FallbackError>;
}
