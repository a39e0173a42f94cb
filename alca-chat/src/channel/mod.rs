//! Persistent channel to the chat backend.
//!
//! # Architecture
//!
//! | Module      | Responsibility                                   |
//! |-------------|--------------------------------------------------|
//! | `websocket` | WebSocket connect/send/receive (tokio-tungstenite) |
//! | `mock`      | Scripted channel for tests                       |
//!
//! A channel owns at most one connection attempt. It reports progress by
//! sending `ChannelEvent`s on the sender handed to `establish()`:
//! `Established` once frames can be sent, `Inbound` per received text frame,
//! and a single `Closed` when the connection ends for any reason.
//!
//! The channel does not interpret frames. Decoding and dropping of malformed
//! payloads is the controller's job.

pub mod mock;
pub mod websocket;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use mock::{MockBehavior, MockChannel};
pub use websocket::WsChannel;

/// Sender half used by a channel to report events to its owner.
pub type ChannelEvents = mpsc::UnboundedSender<ChannelEvent>;

/// Event reported by a persistent channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Ready to send
    Established,
    /// One received text frame, undecoded
    Inbound(String),
    /// The connection ended; no further events follow
    Closed(CloseReason),
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The connection could not be established
    ConnectFailed(String),
    /// The backend closed the connection
    Remote(Option<String>),
    /// Transport-level error after establishment
    Error(String),
    /// Released by `teardown()`
    Local,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::ConnectFailed(e) => write!(f, "connect failed: {}", e),
            CloseReason::Remote(Some(reason)) => write!(f, "closed by backend: {}", reason),
            CloseReason::Remote(None) => f.write_str("closed by backend"),
            CloseReason::Error(e) => write!(f, "transport error: {}", e),
            CloseReason::Local => f.write_str("closed locally"),
        }
    }
}

/// A full-duplex connection to the chat backend.
#[async_trait]
pub trait PersistentChannel: Send + Sync {
    /// Initiate a connection to `url` and report progress on `events`.
    ///
    /// Returns as soon as the attempt is started; it does not wait for the
    /// connection. Any previous connection is released first.
    async fn establish(&self, url: &str, events: ChannelEvents);

    /// Queue one text frame. Fire-and-forget.
    ///
    /// Only valid after `Established` was reported. Calls made in any other
    /// state are ignored by the channel.
    async fn send(&self, frame: String);

    /// Release the connection. Idempotent.
    ///
    /// After teardown the channel either reports `Closed` or stops reporting
    /// altogether.
    async fn teardown(&self);
}
