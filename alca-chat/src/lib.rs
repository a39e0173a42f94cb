//! Alça Chat - real-time assistant messaging client
//!
//! Keeps a conversation with the finance assistant going over a persistent
//! WebSocket channel, and falls back to one HTTP request per message when
//! the channel is not open.
//!
//! ## Architecture
//!
//! - **ChatClient**: owns the connection lifecycle and picks the transport per send
//! - **PersistentChannel**: bidirectional channel, token passed as a query parameter
//! - **FallbackTransport**: request/response, token passed as a bearer header
//! - **ConversationCorrelator**: carries the server-assigned conversation id
//! - **MessageLog**: append-only, ordered record of the conversation
//!
//! ## Transport Selection
//!
//! | Status when `send()` is called | Path |
//! |--------------------------------|------|
//! | `Open` | Frame queued on the channel, reply arrives as an event |
//! | `Closed` / `Connecting` / `Reconnecting` | Fallback exchange, reply appended before `send()` returns |
//!
//! ## Wire Frames
//!
//! ```text
//! outbound  {"message": "...", "conversation_id": "c1" | null}
//! inbound   {"type": "message", "reply": "...", "suggestions": [...], "conversation_id": "c1"}
//!           {"type": "system",  "message": "..."}
//!           {"type": "error",   "message": "..."}
//! fallback  {"reply": "...", "suggestions": [...], "conversation_id": "c1"}
//! ```
//!
//! ## Features
//!
//! - `typescript` - Export view types to TypeScript via ts-rs

pub mod channel;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod credentials;
pub mod error;
pub mod fallback;
pub mod message;
pub mod protocol;
pub mod status;

// Re-exports
pub use channel::{ChannelEvent, CloseReason, PersistentChannel, WsChannel};
pub use config::ClientConfig;
pub use controller::{ChatClient, ChatSnapshot, ClientEvent, Dispatch};
pub use conversation::ConversationCorrelator;
pub use credentials::{CredentialSource, SessionCredentials};
pub use error::ClientError;
pub use fallback::{FallbackError, FallbackTransport, HttpFallback};
pub use message::{Message, MessageLog, MessageOrigin};
pub use protocol::{ChatReply, HealthStatus, InboundFrame, OutboundFrame};
pub use status::{ConnectionStatus, TransportState};
