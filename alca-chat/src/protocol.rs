//! Wire format shared by the persistent channel and the fallback endpoint.
//!
//! Inbound channel frames are JSON objects discriminated by `type`:
//!
//! ```text
//! {"type": "message", "reply": "...", "suggestions": [...], "conversation_id": "...", "timestamp": ...}
//! {"type": "system",  "message": "...", "conversation_id": "..."}
//! {"type": "error",   "message": "..."}
//! ```
//!
//! Outbound frames are the same on both transports:
//! `{"message": "...", "conversation_id": "..." | null}`.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Frame sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub message: String,
    /// Serialized as `null` until the backend assigns a conversation
    pub conversation_id: Option<String>,
}

impl OutboundFrame {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frame received on the persistent channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundFrame {
    /// Assistant reply
    Message {
        reply: String,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        suggestions: Option<Vec<String>>,
        #[serde(default)]
        conversation_id: Option<String>,
        #[serde(default)]
        timestamp: Option<WireTimestamp>,
    },
    /// Informational notice from the backend
    System {
        message: String,
        #[serde(default)]
        conversation_id: Option<String>,
    },
    /// Backend-side failure report
    Error { message: String },
}

impl InboundFrame {
    /// Conversation id carried by the frame, if any.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            InboundFrame::Message { conversation_id, .. }
            | InboundFrame::System { conversation_id, .. } => conversation_id.as_deref(),
            InboundFrame::Error { .. } => None,
        }
    }
}

/// Decode one inbound channel frame.
pub fn decode_inbound(raw: &str) -> Result<InboundFrame, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Fractional epoch values below this are seconds, anything above is millis.
const SECONDS_CUTOFF: f64 = 1e11;

/// Timestamp as sent by the backend.
///
/// Integers are epoch milliseconds. Floats are epoch seconds (as produced by
/// Python's `time.time()`) unless large enough to be milliseconds. Anything
/// else is kept so the frame still decodes; it just carries no usable time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(i64),
    Fractional(f64),
    Text(String),
    Other(serde_json::Value),
}

impl WireTimestamp {
    /// Convert to a UTC time; `None` if the value is not understood.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            WireTimestamp::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            WireTimestamp::Fractional(value) if value.is_finite() => {
                let millis = if value.abs() < SECONDS_CUTOFF {
                    value * 1000.0
                } else {
                    *value
                };
                Utc.timestamp_millis_opt(millis.round() as i64).single()
            }
            WireTimestamp::Fractional(_) => None,
            WireTimestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            WireTimestamp::Other(_) => None,
        }
    }
}

/// Successful reply from the fallback endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    #[serde(default)]
    pub suggestions: Option<Vec<String>>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Error body returned by the fallback endpoint.
///
/// FastAPI reports `detail` (sometimes a list of validation errors rather
/// than a string); other services use `error`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Human-readable reason, if the body carried one as text.
    pub fn reason(&self) -> Option<String> {
        [&self.detail, &self.error]
            .into_iter()
            .flatten()
            .find_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    }

    /// Parse a raw response body, tolerating anything that is not JSON.
    pub fn reason_from(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.reason())
    }
}

/// Response of the health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}
