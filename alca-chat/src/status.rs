//! Connection status and the transport state machine.
//!
//! ```text
//!            open()                 established
//!  Closed ───────────► Connecting ─────────────► Open
//!    ▲                    │                        │
//!    │   failed (fallback │                        │ dropped while
//!    │   flag set)        ▼                        ▼ still wanted
//!    └──────────────── Closed      Connecting ◄── Reconnecting
//!                                        after the fixed delay
//! ```
//!
//! `close()` moves any state to `Closed` and withdraws the intent to be open,
//! which stops every pending retry.
//!
//! `TransportState` holds no I/O. Every connection attempt gets a number, and
//! events carrying a stale number are rejected, so a slow report from an old
//! attempt can never move the current state.

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Status of the persistent channel as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Closed,
    Connecting,
    Open,
    Reconnecting,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Closed => "closed",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Open => "open",
            ConnectionStatus::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// What the controller must do after the channel reported a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseOutcome {
    /// Status before the close was applied
    pub from: ConnectionStatus,
    /// Status after the close was applied
    pub to: ConnectionStatus,
    /// Whether a retry should be scheduled
    pub retry: bool,
}

/// The state machine behind `ConnectionStatus`.
#[derive(Debug, Clone, Default)]
pub struct TransportState {
    status: ConnectionStatus,
    /// The caller asked for the channel to be open and has not closed since
    desired_open: bool,
    /// Last establishment failed; sends go through the fallback transport
    fallback_active: bool,
    /// Number of the most recent connection attempt
    attempt: u64,
    /// Bumped on every shutdown so in-flight work can detect it was cancelled
    epoch: u64,
}

impl TransportState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == ConnectionStatus::Open
    }

    pub fn desired_open(&self) -> bool {
        self.desired_open
    }

    pub fn fallback_active(&self) -> bool {
        self.fallback_active
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether `attempt` is the attempt currently in charge of the channel.
    pub fn is_current(&self, attempt: u64) -> bool {
        attempt == self.attempt && self.desired_open
    }

    /// Start a connection attempt on behalf of `open()`.
    ///
    /// Returns the attempt number, or `None` if the channel is already open
    /// or connecting.
    pub fn begin_connect(&mut self) -> Option<u64> {
        match self.status {
            ConnectionStatus::Open | ConnectionStatus::Connecting => None,
            ConnectionStatus::Closed | ConnectionStatus::Reconnecting => {
                self.desired_open = true;
                Some(self.next_attempt())
            }
        }
    }

    /// Start a retry once the reconnection delay has elapsed.
    ///
    /// Only valid while the caller still wants the channel open.
    pub fn begin_retry(&mut self) -> Option<u64> {
        if !self.desired_open {
            return None;
        }
        match self.status {
            ConnectionStatus::Closed | ConnectionStatus::Reconnecting => Some(self.next_attempt()),
            ConnectionStatus::Open | ConnectionStatus::Connecting => None,
        }
    }

    /// The channel reported it is ready. Returns `true` on a transition.
    pub fn on_established(&mut self, attempt: u64) -> bool {
        if !self.is_current(attempt) || self.status != ConnectionStatus::Connecting {
            return false;
        }
        self.status = ConnectionStatus::Open;
        self.fallback_active = false;
        true
    }

    /// The channel reported the connection ended.
    pub fn on_closed(&mut self, attempt: u64) -> Option<CloseOutcome> {
        if !self.is_current(attempt) {
            return None;
        }

        let from = self.status;
        let (to, retry) = match from {
            ConnectionStatus::Connecting => {
                self.fallback_active = true;
                (ConnectionStatus::Closed, true)
            }
            ConnectionStatus::Open => (ConnectionStatus::Reconnecting, true),
            ConnectionStatus::Closed | ConnectionStatus::Reconnecting => return None,
        };

        self.status = to;
        Some(CloseOutcome { from, to, retry })
    }

    /// Withdraw the intent to be open. Returns the previous status.
    ///
    /// Invalidates the current attempt and bumps the epoch.
    pub fn shut(&mut self) -> ConnectionStatus {
        let previous = self.status;
        self.status = ConnectionStatus::Closed;
        self.desired_open = false;
        self.attempt += 1;
        self.epoch += 1;
        previous
    }

    fn next_attempt(&mut self) -> u64 {
        self.attempt += 1;
        self.status = ConnectionStatus::Connecting;
        self.attempt
    }
}
