//! Mock persistent channel for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;

use super::{ChannelEvent, ChannelEvents, CloseReason, PersistentChannel};

/// How the mock answers `establish()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Report `Established` immediately
    Accept,
    /// Report `Closed(ConnectFailed)` immediately
    Refuse,
    /// Report nothing; the attempt stays pending
    Silent,
}

#[derive(Default)]
struct MockState {
    events: Option<ChannelEvents>,
    established: bool,
    last_url: Option<String>,
    sent: Vec<String>,
}

/// Mock channel for testing.
///
/// Scriptable establishment behavior plus hooks to inject inbound frames and
/// connection drops.
pub struct MockChannel {
    behavior: Mutex<MockBehavior>,
    state: Mutex<MockState>,
    establish_count: AtomicU32,
    teardown_count: AtomicU32,
}

impl MockChannel {
    /// Create a mock that accepts every connection.
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::Accept)
    }

    /// Create a mock that refuses every connection.
    pub fn refusing() -> Self {
        Self::with_behavior(MockBehavior::Refuse)
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            state: Mutex::new(MockState::default()),
            establish_count: AtomicU32::new(0),
            teardown_count: AtomicU32::new(0),
        }
    }

    /// Change how future `establish()` calls are answered.
    pub async fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().await = behavior;
    }

    /// Get the number of times establish was called.
    pub fn establish_count(&self) -> u32 {
        self.establish_count.load(Ordering::SeqCst)
    }

    /// Get the number of times teardown was called.
    pub fn teardown_count(&self) -> u32 {
        self.teardown_count.load(Ordering::SeqCst)
    }

    /// URL passed to the most recent `establish()`.
    pub async fn last_url(&self) -> Option<String> {
        self.state.lock().await.last_url.clone()
    }

    /// Frames accepted by `send()`, oldest first.
    pub async fn sent_frames(&self) -> Vec<String> {
        self.state.lock().await.sent.clone()
    }

    /// Report `Established` for a pending (silent) attempt.
    pub async fn complete_connect(&self) -> bool {
        let mut state = self.state.lock().await;
        let Some(events) = state.events.clone() else {
            return false;
        };
        state.established = true;
        events.send(ChannelEvent::Established).is_ok()
    }

    /// Deliver a raw inbound frame. Returns `false` if nothing is listening.
    pub async fn push_frame(&self, raw: impl Into<String>) -> bool {
        let state = self.state.lock().await;
        match &state.events {
            Some(events) => events.send(ChannelEvent::Inbound(raw.into())).is_ok(),
            None => false,
        }
    }

    /// Simulate the connection ending.
    pub async fn drop_connection(&self, reason: CloseReason) -> bool {
        let mut state = self.state.lock().await;
        state.established = false;
        match state.events.take() {
            Some(events) => events.send(ChannelEvent::Closed(reason)).is_ok(),
            None => false,
        }
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistentChannel for MockChannel {
    async fn establish(&self, url: &str, events: ChannelEvents) {
        self.establish_count.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().await;

        let mut state = self.state.lock().await;
        state.last_url = Some(url.to_string());
        state.established = false;
        state.events = None;

        match behavior {
            MockBehavior::Accept => {
                state.established = true;
                let _ = events.send(ChannelEvent::Established);
                state.events = Some(events);
            }
            MockBehavior::Refuse => {
                let _ = events.send(ChannelEvent::Closed(CloseReason::ConnectFailed(
                    "connection refused".into(),
                )));
            }
            MockBehavior::Silent => {
                state.events = Some(events);
            }
        }
    }

    async fn send(&self, frame: String) {
        let mut state = self.state.lock().await;
        if state.established {
            state.sent.push(frame);
        }
    }

    async fn teardown(&self) {
        self.teardown_count.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        state.established = false;
        state.events = None;
    }
}
