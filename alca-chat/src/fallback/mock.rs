//! Mock fallback transport for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::{Mutex, Semaphore};

use super::{FallbackError, FallbackTransport};
use crate::protocol::{ChatReply, OutboundFrame};

/// Mock fallback for testing.
///
/// Answers with queued results, then with a default reply. Optionally holds
/// every exchange until `release()` is called, to simulate a slow backend.
pub struct MockFallback {
    queued: Mutex<VecDeque<Result<ChatReply, FallbackError>>>,
    default_reply: ChatReply,
    requests: Mutex<Vec<(OutboundFrame, String)>>,
    call_count: AtomicU32,
    gate: Option<Semaphore>,
}

impl MockFallback {
    /// Create a mock replying "Mock reply" without a conversation id.
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            default_reply: ChatReply {
                reply: "Mock reply".to_string(),
                suggestions: None,
                conversation_id: None,
            },
            requests: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
            gate: None,
        }
    }

    /// Set the default reply.
    pub fn with_reply(mut self, reply: ChatReply) -> Self {
        self.default_reply = reply;
        self
    }

    /// Hold every exchange until released.
    pub fn held(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Queue a result for the next exchange.
    pub async fn push_result(&self, result: Result<ChatReply, FallbackError>) {
        self.queued.lock().await.push_back(result);
    }

    /// Let `n` held exchanges complete.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Get the number of times exchange was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Frames and credentials received, oldest first.
    pub async fn requests(&self) -> Vec<(OutboundFrame, String)> {
        self.requests.lock().await.clone()
    }
}

impl Default for MockFallback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FallbackTransport for MockFallback {
    async fn exchange(
        &self,
        frame: &OutboundFrame,
        credential: &str,
    ) -> Result<ChatReply, FallbackError> {
        self.requests
            .lock()
            .await
            .push((frame.clone(), credential.to_string()));
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return Err(FallbackError::Network("gate closed".into())),
            }
        }

        match self.queued.lock().await.pop_front() {
            Some(result) => result,
            None => Ok(self.default_reply.clone()),
        }
    }
}
