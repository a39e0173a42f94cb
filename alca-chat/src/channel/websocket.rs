//! WebSocket implementation of the persistent channel.
//!
//! Single responsibility: connect, forward text frames in both directions,
//! and report when the connection ends. No knowledge of the chat protocol.
//!
//! Each `establish()` spawns one connection task. The task owns both halves
//! of the socket; outbound frames reach it through an unbounded queue, so
//! `send()` never waits on the network.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use super::{ChannelEvent, ChannelEvents, CloseReason, PersistentChannel};

/// The connection currently owned by the channel.
struct ActiveConnection {
    /// Outbound frame queue drained by the connection task
    outbound: mpsc::UnboundedSender<String>,
    /// Set once the socket is open, cleared when it ends
    ready: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

/// Persistent channel over a WebSocket.
pub struct WsChannel {
    connect_timeout: Duration,
    active: Mutex<Option<ActiveConnection>>,
}

impl WsChannel {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            active: Mutex::new(None),
        }
    }

    /// Check if a connection is currently open.
    pub async fn is_ready(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|c| c.ready.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

impl Default for WsChannel {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl PersistentChannel for WsChannel {
    async fn establish(&self, url: &str, events: ChannelEvents) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            debug!("Releasing previous connection before establishing");
            previous.ready.store(false, Ordering::SeqCst);
            previous.task.abort();
        }

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let ready = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(connection_task(
            url.to_string(),
            self.connect_timeout,
            outbound_rx,
            events,
            Arc::clone(&ready),
        ));

        *active = Some(ActiveConnection {
            outbound,
            ready,
            task,
        });
    }

    async fn send(&self, frame: String) {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(conn) if conn.ready.load(Ordering::SeqCst) => {
                if conn.outbound.send(frame).is_err() {
                    debug!("Connection task gone, frame dropped");
                }
            }
            _ => debug!("Send while channel not established, ignored"),
        }
    }

    async fn teardown(&self) {
        let Some(conn) = self.active.lock().await.take() else {
            return;
        };
        conn.ready.store(false, Ordering::SeqCst);
        // Dropping the queue lets the task send a close frame and exit.
        drop(conn.outbound);
        debug!("Channel torn down");
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.try_lock() {
            if let Some(conn) = active.take() {
                conn.task.abort();
            }
        }
    }
}

/// Connection task - runs for the lifetime of one connection attempt.
async fn connection_task(
    url: String,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: ChannelEvents,
    ready: Arc<AtomicBool>,
) {
    // The URL carries the credential; only the host is ever logged.
    let host = extract_host(&url).to_string();
    debug!(host = %host, "Connecting to chat backend");

    let ws = match tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((ws, _))) => ws,
        Ok(Err(e)) => {
            warn!(host = %host, error = %e, "WebSocket connect failed");
            let _ = events.send(ChannelEvent::Closed(CloseReason::ConnectFailed(e.to_string())));
            return;
        }
        Err(_) => {
            warn!(host = %host, "WebSocket connect timed out");
            let _ = events.send(ChannelEvent::Closed(CloseReason::ConnectFailed(
                "connect timed out".into(),
            )));
            return;
        }
    };

    info!(host = %host, "WebSocket connected");
    ready.store(true, Ordering::SeqCst);
    let _ = events.send(ChannelEvent::Established);

    let (mut sink, mut stream) = ws.split();

    let reason = loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        break CloseReason::Error(format!("Failed to send: {}", e));
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break CloseReason::Local;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(ChannelEvent::Inbound(text));
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => {
                        let _ = events.send(ChannelEvent::Inbound(text));
                    }
                    Err(_) => debug!("Skipping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!(host = %host, frame = ?frame, "Backend closed connection");
                    break CloseReason::Remote(frame.map(|f| f.reason.to_string()));
                }
                // Pong is handled automatically by tungstenite
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(host = %host, error = %e, "WebSocket error");
                    break CloseReason::Error(e.to_string());
                }
                None => break CloseReason::Remote(None),
            },
        }
    };

    ready.store(false, Ordering::SeqCst);
    debug!(host = %host, reason = %reason, "Connection task ended");
    let _ = events.send(ChannelEvent::Closed(reason));
}

/// Extract host from URL for logging
fn extract_host(url: &str) -> &str {
    url.split("//")
        .nth(1)
        .and_then(|s| s.split(['/', '?']).next())
        .unwrap_or("localhost")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_host() {
        assert_eq!(extract_host("ws://localhost:8100"), "localhost:8100");
        assert_eq!(
            extract_host("wss://chat.alcahub.com.br/api/chat/ws?token=secret"),
            "chat.alcahub.com.br"
        );
        assert_eq!(extract_host("ws://localhost:8100?token=secret"), "localhost:8100");
        assert_eq!(extract_host("invalid"), "localhost");
    }

    #[tokio::test]
    async fn test_send_before_establish_is_ignored() {
        let channel = WsChannel::default();
        channel.send("{}".into()).await;
        assert!(!channel.is_ready().await);
        channel.teardown().await;
        channel.teardown().await;
    }

    #[tokio::test]
    async fn test_unreachable_backend_reports_closed() {
        let channel = WsChannel::new(Duration::from_secs(5));
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Port 1 on loopback refuses connections
        channel.establish("ws://127.0.0.1:1/api/chat/ws", tx).await;

        match rx.recv().await {
            Some(ChannelEvent::Closed(CloseReason::ConnectFailed(_))) => {}
            other => panic!("expected connect failure, got {:?}", other),
        }
    }
}
