//! End-to-end tests of the client over a loopback WebSocket backend

use alca_chat::protocol::OutboundFrame;
use alca_chat::{
    ChatClient, ClientConfig, ClientEvent, ConnectionStatus, Dispatch, MessageOrigin,
    SessionCredentials,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// Start a backend that answers every frame with a `message` reply in
/// conversation `c1`. With `hang_up_first`, the first connection is closed
/// right after the handshake.
async fn start_backend(hang_up_first: bool) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let uris = Arc::new(Mutex::new(Vec::new()));

    let seen = uris.clone();
    tokio::spawn(async move {
        let mut accepted = 0;
        while let Ok((stream, _)) = listener.accept().await {
            accepted += 1;
            let hang_up = hang_up_first && accepted == 1;
            let seen = seen.clone();

            tokio::spawn(async move {
                let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    seen.lock().unwrap().push(req.uri().to_string());
                    Ok(resp)
                };
                let mut ws = accept_hdr_async(stream, callback).await.unwrap();

                if hang_up {
                    let _ = ws.close(None).await;
                    return;
                }

                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        let frame: OutboundFrame = serde_json::from_str(&text).unwrap();
                        let reply = json!({
                            "type": "message",
                            "reply": format!("eco: {}", frame.message),
                            "suggestions": ["Ver saldo"],
                            "conversation_id": "c1"
                        });
                        if ws.send(Message::Text(reply.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });

    (format!("ws://{}/api/chat/ws", addr), uris)
}

fn config(channel_url: String) -> ClientConfig {
    ClientConfig {
        channel_url,
        exchange_url: "http://127.0.0.1:1/api/chat".to_string(),
        reconnect_delay_ms: 100,
        ..ClientConfig::default()
    }
    .without_greeting()
}

/// Wait until an event matching `pred` arrives
async fn wait_for<F>(events: &mut broadcast::Receiver<ClientEvent>, pred: F)
where
    F: Fn(&ClientEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return,
                Ok(_) => continue,
                Err(e) => panic!("event stream ended: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for client event");
}

#[tokio::test]
async fn test_round_trip_over_websocket() {
    let (url, uris) = start_backend(false).await;
    let client = ChatClient::with_network(
        config(url),
        Arc::new(SessionCredentials::signed_in("tok-123")),
    )
    .unwrap();
    let mut events = client.subscribe();

    client.open().await;
    wait_for(&mut events, |e| {
        *e == ClientEvent::StatusChanged(ConnectionStatus::Open)
    })
    .await;
    assert_eq!(uris.lock().unwrap()[0], "/api/chat/ws?token=tok-123");

    assert_eq!(client.send("Qual meu saldo?").await.unwrap(), Dispatch::Channel);
    wait_for(&mut events, |e| {
        matches!(e, ClientEvent::MessageAppended(m) if m.origin == MessageOrigin::Assistant)
    })
    .await;

    let messages = client.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].text, "eco: Qual meu saldo?");
    assert_eq!(messages[1].suggestions, vec!["Ver saldo"]);
    assert_eq!(client.conversation_id().await.as_deref(), Some("c1"));

    client.close().await;
    assert_eq!(client.status().await, ConnectionStatus::Closed);
}

#[tokio::test]
async fn test_reconnects_after_backend_hang_up() {
    let (url, uris) = start_backend(true).await;
    let client = ChatClient::with_network(
        config(url),
        Arc::new(SessionCredentials::signed_in("tok-123")),
    )
    .unwrap();
    let mut events = client.subscribe();

    client.open().await;
    wait_for(&mut events, |e| {
        *e == ClientEvent::StatusChanged(ConnectionStatus::Reconnecting)
    })
    .await;
    wait_for(&mut events, |e| {
        *e == ClientEvent::StatusChanged(ConnectionStatus::Open)
    })
    .await;

    assert_eq!(uris.lock().unwrap().len(), 2);
    assert_eq!(client.send("Oi").await.unwrap(), Dispatch::Channel);
    wait_for(&mut events, |e| {
        matches!(e, ClientEvent::MessageAppended(m) if m.origin == MessageOrigin::Assistant)
    })
    .await;
}

#[tokio::test]
async fn test_unreachable_channel_sends_through_fallback() {
    let client = ChatClient::with_network(
        config("ws://127.0.0.1:1/api/chat/ws".to_string()),
        Arc::new(SessionCredentials::signed_in("tok-123")),
    )
    .unwrap();
    let mut events = client.subscribe();

    client.open().await;
    wait_for(&mut events, |e| {
        *e == ClientEvent::StatusChanged(ConnectionStatus::Closed)
    })
    .await;
    assert!(client.snapshot().await.fallback_active);

    // The fallback endpoint is unreachable too, so the send fails into the log.
    let dispatch = client.send("Oi").await.unwrap();
    assert!(matches!(dispatch, Dispatch::Failed(_)));

    let messages = client.messages().await;
    assert_eq!(messages.last().unwrap().origin, MessageOrigin::Error);
    client.close().await;
}
