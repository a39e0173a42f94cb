//! ChatClient - the single authority over transport selection and lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                      ChatClient                        │
//! │  - open() / close() / send(text)                       │
//! │  - owns ConnectionStatus via TransportState            │
//! │  - schedules the fixed-delay reconnection              │
//! └────────────────────────────────────────────────────────┘
//!        │                 │                    │
//!        ▼                 ▼                    ▼
//!  PersistentChannel  FallbackTransport  ConversationCorrelator
//!        │                 │                    │
//!        └─────────────────┴──────► MessageLog ◄┘
//! ```
//!
//! # Transport selection
//!
//! Decided once per `send()`: if the status is `Open` the frame goes on the
//! channel, otherwise it goes through the fallback. Never both.
//!
//! # Ordering
//!
//! The user message is appended before its frame is dispatched. Channel
//! events are applied one at a time, in delivery order, by a pump task bound
//! to the connection attempt that produced them. Every append happens while
//! the controller state lock is held and after checking that the attempt (or
//! the epoch, for fallback replies) is still current, so nothing is appended
//! once `close()` has returned.
//!
//! # Reconnection
//!
//! A failed establishment leaves the status `Closed` with the fallback flag
//! set; a drop after `Open` moves to `Reconnecting`. Either way, while the
//! caller still wants the channel open, a retry is attempted after the fixed
//! delay. There is no attempt cap and no backoff: the fallback already covers
//! delivery, so retrying only restores the cheaper path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[cfg(feature = "typescript")]
use ts_rs::TS;

use crate::channel::{ChannelEvent, CloseReason, PersistentChannel, WsChannel};
use crate::config::ClientConfig;
use crate::conversation::ConversationCorrelator;
use crate::credentials::CredentialSource;
use crate::error::ClientError;
use crate::fallback::{FallbackTransport, HttpFallback};
use crate::message::{Message, MessageLog};
use crate::protocol::{decode_inbound, InboundFrame, OutboundFrame};
use crate::status::{ConnectionStatus, TransportState};

/// Notification for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// ConnectionStatus changed
    StatusChanged(ConnectionStatus),
    /// A message was appended to the log
    MessageAppended(Message),
}

/// Route a `send()` took and how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Queued on the persistent channel; the reply arrives as an event
    Channel,
    /// Answered through the fallback; the reply is in the log
    Fallback,
    /// The fallback failed; an error entry is in the log
    Failed(String),
    /// The fallback reply was malformed and dropped
    Dropped,
    /// The client was closed before the fallback answered; result discarded
    Discarded,
}

/// Read-only view of the client for rendering.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ChatSnapshot {
    pub status: ConnectionStatus,
    /// Connectivity indicator
    pub channel_open: bool,
    /// Last establishment failed and sends use the fallback
    pub fallback_active: bool,
    pub conversation_id: Option<String>,
    pub messages: Vec<Message>,
    /// Fallback exchanges still awaiting a reply
    pub pending_exchanges: usize,
}

#[derive(Default)]
struct ControllerState {
    transport: TransportState,
    /// Applies events of the current connection attempt
    pump_task: Option<JoinHandle<()>>,
    /// Pending reconnection timer
    reconnect_task: Option<JoinHandle<()>>,
    /// Closes the client on sign-out
    auth_task: Option<JoinHandle<()>>,
}

impl ControllerState {
    fn abort_tasks(&mut self) {
        if let Some(task) = self.reconnect_task.take() {
            task.abort();
        }
        if let Some(task) = self.pump_task.take() {
            task.abort();
        }
    }
}

struct Inner {
    config: ClientConfig,
    credentials: Arc<dyn CredentialSource>,
    channel: Arc<dyn PersistentChannel>,
    fallback: Arc<dyn FallbackTransport>,
    log: MessageLog,
    conversation: ConversationCorrelator,
    state: Mutex<ControllerState>,
    events: broadcast::Sender<ClientEvent>,
    pending_exchanges: AtomicUsize,
}

/// Real-time assistant messaging client.
///
/// Create one when the chat surface becomes visible for a signed-in user and
/// drop it (or call `close()`) when the surface is hidden. Message and
/// conversation state live exactly as long as the client.
pub struct ChatClient {
    inner: Arc<Inner>,
}

impl ChatClient {
    /// Create a client over the given collaborators.
    pub fn new(
        config: ClientConfig,
        credentials: Arc<dyn CredentialSource>,
        channel: Arc<dyn PersistentChannel>,
        fallback: Arc<dyn FallbackTransport>,
    ) -> Self {
        let log = match &config.greeting {
            Some(greeting) => MessageLog::with_greeting(greeting.clone()),
            None => MessageLog::new(),
        };
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            inner: Arc::new(Inner {
                config,
                credentials,
                channel,
                fallback,
                log,
                conversation: ConversationCorrelator::new(),
                state: Mutex::new(ControllerState::default()),
                events,
                pending_exchanges: AtomicUsize::new(0),
            }),
        }
    }

    /// Create a client using the WebSocket channel and HTTP fallback.
    pub fn with_network(
        config: ClientConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, ClientError> {
        config.validate()?;

        let channel = Arc::new(WsChannel::new(config.connect_timeout()));
        let fallback = Arc::new(
            HttpFallback::from_config(&config).map_err(|e| ClientError::Config(e.to_string()))?,
        );

        Ok(Self::new(config, credentials, channel, fallback))
    }

    /// Open the persistent channel.
    ///
    /// No-op if already open or connecting. Stays `Closed` without error if
    /// the user is not signed in or no credential is available.
    pub async fn open(&self) {
        let inner = &self.inner;

        if !inner.credentials.is_authenticated() {
            debug!("open() while signed out, ignored");
            return;
        }
        let Some(credential) = inner.credentials.current_credential() else {
            debug!("open() without a credential, staying closed");
            return;
        };
        let url = match inner.config.channel_url_with_token(&credential) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Invalid channel URL, staying closed");
                return;
            }
        };

        let mut state = inner.state.lock().await;
        inner.watch_auth(&mut state);

        let Some(attempt) = state.transport.begin_connect() else {
            debug!(status = %state.transport.status(), "open() while active, ignored");
            return;
        };
        if let Some(task) = state.reconnect_task.take() {
            task.abort();
        }

        info!(attempt = attempt, "Opening chat channel");
        inner.connect(&mut state, attempt, url).await;
    }

    /// Tear down the channel, cancel any pending retry and set `Closed`.
    ///
    /// Idempotent. In-flight fallback exchanges are left to finish but their
    /// results are discarded.
    pub async fn close(&self) {
        self.inner.shutdown().await;
    }

    /// Send a user message.
    ///
    /// The message is appended to the log immediately. If the channel is open
    /// the frame is queued on it and this returns without waiting for the
    /// reply. Otherwise the fallback is awaited and its reply (or an error
    /// entry) is appended before returning.
    pub async fn send(&self, text: &str) -> Result<Dispatch, ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let inner = &self.inner;
        if !inner.credentials.is_authenticated() {
            warn!("send() while signed out, rejected");
            inner.shutdown().await;
            return Err(ClientError::Unauthenticated);
        }

        let (frame, epoch) = {
            let state = inner.state.lock().await;

            inner.append(Message::user(text)).await;
            let frame = inner.conversation.attach(text).await;

            if state.transport.is_open() {
                inner.channel.send(frame.encode()?).await;
                debug!(has_conversation = frame.conversation_id.is_some(), "Sent on channel");
                return Ok(Dispatch::Channel);
            }

            (frame, state.transport.epoch())
        };

        inner.exchange(frame, epoch).await
    }

    /// Send the suggestion at `index` of message `message_id` as if typed.
    pub async fn choose_suggestion(
        &self,
        message_id: &str,
        index: usize,
    ) -> Result<Dispatch, ClientError> {
        let message = self
            .inner
            .log
            .get(message_id)
            .await
            .ok_or_else(|| ClientError::UnknownMessage(message_id.to_string()))?;

        let suggestion = message
            .suggestions
            .get(index)
            .ok_or_else(|| ClientError::NoSuchSuggestion {
                message_id: message_id.to_string(),
                index,
            })?;

        self.send(suggestion).await
    }

    /// Subscribe to status changes and log appends.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().await.transport.status()
    }

    /// Whether the persistent channel is currently open.
    pub async fn is_channel_open(&self) -> bool {
        self.inner.state.lock().await.transport.is_open()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.inner.log.snapshot().await
    }

    pub async fn conversation_id(&self) -> Option<String> {
        self.inner.conversation.current().await
    }

    /// Everything the presentation layer needs to render.
    pub async fn snapshot(&self) -> ChatSnapshot {
        let (status, fallback_active) = {
            let state = self.inner.state.lock().await;
            (state.transport.status(), state.transport.fallback_active())
        };

        ChatSnapshot {
            status,
            channel_open: status == ConnectionStatus::Open,
            fallback_active,
            conversation_id: self.inner.conversation.current().await,
            messages: self.inner.log.snapshot().await,
            pending_exchanges: self.inner.pending_exchanges.load(Ordering::SeqCst),
        }
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        // Background tasks hold the inner state; they must be stopped here or
        // the retry timer would keep the connection alive forever.
        if let Ok(mut state) = self.inner.state.try_lock() {
            state.transport.shut();
            state.abort_tasks();
            if let Some(task) = state.auth_task.take() {
                task.abort();
            }
        }

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let inner = Arc::clone(&self.inner);
            handle.spawn(async move {
                inner.shutdown().await;
                if let Some(task) = inner.state.lock().await.auth_task.take() {
                    task.abort();
                }
            });
        } else {
            debug!("Client dropped outside a runtime, channel not torn down");
        }
    }
}

impl Inner {
    /// Append to the log and notify subscribers.
    async fn append(&self, message: Message) -> Message {
        let stored = self.log.append(message).await;
        let _ = self.events.send(ClientEvent::MessageAppended(stored.clone()));
        stored
    }

    fn publish_status(&self, status: ConnectionStatus) {
        let _ = self.events.send(ClientEvent::StatusChanged(status));
    }

    /// Start `attempt`: spawn its event pump, then ask the channel to connect.
    async fn connect(self: &Arc<Self>, state: &mut ControllerState, attempt: u64, url: String) {
        self.publish_status(ConnectionStatus::Connecting);

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(previous) = state.pump_task.take() {
            previous.abort();
        }
        state.pump_task = Some(tokio::spawn(pump(Arc::clone(self), attempt, rx)));

        self.channel.establish(&url, tx).await;
    }

    /// Apply one event reported by the channel for `attempt`.
    async fn handle_channel_event(self: &Arc<Self>, attempt: u64, event: ChannelEvent) {
        let mut state = self.state.lock().await;
        if !state.transport.is_current(attempt) {
            debug!(attempt = attempt, event = ?event, "Dropping event from stale attempt");
            return;
        }

        match event {
            ChannelEvent::Established => {
                if state.transport.on_established(attempt) {
                    info!(attempt = attempt, "Chat channel open");
                    self.publish_status(ConnectionStatus::Open);
                }
            }
            ChannelEvent::Inbound(raw) => match decode_inbound(&raw) {
                Ok(frame) => self.apply_frame(frame).await,
                Err(e) => warn!(error = %e, len = raw.len(), "Dropping malformed inbound frame"),
            },
            ChannelEvent::Closed(reason) => {
                let Some(outcome) = state.transport.on_closed(attempt) else {
                    return;
                };

                match outcome.from {
                    ConnectionStatus::Connecting => warn!(
                        attempt = attempt,
                        reason = %reason,
                        "Chat channel failed to open, using fallback"
                    ),
                    _ => warn!(attempt = attempt, reason = %reason, "Chat channel dropped"),
                }
                self.publish_status(outcome.to);

                if outcome.retry {
                    self.schedule_retry(&mut state);
                }
            }
        }
    }

    async fn apply_frame(&self, frame: InboundFrame) {
        self.conversation.adopt(frame.conversation_id()).await;

        let message = match frame {
            InboundFrame::Message {
                reply,
                id,
                suggestions,
                timestamp,
                ..
            } => Message::assistant(reply)
                .with_id(id)
                .with_suggestions(suggestions)
                .with_timestamp(timestamp.and_then(|t| t.to_datetime())),
            InboundFrame::System { message, .. } => Message::system(message),
            InboundFrame::Error { message } => Message::error(message),
        };

        self.append(message).await;
    }

    /// Arm the fixed-delay retry timer, replacing any pending one.
    fn schedule_retry(self: &Arc<Self>, state: &mut ControllerState) {
        if let Some(task) = state.reconnect_task.take() {
            task.abort();
        }

        let delay = self.config.reconnect_delay();
        debug!(delay_ms = delay.as_millis() as u64, "Scheduling channel retry");

        let inner = Arc::clone(self);
        state.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.retry().await;
        }));
    }

    /// Called by the retry timer once the delay elapsed.
    async fn retry(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        // This task is the one being cleared; dropping the handle detaches it.
        state.reconnect_task = None;

        if !state.transport.desired_open() {
            return;
        }
        if !self.credentials.is_authenticated() {
            info!("Signed out before retry, closing chat client");
            drop(state);
            self.shutdown().await;
            return;
        }
        // A missing credential is usually a refresh in progress; try again later.
        let Some(url) = self
            .credentials
            .current_credential()
            .and_then(|c| self.config.channel_url_with_token(&c).ok())
        else {
            debug!("No usable credential yet, retry postponed");
            self.schedule_retry(&mut state);
            return;
        };

        if let Some(attempt) = state.transport.begin_retry() {
            info!(attempt = attempt, "Retrying chat channel");
            self.connect(&mut state, attempt, url).await;
        }
    }

    /// Deliver `frame` through the fallback transport.
    async fn exchange(&self, frame: OutboundFrame, epoch: u64) -> Result<Dispatch, ClientError> {
        let Some(credential) = self.credentials.current_credential() else {
            let state = self.state.lock().await;
            if state.transport.epoch() != epoch {
                return Ok(Dispatch::Discarded);
            }
            warn!("Fallback send without a credential");
            self.append(Message::error(self.config.missing_credential_text.clone()))
                .await;
            return Ok(Dispatch::Failed(ClientError::Unauthenticated.to_string()));
        };

        let result = {
            let _pending = PendingExchange::start(&self.pending_exchanges);
            self.fallback.exchange(&frame, &credential).await
        };

        let state = self.state.lock().await;
        if state.transport.epoch() != epoch {
            debug!("Client closed during fallback exchange, result discarded");
            return Ok(Dispatch::Discarded);
        }

        match result {
            Ok(reply) => {
                self.conversation.adopt(reply.conversation_id.as_deref()).await;
                self.append(Message::assistant(reply.reply).with_suggestions(reply.suggestions))
                    .await;
                Ok(Dispatch::Fallback)
            }
            Err(e) if e.is_malformed() => {
                warn!(error = %e, "Dropping malformed fallback reply");
                Ok(Dispatch::Dropped)
            }
            Err(e) => {
                warn!(error = %e, "Fallback exchange failed");
                self.append(Message::error(
                    e.user_message(&self.config.fallback_error_text),
                ))
                .await;
                Ok(Dispatch::Failed(e.to_string()))
            }
        }
    }

    /// Shared implementation of `close()`.
    async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.abort_tasks();
        let previous = state.transport.shut();

        self.channel.teardown().await;

        if previous != ConnectionStatus::Closed {
            info!(previous = %previous, "Chat client closed");
            self.publish_status(ConnectionStatus::Closed);
        }
    }

    /// Close the client whenever the credential source reports sign-out.
    fn watch_auth(self: &Arc<Self>, state: &mut ControllerState) {
        if state.auth_task.is_some() {
            return;
        }
        let Some(mut changes) = self.credentials.auth_changes() else {
            return;
        };

        let weak: Weak<Inner> = Arc::downgrade(self);
        state.auth_task = Some(tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                if *changes.borrow_and_update() {
                    continue;
                }
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                info!("Signed out, closing chat client");
                inner.shutdown().await;
            }
        }));
    }
}

/// Counts one outstanding fallback exchange until dropped.
///
/// Dropping covers the caller abandoning `send()` mid-exchange.
struct PendingExchange<'a>(&'a AtomicUsize);

impl<'a> PendingExchange<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingExchange<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Event pump - applies the events of one connection attempt in order.
async fn pump(inner: Arc<Inner>, attempt: u64, mut events: mpsc::UnboundedReceiver<ChannelEvent>) {
    while let Some(event) = events.recv().await {
        let closed = matches!(event, ChannelEvent::Closed(_));
        inner.handle_channel_event(attempt, event).await;
        if closed {
            return;
        }
    }

    // The channel dropped its sender without reporting a close.
    inner
        .handle_channel_event(attempt, ChannelEvent::Closed(CloseReason::Remote(None)))
        .await;
}
