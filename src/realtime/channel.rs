//! Reconnecting WebSocket channel to the gateway event stream.
//!
//! A `RealtimeChannel` owns at most one live socket. Inbound JSON messages
//! fan out to any number of subscribers; connection state is published on
//! a `watch` channel. After an abnormal close or a transport error the
//! channel retries on a fixed delay until the reconnection budget runs
//! out. While open, a heartbeat task sends a ping on a fixed interval.
//!
//! Every background task is tagged with the connection generation it was
//! started for. `connect()` and `disconnect()` bump the generation under
//! the state lock, so late events from a replaced socket are ignored and
//! no status is published after a `disconnect()`.

// Author: kelexine (https://github.com/kelexine)

use super::endpoint::resolve_endpoint;
use super::message::{ChannelMessage, ConnectionStatus};
use super::reconnect::{ReconnectDecision, ReconnectPolicy};
use super::CredentialProvider;
use crate::config::RealtimeConfig;
use crate::error::{PortalError, Result};
use crate::utils::logging::sanitize;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, warn};

/// WebSocket close code for an intentional shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

pub type MessageStream = BoxStream<'static, ChannelMessage>;
pub type StatusStream = BoxStream<'static, ConnectionStatus>;

/// Lifecycle phase of the underlying socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Open,
    Reconnecting,
}

/// Handle to a reconnecting realtime channel. Clones share one connection.
#[derive(Clone)]
pub struct RealtimeChannel {
    shared: Arc<Shared>,
}

struct Shared {
    config: RealtimeConfig,
    credentials: Arc<dyn CredentialProvider>,
    inbound: broadcast::Sender<ChannelMessage>,
    status: watch::Sender<ConnectionStatus>,
    state: Mutex<ChannelState>,
}

struct ChannelState {
    phase: Phase,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    driver: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    policy: ReconnectPolicy,
}

enum CloseOutcome {
    Normal,
    Abnormal(Option<u16>),
    Failed(PortalError),
}

impl RealtimeChannel {
    pub fn new(config: RealtimeConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        let (inbound, _) = broadcast::channel(config.inbound_buffer.max(1));
        let (status, _) = watch::channel(ConnectionStatus::closed());
        let policy = ReconnectPolicy::new(config.reconnect_delay(), config.max_reconnect_attempts);

        Self {
            shared: Arc::new(Shared {
                config,
                credentials,
                inbound,
                status,
                state: Mutex::new(ChannelState {
                    phase: Phase::Idle,
                    generation: 0,
                    outbound: None,
                    driver: None,
                    heartbeat: None,
                    reconnect_timer: None,
                    policy,
                }),
            }),
        }
    }

    /// Open the connection and return the stream of all inbound messages.
    ///
    /// Calling this while a socket is open or being opened only returns a
    /// new stream. Missing credentials or an unresolvable endpoint fail
    /// the call, are published on the status stream, and are not retried.
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) -> Result<MessageStream> {
        let messages = self.messages();
        let mut state = self.shared.state.lock();
        self.shared.start(&mut state, true)?;
        Ok(messages)
    }

    /// Serialize and transmit. Logs and drops the message when not open.
    pub fn send(&self, message: &ChannelMessage) {
        let state = self.shared.state.lock();
        if let Err(e) = self.shared.transmit(&state, message) {
            error!("Cannot send {}: {}", message.event, e);
        }
    }

    /// Convenience for `send` with a `"message"` envelope.
    pub fn send_event(&self, event: &str, data: serde_json::Value) {
        self.send(&ChannelMessage::new("message", event, data));
    }

    /// Every inbound message, from now on. Dropping the stream unsubscribes.
    ///
    /// Each subscriber buffers up to `realtime.inbound_buffer` messages. A
    /// subscriber that falls further behind loses the oldest ones (logged
    /// as a lag) and carries on with the rest; other subscribers and the
    /// socket are unaffected.
    pub fn messages(&self) -> MessageStream {
        let mut rx = self.shared.inbound.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(message) => yield message,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Realtime subscriber lagged, skipped {} messages", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Inbound messages whose `event` equals `event`. Buffered and lossy
    /// on lag the same way as [`RealtimeChannel::messages`].
    pub fn on(&self, event: impl Into<String>) -> MessageStream {
        let event = event.into();
        Box::pin(
            self.messages()
                .filter(move |message| futures::future::ready(message.event == event)),
        )
    }

    /// Current status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.borrow().clone()
    }

    /// Current status followed by every change. Never ends on its own.
    /// A slow reader sees the latest state rather than every transition.
    pub fn status_stream(&self) -> StatusStream {
        let mut rx = self.shared.status.subscribe();
        Box::pin(async_stream::stream! {
            let current = rx.borrow_and_update().clone();
            yield current;
            while rx.changed().await.is_ok() {
                let next = rx.borrow_and_update().clone();
                yield next;
            }
        })
    }

    /// Raw watch receiver, for `wait_for` style observers.
    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.lock().phase
    }

    pub fn is_connected(&self) -> bool {
        let state = self.shared.state.lock();
        state.phase == Phase::Open && state.outbound.is_some()
    }

    /// Close with a normal-closure code and stop all timers. Safe to call
    /// at any time; no status is published afterwards until the next
    /// `connect()`.
    pub fn disconnect(&self) {
        let mut state = self.shared.state.lock();
        state.generation += 1;

        if let Some(timer) = state.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(heartbeat) = state.heartbeat.take() {
            heartbeat.abort();
        }

        let driver = state.driver.take();
        match state.outbound.take() {
            Some(outbound) => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "Client disconnect".into(),
                };
                // The driver flushes the close frame and exits.
                let _ = outbound.send(Message::Close(Some(frame)));
            }
            None => {
                if let Some(driver) = driver {
                    driver.abort();
                }
            }
        }

        if state.phase != Phase::Idle {
            info!("Realtime channel disconnected");
            crate::metrics::record_connection("closed");
        }
        state.phase = Phase::Idle;
        self.shared.publish(ConnectionStatus::closed());
    }
}

impl Shared {
    fn publish(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }

    /// Begin a connection attempt. Caller holds the state lock.
    fn start(self: &Arc<Self>, state: &mut ChannelState, explicit: bool) -> Result<()> {
        if matches!(state.phase, Phase::Open | Phase::Connecting) {
            debug!("Realtime channel already {:?}, reusing it", state.phase);
            return Ok(());
        }

        if explicit {
            if let Some(timer) = state.reconnect_timer.take() {
                timer.abort();
            }
            state.policy.reset();
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PortalError::Internal(format!("No Tokio runtime: {}", e)))?;

        let token = match self.credentials.credential() {
            Some(token) => token,
            None => {
                error!("No authentication token available, not connecting");
                return Err(self.fail_start(state, PortalError::MissingCredential));
            }
        };

        let url = match resolve_endpoint(&self.config, &token) {
            Ok(url) => url,
            Err(e) => {
                error!("{}", e);
                return Err(self.fail_start(state, e));
            }
        };

        state.generation += 1;
        state.phase = Phase::Connecting;
        let generation = state.generation;

        info!("Connecting to {}", sanitize(&url));
        let shared = Arc::clone(self);
        state.driver = Some(runtime.spawn(async move {
            shared.drive(generation, url).await;
        }));

        Ok(())
    }

    /// Configuration failures end the attempt without a retry.
    fn fail_start(&self, state: &mut ChannelState, e: PortalError) -> PortalError {
        state.phase = Phase::Idle;
        crate::metrics::record_connection("failed");
        self.publish(ConnectionStatus::failed(e.to_string()));
        e
    }

    /// Owns one socket from dial to close.
    async fn drive(self: Arc<Self>, generation: u64, url: String) {
        let socket = match connect_async(url.as_str()).await {
            Ok((socket, _response)) => socket,
            Err(e) => {
                self.on_closed(generation, CloseOutcome::Failed(connect_error(e)));
                return;
            }
        };

        let (mut sink, mut source) = socket.split();
        let (outbound, mut pending) = mpsc::unbounded_channel::<Message>();

        if !self.on_open(generation, outbound) {
            let _ = sink.close().await;
            return;
        }

        let outcome = loop {
            tokio::select! {
                queued = pending.recv() => match queued {
                    Some(message) => {
                        let closing = matches!(message, Message::Close(_));
                        if let Err(e) = sink.send(message).await {
                            error!("Failed to transmit realtime message: {}", e);
                            if !closing {
                                break CloseOutcome::Failed(PortalError::Transport(e.to_string()));
                            }
                        }
                        if closing {
                            break CloseOutcome::Normal;
                        }
                    }
                    None => break CloseOutcome::Normal,
                },
                incoming = source.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => self.dispatch(&text),
                        Err(_) => {
                            crate::metrics::record_message("dropped");
                            warn!("Dropping non UTF-8 binary realtime frame");
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code));
                        break match code {
                            Some(NORMAL_CLOSURE) => CloseOutcome::Normal,
                            other => CloseOutcome::Abnormal(other),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break CloseOutcome::Failed(PortalError::Transport(e.to_string())),
                    None => break CloseOutcome::Abnormal(None),
                },
            }
        };

        self.on_closed(generation, outcome);
    }

    fn on_open(self: &Arc<Self>, generation: u64, outbound: mpsc::UnboundedSender<Message>) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!("Discarding socket for superseded connection {}", generation);
            return false;
        }

        state.phase = Phase::Open;
        state.outbound = Some(outbound);
        state.policy.reset();

        if let Some(previous) = state.heartbeat.take() {
            previous.abort();
        }
        state.heartbeat = Some(self.spawn_heartbeat(generation));

        info!("Realtime channel connected");
        crate::metrics::record_connection("opened");
        self.publish(ConnectionStatus::open());
        true
    }

    fn spawn_heartbeat(self: &Arc<Self>, generation: u64) -> JoinHandle<()> {
        let shared = Arc::clone(self);
        let period = self.config.heartbeat_interval().max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let still_open = {
                    let state = shared.state.lock();
                    let current = state.generation == generation && state.phase == Phase::Open;
                    if current {
                        match shared.transmit(&state, &ChannelMessage::ping()) {
                            Ok(()) => crate::metrics::record_message("heartbeat"),
                            Err(e) => warn!("Heartbeat ping failed: {}", e),
                        }
                    }
                    current
                };
                if !still_open {
                    break;
                }
            }
        })
    }

    fn on_closed(self: &Arc<Self>, generation: u64, outcome: CloseOutcome) {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!("Ignoring close of superseded connection {}", generation);
            return;
        }

        state.outbound = None;
        state.driver = None;
        if let Some(heartbeat) = state.heartbeat.take() {
            heartbeat.abort();
        }

        match outcome {
            CloseOutcome::Normal => {
                info!("Realtime channel closed by server");
                state.phase = Phase::Idle;
                crate::metrics::record_connection("closed");
                self.publish(ConnectionStatus::closed());
            }
            CloseOutcome::Abnormal(code) => {
                warn!("Realtime channel closed abnormally (code {:?})", code);
                crate::metrics::record_connection("abnormal");
                self.schedule_reconnect(&mut state);
            }
            CloseOutcome::Failed(e) if e.is_transient() => {
                error!("Realtime transport error: {}", sanitize(&e.to_string()));
                crate::metrics::record_connection("abnormal");
                self.schedule_reconnect(&mut state);
            }
            CloseOutcome::Failed(e) => {
                error!("Realtime connection failed, not retrying: {}", sanitize(&e.to_string()));
                state.phase = Phase::Idle;
                crate::metrics::record_connection("failed");
                self.publish(ConnectionStatus::failed(sanitize(&e.to_string())));
            }
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut ChannelState) {
        if state.reconnect_timer.is_some() {
            debug!("Reconnect already pending");
            return;
        }

        match state.policy.on_failure() {
            ReconnectDecision::Retry { attempt, delay } => {
                info!(
                    "Reconnecting in {}ms (attempt {}/{})",
                    delay.as_millis(),
                    attempt,
                    state.policy.max_attempts()
                );
                state.phase = Phase::Reconnecting;
                crate::metrics::record_reconnect("scheduled");
                self.publish(ConnectionStatus::reconnecting());

                let shared = Arc::clone(self);
                let generation = state.generation;
                state.reconnect_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    shared.retry(generation);
                }));
            }
            ReconnectDecision::GiveUp { attempts } => {
                error!("Giving up on realtime channel after {} attempts", attempts);
                state.phase = Phase::Idle;
                crate::metrics::record_reconnect("exhausted");
                self.publish(ConnectionStatus::failed("Max reconnection attempts reached"));
            }
        }
    }

    fn retry(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        // this task is the timer; let go of its handle without aborting it
        state.reconnect_timer = None;

        if let Err(e) = self.start(&mut state, false) {
            debug!("Reconnect attempt could not start: {}", e);
        }
    }

    /// Queue one message on the open socket. Caller holds the state lock.
    fn transmit(&self, state: &ChannelState, message: &ChannelMessage) -> Result<()> {
        let outbound = match (&state.outbound, state.phase) {
            (Some(outbound), Phase::Open) => outbound,
            _ => return Err(PortalError::NotConnected),
        };

        let json = serde_json::to_string(message)?;
        outbound
            .send(Message::Text(json))
            .map_err(|_| PortalError::Transport("socket writer is gone".to_string()))?;

        crate::metrics::record_message("outbound");
        Ok(())
    }

    /// Malformed payloads are logged and dropped; the socket stays up.
    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<ChannelMessage>(text) {
            Ok(message) => {
                crate::metrics::record_message("inbound");
                debug!("Realtime event {} ({})", message.event, message.kind);
                // no subscribers is fine
                let _ = self.inbound.send(message);
            }
            Err(e) => {
                crate::metrics::record_message("dropped");
                error!("Dropping malformed realtime message: {}", e);
            }
        }
    }
}

/// Handshake failures that retrying cannot fix are not transient.
fn connect_error(e: WsError) -> PortalError {
    match e {
        WsError::Url(e) => PortalError::Endpoint(e.to_string()),
        other => PortalError::Transport(other.to_string()),
    }
}
