//! # WebSocket Protocol Client
//!
//! Correlated request/response messaging over one backend socket, with
//! heartbeat, automatic reconnect and per-type message routing.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! Disconnected ──connect()──> Connecting ──open──> Connected
//!      ^                          │                    │
//!      │                    open failed         socket lost / no pong
//!      │                          v                    v
//!      └──────── delay = base * 2^(attempt-1) ─── reconnect
//! ```
//!
//! An unexpected close schedules reconnects until
//! `max_reconnect_attempts` is used up; then `ReconnectExhausted` is
//! published. [`disconnect`](WebSocketProtocolClient::disconnect) suppresses
//! reconnecting. A failed first `connect()` is returned to the caller and not
//! retried.
//!
//! Each socket gets a generation number. Reader, writer and heartbeat tasks
//! carry the generation they were started for, so a loss reported by two of
//! them, or by a task of an older socket, is handled once.
//!
//! ## Routing
//!
//! An inbound message that matches an outstanding request's correlation id
//! completes that request and goes nowhere else. Anything else is passed to
//! every handler registered for its type. A server `ping` is answered with a
//! `pong` carrying the same correlation id. Handler errors and panics are
//! reported to the error handlers and never stop the read loop.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use core_protocol::{MessageType, ProtocolConfig, SendOptions, WebSocketProtocolClient};
//! use bridge_traits::{SystemClock, WebSocketConnector};
//! use std::sync::Arc;
//!
//! # async fn run(connector: Arc<dyn WebSocketConnector>) -> core_protocol::Result<()> {
//! let client = WebSocketProtocolClient::new(
//!     "ws://localhost:8765/ws",
//!     connector,
//!     Arc::new(SystemClock),
//!     ProtocolConfig::default(),
//! )?;
//! client.connect().await?;
//!
//! client.on(MessageType::PlayerState, |message| {
//!     println!("player state: {:?}", message.payload);
//!     Ok(())
//! });
//!
//! let reply = client
//!     .send(MessageType::QueueClear, None, SendOptions::request())
//!     .await?;
//! println!("server answered {:?}", reply);
//! # Ok(())
//! # }
//! ```

use crate::backoff::ReconnectPolicy;
use crate::config::ProtocolConfig;
use crate::error::{ProtocolError, Result};
use crate::message::{MessagePriority, MessageType, SendOptions, WsMessage};
use crate::pending::PendingResponses;
use bridge_traits::time::Clock;
use bridge_traits::websocket::{
    WebSocketChannel, WebSocketConnector, WebSocketSink, WebSocketStream, WsFrame,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{ConnectionEvent, ListenerId, ListenerRegistry, ListenerResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Outbound {
    Text(String),
    Close,
}

#[derive(Default)]
struct SocketTasks {
    reader: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl SocketTasks {
    fn abort(&mut self) {
        for handle in [self.reader.take(), self.heartbeat.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

struct Link {
    state: ConnectionState,
    /// Bumped for every opened socket.
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    tasks: SocketTasks,
    reconnect: Option<JoinHandle<()>>,
    reconnect_attempts: u32,
    intentional_close: bool,
    pong_listener: Option<ListenerId>,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            generation: 0,
            outbound: None,
            tasks: SocketTasks::default(),
            reconnect: None,
            reconnect_attempts: 0,
            intentional_close: false,
            pong_listener: None,
        }
    }
}

struct ClientInner {
    config: ProtocolConfig,
    policy: ReconnectPolicy,
    url: String,
    connector: Arc<dyn WebSocketConnector>,
    clock: Arc<dyn Clock>,
    link: Mutex<Link>,
    /// Mirrors `Link::state` for callers waiting on a transition.
    state_tx: watch::Sender<ConnectionState>,
    pending: Arc<PendingResponses>,
    handlers: ListenerRegistry<MessageType, WsMessage>,
    connection_listeners: ListenerRegistry<(), ConnectionEvent>,
    error_handlers: ListenerRegistry<(), ProtocolError>,
}

impl ClientInner {
    fn message(
        &self,
        message_type: MessageType,
        payload: Option<Value>,
        priority: MessagePriority,
    ) -> WsMessage {
        let mut message = WsMessage::new(message_type, self.clock.now()).with_priority(priority);
        message.payload = payload;
        message
    }

    fn transmit(&self, message: &WsMessage) -> Result<()> {
        let text = message.to_json()?;
        let link = self.link.lock();
        match (&link.state, &link.outbound) {
            (ConnectionState::Connected, Some(outbound)) => outbound
                .send(Outbound::Text(text))
                .map_err(|_| ProtocolError::NotConnected),
            _ => Err(ProtocolError::NotConnected),
        }
    }

    fn set_state(&self, link: &mut Link, state: ConnectionState) {
        link.state = state;
        self.state_tx.send_replace(state);
    }

    fn notify(&self, event: ConnectionEvent) {
        self.connection_listeners.emit(&(), &event);
    }

    fn report_error(&self, error: ProtocolError) {
        warn!(error = %error, "Protocol error");
        self.error_handlers.emit(&(), &error);
    }

    // ========================================================================
    // Socket Setup
    // ========================================================================

    async fn open(self: &Arc<Self>) -> Result<()> {
        let WebSocketChannel { sink, stream } = self.connector.connect(&self.url).await?;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let generation = {
            let mut link = self.link.lock();
            if link.intentional_close || link.state != ConnectionState::Connecting {
                tokio::spawn(close_quietly(sink));
                None
            } else {
                link.generation += 1;
                let generation = link.generation;
                self.set_state(&mut link, ConnectionState::Connected);
                link.outbound = Some(outbound);
                link.reconnect_attempts = 0;

                tokio::spawn(Arc::clone(self).run_writer(sink, outbound_rx, generation));
                link.tasks.reader = Some(tokio::spawn(
                    Arc::clone(self).run_reader(stream, generation),
                ));
                Some(generation)
            }
        };

        let Some(generation) = generation else {
            return Err(ProtocolError::ConnectionClosed);
        };

        info!(url = %self.url, generation, "WebSocket connected");
        self.notify(ConnectionEvent::Connected);
        if self.config.enable_heartbeat {
            self.start_heartbeat(generation);
        }
        Ok(())
    }

    async fn run_writer(
        self: Arc<Self>,
        mut sink: Box<dyn WebSocketSink>,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        generation: u64,
    ) {
        while let Some(frame) = outbound.recv().await {
            match frame {
                Outbound::Text(text) => {
                    if let Err(err) = sink.send_text(text).await {
                        warn!(generation, error = %err, "WebSocket write failed");
                        self.handle_connection_lost(generation, Some(err.to_string()));
                        break;
                    }
                }
                Outbound::Close => break,
            }
        }
        close_quietly(sink).await;
    }

    async fn run_reader(self: Arc<Self>, mut stream: Box<dyn WebSocketStream>, generation: u64) {
        let reason = loop {
            match stream.next_frame().await {
                Some(Ok(WsFrame::Text(text))) => self.handle_text(&text),
                Some(Ok(WsFrame::Close(reason))) => break reason,
                Some(Err(err)) => break Some(err.to_string()),
                None => break None,
            }
        };
        self.handle_connection_lost(generation, reason);
    }

    // ========================================================================
    // Heartbeat
    // ========================================================================

    /// Replace the pong subscription and heartbeat task for `generation`.
    fn start_heartbeat(self: &Arc<Self>, generation: u64) {
        let mut link = self.link.lock();
        if link.generation != generation || link.state != ConnectionState::Connected {
            return;
        }

        if let Some(previous) = link.pong_listener.take() {
            self.handlers.off(&MessageType::Pong, previous);
        }
        let (pong_tx, pong_rx) = mpsc::unbounded_channel();
        link.pong_listener = Some(self.handlers.on(MessageType::Pong, move |_| {
            let _ = pong_tx.send(());
            Ok(())
        }));

        if let Some(previous) = link.tasks.heartbeat.take() {
            previous.abort();
        }
        link.tasks.heartbeat = Some(tokio::spawn(
            Arc::clone(self).run_heartbeat(generation, pong_rx),
        ));
    }

    async fn run_heartbeat(
        self: Arc<Self>,
        generation: u64,
        mut pongs: mpsc::UnboundedReceiver<()>,
    ) {
        let period = self.config.heartbeat_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            while pongs.try_recv().is_ok() {}

            let ping = self.message(MessageType::Ping, None, MessagePriority::Critical);
            if let Err(err) = self.transmit(&ping) {
                debug!(generation, error = %err, "Heartbeat stopped");
                return;
            }
            trace!(correlation_id = %ping.correlation_id, "Ping sent");

            match timeout(self.config.pong_timeout, pongs.recv()).await {
                Ok(Some(())) => trace!("Pong received"),
                Ok(None) => return,
                Err(_) => {
                    warn!(
                        generation,
                        pong_timeout_ms = self.config.pong_timeout.as_millis() as u64,
                        "No pong received, closing socket"
                    );
                    self.handle_connection_lost(generation, Some("Heartbeat timeout".to_string()));
                    return;
                }
            }
        }
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    fn handle_text(&self, text: &str) {
        match WsMessage::from_json(text) {
            Ok(message) => self.route(message),
            Err(err) => self.report_error(ProtocolError::Serialization(err)),
        }
    }

    fn route(&self, message: WsMessage) {
        let Some(message) = self.pending.resolve(message) else {
            return;
        };

        if message.message_type == MessageType::Ping {
            let pong = WsMessage::reply_to(&message, MessageType::Pong, self.clock.now())
                .with_priority(MessagePriority::Critical);
            if let Err(err) = self.transmit(&pong) {
                debug!(error = %err, "Could not answer server ping");
            }
        }

        let message_type = message.message_type;
        trace!(%message_type, correlation_id = %message.correlation_id, "Dispatching message");
        for failure in self.handlers.emit(&message_type, &message) {
            self.report_error(ProtocolError::Handler {
                message_type,
                reason: failure.reason,
            });
        }
    }

    // ========================================================================
    // Loss & Reconnect
    // ========================================================================

    fn handle_connection_lost(self: &Arc<Self>, generation: u64, reason: Option<String>) {
        let (reconnect, pong_listener) = {
            let mut link = self.link.lock();
            if link.generation != generation || link.state != ConnectionState::Connected {
                return;
            }
            self.set_state(&mut link, ConnectionState::Disconnected);
            if let Some(outbound) = link.outbound.take() {
                let _ = outbound.send(Outbound::Close);
            }
            link.tasks.abort();
            (!link.intentional_close, link.pong_listener.take())
        };

        if let Some(id) = pong_listener {
            self.handlers.off(&MessageType::Pong, id);
        }
        let rejected = self.pending.reject_all(|| ProtocolError::ConnectionClosed);
        warn!(
            generation,
            reason = reason.as_deref().unwrap_or("stream ended"),
            rejected,
            "WebSocket connection lost"
        );
        self.notify(ConnectionEvent::Disconnected { reason });

        if reconnect {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let attempt = {
            let mut link = self.link.lock();
            if link.intentional_close {
                return;
            }
            link.reconnect_attempts += 1;
            link.reconnect_attempts
        };

        let Some(delay) = self.policy.delay_for(attempt) else {
            let attempts = attempt - 1;
            self.notify(ConnectionEvent::ReconnectExhausted { attempts });
            self.report_error(ProtocolError::ReconnectExhausted { attempts });
            return;
        };

        let delay_ms = delay.as_millis() as u64;
        info!(attempt, delay_ms, "Scheduling reconnect");
        self.notify(ConnectionEvent::ReconnectScheduled { attempt, delay_ms });

        let handle = tokio::spawn(Arc::clone(self).reconnect_after(delay, attempt));
        if let Some(previous) = self.link.lock().reconnect.replace(handle) {
            previous.abort();
        }
    }

    async fn reconnect_after(self: Arc<Self>, delay: Duration, attempt: u32) {
        sleep(delay).await;

        let proceed = {
            let mut link = self.link.lock();
            if link.intentional_close || link.state != ConnectionState::Disconnected {
                false
            } else {
                self.set_state(&mut link, ConnectionState::Connecting);
                true
            }
        };
        if !proceed {
            return;
        }

        debug!(attempt, "Reconnecting");
        self.notify(ConnectionEvent::Connecting);
        if let Err(err) = self.open().await {
            {
                let mut link = self.link.lock();
                if link.state == ConnectionState::Connecting {
                    self.set_state(&mut link, ConnectionState::Disconnected);
                }
            }
            warn!(attempt, error = %err, "Reconnect attempt failed");
            self.report_error(err);
            self.schedule_reconnect();
        }
    }
}

async fn close_quietly(mut sink: Box<dyn WebSocketSink>) {
    if let Err(err) = sink.close().await {
        debug!(error = %err, "WebSocket close failed");
    }
}

/// Client for the player backend's WebSocket protocol.
///
/// Cheap to clone; clones share one connection. Construct one per session
/// and hand it to whatever needs it.
#[derive(Clone)]
pub struct WebSocketProtocolClient {
    inner: Arc<ClientInner>,
}

impl WebSocketProtocolClient {
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an invalid configuration or a URL that is
    /// not `ws://` or `wss://`.
    pub fn new(
        url: impl Into<String>,
        connector: Arc<dyn WebSocketConnector>,
        clock: Arc<dyn Clock>,
        config: ProtocolConfig,
    ) -> Result<Self> {
        config.validate().map_err(ProtocolError::InvalidConfig)?;
        let url = url.into();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ProtocolError::InvalidConfig(format!(
                "WebSocket URL must start with ws:// or wss://, got '{}'",
                url
            )));
        }

        let policy = ReconnectPolicy::new(config.reconnect_base_delay, config.max_reconnect_attempts);
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                policy,
                url,
                connector,
                clock,
                link: Mutex::new(Link::default()),
                state_tx: watch::Sender::new(ConnectionState::Disconnected),
                pending: Arc::new(PendingResponses::new()),
                handlers: ListenerRegistry::new(),
                connection_listeners: ListenerRegistry::new(),
                error_handlers: ListenerRegistry::new(),
            }),
        })
    }

    /// Build from the core configuration. The heartbeat runs only when both
    /// `config` and the core feature flags enable it.
    pub fn from_core_config(core: &CoreConfig, config: ProtocolConfig) -> Result<Self> {
        let config = ProtocolConfig {
            enable_heartbeat: config.enable_heartbeat && core.features.enable_heartbeat,
            ..config
        };
        Self::new(
            core.websocket_url(),
            Arc::clone(&core.connector),
            Arc::clone(&core.clock),
            config,
        )
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// Open the socket. No-op when already connected.
    ///
    /// If an open is already in progress (a first `connect()` or a scheduled
    /// reconnect), waits for it to settle instead of starting another.
    ///
    /// # Errors
    ///
    /// - `Transport` if the connector fails. The failure is not retried.
    /// - `NotConnected` if the in-progress open this call waited on failed
    #[instrument(skip(self), fields(url = %self.inner.url))]
    pub async fn connect(&self) -> Result<()> {
        let state = {
            let mut link = self.inner.link.lock();
            let state = link.state;
            if state == ConnectionState::Disconnected {
                link.intentional_close = false;
                link.reconnect_attempts = 0;
                if let Some(reconnect) = link.reconnect.take() {
                    reconnect.abort();
                }
                self.inner.set_state(&mut link, ConnectionState::Connecting);
            }
            state
        };
        match state {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Connecting => return self.wait_for_open().await,
            ConnectionState::Disconnected => {}
        }

        self.inner.notify(ConnectionEvent::Connecting);
        match self.inner.open().await {
            Ok(()) => Ok(()),
            Err(err) => {
                {
                    let mut link = self.inner.link.lock();
                    if link.state == ConnectionState::Connecting {
                        self.inner.set_state(&mut link, ConnectionState::Disconnected);
                    }
                }
                warn!(error = %err, "Connection failed");
                self.inner.notify(ConnectionEvent::Error {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn wait_for_open(&self) -> Result<()> {
        debug!("Waiting for in-progress open");
        let mut states = self.inner.state_tx.subscribe();
        let settled = states
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
            .map(|state| *state)
            .map_err(|_| ProtocolError::NotConnected)?;
        match settled {
            ConnectionState::Connected => Ok(()),
            _ => Err(ProtocolError::NotConnected),
        }
    }

    /// Close the socket and stop reconnecting. Outstanding requests fail with
    /// `ConnectionClosed`.
    pub fn disconnect(&self) {
        let (was_open, pong_listener) = {
            let mut link = self.inner.link.lock();
            link.intentional_close = true;
            if let Some(reconnect) = link.reconnect.take() {
                reconnect.abort();
            }
            link.tasks.abort();
            if let Some(outbound) = link.outbound.take() {
                let _ = outbound.send(Outbound::Close);
            }
            let was_open = link.state != ConnectionState::Disconnected;
            self.inner.set_state(&mut link, ConnectionState::Disconnected);
            (was_open, link.pong_listener.take())
        };

        if let Some(id) = pong_listener {
            self.inner.handlers.off(&MessageType::Pong, id);
        }
        self.inner
            .pending
            .reject_all(|| ProtocolError::ConnectionClosed);

        if was_open {
            info!("WebSocket disconnected");
            self.inner.notify(ConnectionEvent::Disconnected {
                reason: Some("Client disconnected".to_string()),
            });
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.link.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Reconnect attempts made since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.link.lock().reconnect_attempts
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.inner.config
    }

    /// Requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    // ========================================================================
    // Messaging
    // ========================================================================

    /// Transmit a message now.
    ///
    /// With `options.response_required` this waits for the message carrying
    /// the same correlation id and returns it; otherwise it returns `None`
    /// once the frame is queued. A timed-out request is resent up to
    /// `options.max_retries` times with the same correlation id.
    ///
    /// # Errors
    ///
    /// - `NotConnected` if no socket is open
    /// - `ResponseTimeout` if the last attempt got no response in time
    /// - `ConnectionClosed` if the socket dropped while waiting
    #[instrument(skip(self, payload, options), fields(message_type = %message_type))]
    pub async fn send(
        &self,
        message_type: MessageType,
        payload: Option<Value>,
        options: SendOptions,
    ) -> Result<Option<WsMessage>> {
        let inner = &self.inner;
        let mut message = inner.message(message_type, payload, options.priority);

        if !options.response_required {
            inner.transmit(&message)?;
            return Ok(None);
        }

        let wait = options
            .timeout
            .unwrap_or(inner.config.default_response_timeout);
        message.response_required = Some(true);
        message.timeout_seconds = Some(wait.as_secs_f64().ceil() as u64);
        if options.max_retries > 0 {
            message.max_retries = Some(options.max_retries);
        }

        let mut retries = 0;
        loop {
            let pending = inner.pending.register(message.correlation_id.clone());
            inner.transmit(&message)?;

            match pending.wait(wait).await {
                Err(ProtocolError::ResponseTimeout { .. }) if retries < options.max_retries => {
                    retries += 1;
                    message.retry_count = Some(retries);
                    debug!(correlation_id = %message.correlation_id, retries, "Resending request");
                }
                result => return result.map(Some),
            }
        }
    }

    /// Send and wait for the response with default options.
    pub async fn request(&self, message_type: MessageType, payload: Option<Value>) -> Result<WsMessage> {
        self.send(message_type, payload, SendOptions::request())
            .await?
            .ok_or(ProtocolError::ConnectionClosed)
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    /// Handle every non-response message of `message_type`.
    pub fn on<F>(&self, message_type: MessageType, handler: F) -> ListenerId
    where
        F: Fn(&WsMessage) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.handlers.on(message_type, handler)
    }

    pub fn off(&self, message_type: MessageType, id: ListenerId) -> bool {
        self.inner.handlers.off(&message_type, id)
    }

    pub fn handler_count(&self, message_type: MessageType) -> usize {
        self.inner.handlers.listener_count(&message_type)
    }

    /// Observe asynchronous failures: handler errors, undecodable frames,
    /// failed reconnects.
    pub fn on_error<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&ProtocolError) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.error_handlers.on((), handler)
    }

    pub fn off_error(&self, id: ListenerId) -> bool {
        self.inner.error_handlers.off(&(), id)
    }

    pub fn on_connection_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.connection_listeners.on((), listener)
    }

    pub fn off_connection_event(&self, id: ListenerId) -> bool {
        self.inner.connection_listeners.off(&(), id)
    }
}

impl fmt::Debug for WebSocketProtocolClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let link = self.inner.link.lock();
        f.debug_struct("WebSocketProtocolClient")
            .field("url", &self.inner.url)
            .field("state", &link.state)
            .field("generation", &link.generation)
            .field("reconnect_attempts", &link.reconnect_attempts)
            .finish()
    }
}
