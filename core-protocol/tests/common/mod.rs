//! In-memory WebSocket transport for protocol tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::websocket::{
    WebSocketChannel, WebSocketConnector, WebSocketSink, WebSocketStream, WsFrame,
};
use bridge_traits::SystemClock;
use chrono::Utc;
use core_protocol::{MessageType, ProtocolConfig, WebSocketProtocolClient, WsMessage};
use core_runtime::events::ConnectionEvent;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// The server's side of one accepted connection.
pub struct ServerEnd {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: Option<mpsc::UnboundedSender<WsFrame>>,
    closed: Arc<AtomicBool>,
}

impl ServerEnd {
    /// Next message the client sent.
    pub async fn recv(&mut self) -> WsMessage {
        let text = self
            .from_client
            .recv()
            .await
            .expect("client side went away");
        WsMessage::from_json(&text).expect("client sent invalid JSON")
    }

    pub fn push(&self, message: &WsMessage) {
        self.push_text(message.to_json().unwrap());
    }

    pub fn push_text(&self, text: impl Into<String>) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(WsFrame::Text(text.into()));
        }
    }

    /// Answer `request` with a message of `message_type` carrying its
    /// correlation id.
    pub fn reply(&self, request: &WsMessage, message_type: MessageType, payload: Value) {
        let reply = WsMessage::reply_to(request, message_type, Utc::now()).with_payload(payload);
        self.push(&reply);
    }

    /// Send a close frame.
    pub fn close(&self, reason: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(WsFrame::Close(Some(reason.to_string())));
        }
    }

    /// Drop the server's write half; the client sees the stream end.
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }

    /// Whether the client closed its sink.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MemorySink {
    tx: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl WebSocketSink for MemorySink {
    async fn send_text(&mut self, text: String) -> BridgeResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::ConnectionClosed);
        }
        self.tx.send(text).map_err(|_| BridgeError::ConnectionClosed)
    }

    async fn close(&mut self) -> BridgeResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryStream {
    rx: mpsc::UnboundedReceiver<WsFrame>,
}

#[async_trait]
impl WebSocketStream for MemoryStream {
    async fn next_frame(&mut self) -> Option<BridgeResult<WsFrame>> {
        self.rx.recv().await.map(Ok)
    }
}

/// Connector that hands every accepted connection to the test.
pub struct MemoryConnector {
    sessions: mpsc::UnboundedSender<ServerEnd>,
    attempts: AtomicUsize,
    refuse: AtomicBool,
    handshake: Mutex<Duration>,
}

impl MemoryConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (sessions, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            sessions,
            attempts: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            handshake: Mutex::new(Duration::ZERO),
        });
        (connector, rx)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Make every following connect fail.
    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make every following connect take `delay` before it succeeds or is
    /// refused.
    pub fn handshake_delay(&self, delay: Duration) {
        *self.handshake.lock() = delay;
    }
}

#[async_trait]
impl WebSocketConnector for MemoryConnector {
    async fn connect(&self, _url: &str) -> BridgeResult<WebSocketChannel> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.handshake.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(BridgeError::ConnectionFailed("connection refused".to_string()));
        }

        let (client_tx, from_client) = mpsc::unbounded_channel();
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let _ = self.sessions.send(ServerEnd {
            from_client,
            to_client: Some(to_client),
            closed: Arc::clone(&closed),
        });

        Ok(WebSocketChannel::new(
            Box::new(MemorySink {
                tx: client_tx,
                closed,
            }),
            Box::new(MemoryStream { rx: client_rx }),
        ))
    }
}

pub fn no_heartbeat() -> ProtocolConfig {
    ProtocolConfig {
        enable_heartbeat: false,
        ..Default::default()
    }
}

pub fn client(connector: Arc<MemoryConnector>, config: ProtocolConfig) -> WebSocketProtocolClient {
    WebSocketProtocolClient::new(
        "ws://player.test/ws",
        connector,
        Arc::new(SystemClock),
        config,
    )
    .unwrap()
}

pub fn record_connection_events(
    client: &WebSocketProtocolClient,
) -> Arc<Mutex<Vec<ConnectionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    client.on_connection_event(move |event| {
        sink.lock().push(event.clone());
        Ok(())
    });
    events
}

/// Error handler that forwards each error's text.
pub fn error_channel(client: &WebSocketProtocolClient) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.on_error(move |err| {
        let _ = tx.send(err.to_string());
        Ok(())
    });
    rx
}
