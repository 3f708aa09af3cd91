//! WebSocket Transport Abstraction
//!
//! Provides a text-frame socket to the player backend (`ws://host/ws`).
//!
//! The protocol client in `core-protocol` owns framing, correlation, heartbeat
//! and reconnection. A transport only has to open a socket and move text frames
//! in both directions, which keeps host implementations small:
//!
//! - **Desktop**: `tokio-tungstenite` (see `bridge-desktop`)
//! - **Tests**: in-memory channel pairs
//!
//! # Example
//!
//! ```ignore
//! use bridge_traits::websocket::{WebSocketConnector, WsFrame};
//!
//! async fn echo_once(connector: &dyn WebSocketConnector) -> bridge_traits::error::Result<()> {
//!     let mut channel = connector.connect("ws://localhost:8765/ws").await?;
//!     channel.sink.send_text("{\"type\":\"ping\"}".to_string()).await?;
//!     if let Some(Ok(WsFrame::Text(reply))) = channel.stream.next_frame().await {
//!         println!("server said {reply}");
//!     }
//!     channel.sink.close().await
//! }
//! ```

use crate::error::Result;

/// A frame received from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    /// UTF-8 text frame carrying one JSON message
    Text(String),
    /// Peer closed the connection, with an optional reason
    Close(Option<String>),
}

/// Write half of an open socket.
#[async_trait::async_trait]
pub trait WebSocketSink: Send {
    /// Send a single text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Initiate a close handshake. Implementations must be idempotent.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of an open socket.
#[async_trait::async_trait]
pub trait WebSocketStream: Send {
    /// Wait for the next frame.
    ///
    /// Returns `None` once the underlying connection has ended. Transport-level
    /// control frames (ping/pong at the WebSocket layer) are handled by the
    /// implementation and never surfaced here.
    async fn next_frame(&mut self) -> Option<Result<WsFrame>>;
}

/// Both halves of a freshly opened socket.
pub struct WebSocketChannel {
    pub sink: Box<dyn WebSocketSink>,
    pub stream: Box<dyn WebSocketStream>,
}

impl WebSocketChannel {
    pub fn new(sink: Box<dyn WebSocketSink>, stream: Box<dyn WebSocketStream>) -> Self {
        Self { sink, stream }
    }
}

impl std::fmt::Debug for WebSocketChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketChannel").finish_non_exhaustive()
    }
}

/// Opens sockets to the backend.
///
/// Called once per connection attempt, including every reconnect.
#[async_trait::async_trait]
pub trait WebSocketConnector: Send + Sync {
    /// Open a socket to `url`.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::ConnectionFailed` if the handshake does not
    /// complete.
    async fn connect(&self, url: &str) -> Result<WebSocketChannel>;
}
