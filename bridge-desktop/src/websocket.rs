//! WebSocket Connector Implementation using tokio-tungstenite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    websocket::{WebSocketChannel, WebSocketConnector, WebSocketSink, WebSocketStream, WsFrame},
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    tungstenite::{self, Message},
    MaybeTlsStream,
};
use tracing::{debug, trace, warn};

type Socket = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Desktop WebSocket connector
///
/// Opens `ws://` and `wss://` sockets with:
/// - A bounded handshake timeout
/// - Transparent handling of protocol-level ping/pong frames
/// - Binary frames accepted when they carry valid UTF-8
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    /// Create a connector with a 10 second handshake timeout
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(10))
    }

    /// Create a connector with a custom handshake timeout
    pub fn with_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebSocketConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<WebSocketChannel> {
        debug!(url = %url, "Opening WebSocket");

        let (socket, response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| {
                    BridgeError::ConnectionFailed(format!(
                        "Handshake with {} timed out after {:?}",
                        url, self.connect_timeout
                    ))
                })?
                .map_err(|e| BridgeError::ConnectionFailed(format!("{}: {}", url, e)))?;

        debug!(
            status = response.status().as_u16(),
            "WebSocket handshake complete"
        );

        let (tx, rx) = socket.split();
        Ok(WebSocketChannel::new(
            Box::new(TungsteniteSink { tx, closed: false }),
            Box::new(TungsteniteStream { rx }),
        ))
    }
}

struct TungsteniteSink {
    tx: SplitSink<Socket, Message>,
    closed: bool,
}

#[async_trait]
impl WebSocketSink for TungsteniteSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.closed {
            return Err(BridgeError::ConnectionClosed);
        }
        trace!(bytes = text.len(), "Sending text frame");
        self.tx.send(Message::Text(text)).await.map_err(map_ws_error)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.tx.send(Message::Close(None)).await {
            Ok(()) => {}
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                return Ok(())
            }
            Err(e) => return Err(map_ws_error(e)),
        }

        // Closing the sink after the close frame is best effort; the peer may
        // already have dropped the TCP stream.
        if let Err(e) = self.tx.close().await {
            debug!(error = %e, "Sink close after close frame failed");
        }
        Ok(())
    }
}

struct TungsteniteStream {
    rx: SplitStream<Socket>,
}

#[async_trait]
impl WebSocketStream for TungsteniteStream {
    async fn next_frame(&mut self) -> Option<Result<WsFrame>> {
        loop {
            match self.rx.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(WsFrame::Text(text))),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(WsFrame::Text(text))),
                    Err(_) => {
                        warn!("Dropping binary frame that is not valid UTF-8");
                        continue;
                    }
                },
                Ok(Message::Close(frame)) => {
                    let reason = frame.map(|f| f.reason.into_owned());
                    return Some(Ok(WsFrame::Close(reason)));
                }
                // Ping/pong replies are queued by tungstenite itself
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed) => return None,
                Err(e) => return Some(Err(map_ws_error(e))),
            }
        }
    }
}

fn map_ws_error(error: tungstenite::Error) -> BridgeError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            BridgeError::ConnectionClosed
        }
        tungstenite::Error::Io(e) => BridgeError::Io(e),
        other => BridgeError::OperationFailed(other.to_string()),
    }
}
