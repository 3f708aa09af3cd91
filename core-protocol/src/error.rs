//! # Protocol Error Types

use crate::message::MessageType;
use bridge_traits::BridgeError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    /// `send()` was called while no socket is open.
    #[error("WebSocket not connected")]
    NotConnected,

    #[error("No response to {correlation_id} within {timeout:?}")]
    ResponseTimeout {
        correlation_id: String,
        timeout: Duration,
    },

    /// The socket closed while the operation was outstanding.
    #[error("WebSocket connection closed")]
    ConnectionClosed,

    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// A message handler returned an error or panicked.
    #[error("Handler for '{message_type}' failed: {reason}")]
    Handler {
        message_type: MessageType,
        reason: String,
    },

    #[error("Message serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] BridgeError),

    #[error("Invalid protocol configuration: {0}")]
    InvalidConfig(String),
}

impl ProtocolError {
    /// Returns `true` if a later attempt may succeed without changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProtocolError::NotConnected
                | ProtocolError::ResponseTimeout { .. }
                | ProtocolError::ConnectionClosed
                | ProtocolError::Transport(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(ProtocolError::NotConnected.to_string(), "WebSocket not connected");

        let err = ProtocolError::Handler {
            message_type: MessageType::PlayerState,
            reason: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Handler for 'player_state' failed: boom");

        let err = ProtocolError::ResponseTimeout {
            correlation_id: "abc".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "No response to abc within 30s");
    }

    #[test]
    fn test_retryable() {
        assert!(ProtocolError::ConnectionClosed.is_retryable());
        assert!(ProtocolError::Transport(BridgeError::ConnectionClosed).is_retryable());
        assert!(!ProtocolError::ReconnectExhausted { attempts: 5 }.is_retryable());
        assert!(!ProtocolError::InvalidConfig("x".to_string()).is_retryable());
    }
}
