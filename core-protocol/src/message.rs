//! # Wire Messages
//!
//! Every frame is one JSON object:
//!
//! ```json
//! {
//!   "type": "seek",
//!   "correlation_id": "0b9d4c3e-6a59-4c1e-9f57-5f1f0b0e7a21",
//!   "timestamp": "2024-05-01T12:00:00Z",
//!   "priority": "high",
//!   "payload": { "position": 42.0 },
//!   "response_required": true,
//!   "timeout_seconds": 30
//! }
//! ```
//!
//! Optional fields are omitted when unset. Unrecognised `type` values parse
//! as [`MessageType::Unknown`]; the original name stays available through
//! [`WsMessage::type_name`] and is written back out unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

macro_rules! message_types {
    ($($variant:ident => $wire:literal),+ $(,)?) => {
        /// Enumerated message `type` values.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum MessageType {
            $($variant,)+
            /// Any `type` this client does not know.
            Unknown,
        }

        impl MessageType {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(MessageType::$variant => $wire,)+
                    MessageType::Unknown => "unknown",
                }
            }

            /// Map a wire name to a type; unknown names become `Unknown`.
            pub fn parse(name: &str) -> Self {
                match name {
                    $($wire => MessageType::$variant,)+
                    _ => MessageType::Unknown,
                }
            }
        }
    };
}

message_types! {
    Ping => "ping",
    Pong => "pong",

    Play => "play",
    Pause => "pause",
    Stop => "stop",
    Seek => "seek",
    Next => "next",
    Previous => "previous",
    SetVolume => "set_volume",

    QueueAdd => "queue_add",
    QueueRemove => "queue_remove",
    QueueClear => "queue_clear",
    QueueReorder => "queue_reorder",
    QueueUpdated => "queue_updated",

    LibraryScan => "library_scan",
    LibraryUpdated => "library_updated",
    LibraryTrackAdded => "library_track_added",

    PlayerState => "player_state",
    CacheStatus => "cache_status",
    CacheUpdated => "cache_updated",
    StatusUpdate => "status_update",
    Notification => "notification",
    Error => "error",
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::parse(&name))
    }
}

/// Delivery priority hint carried on every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireMessage", into = "WireMessage")]
pub struct WsMessage {
    pub message_type: MessageType,
    /// Wire name, kept only when `message_type` is `Unknown`.
    unknown_type: Option<String>,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub priority: MessagePriority,
    pub payload: Option<Value>,
    pub response_required: Option<bool>,
    pub timeout_seconds: Option<u64>,
    pub retry_count: Option<u32>,
    pub max_retries: Option<u32>,
}

impl WsMessage {
    /// A new message with a fresh correlation id.
    pub fn new(message_type: MessageType, timestamp: DateTime<Utc>) -> Self {
        Self {
            message_type,
            unknown_type: None,
            correlation_id: Uuid::new_v4().to_string(),
            timestamp,
            priority: MessagePriority::Normal,
            payload: None,
            response_required: None,
            timeout_seconds: None,
            retry_count: None,
            max_retries: None,
        }
    }

    /// A new message for a wire `type` name, known or not.
    pub fn named(type_name: &str, timestamp: DateTime<Utc>) -> Self {
        let message_type = MessageType::parse(type_name);
        Self {
            unknown_type: (message_type == MessageType::Unknown).then(|| type_name.to_string()),
            ..Self::new(message_type, timestamp)
        }
    }

    /// A reply carrying `request`'s correlation id.
    pub fn reply_to(request: &WsMessage, message_type: MessageType, timestamp: DateTime<Utc>) -> Self {
        Self {
            correlation_id: request.correlation_id.clone(),
            ..Self::new(message_type, timestamp)
        }
    }

    /// The `type` as it appears on the wire. For `Unknown` messages this is
    /// the name the sender used.
    pub fn type_name(&self) -> &str {
        self.unknown_type
            .as_deref()
            .unwrap_or_else(|| self.message_type.as_str())
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    type_name: String,
    correlation_id: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    priority: MessagePriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_retries: Option<u32>,
}

impl From<WireMessage> for WsMessage {
    fn from(wire: WireMessage) -> Self {
        let message_type = MessageType::parse(&wire.type_name);
        Self {
            message_type,
            unknown_type: (message_type == MessageType::Unknown).then_some(wire.type_name),
            correlation_id: wire.correlation_id,
            timestamp: wire.timestamp,
            priority: wire.priority,
            payload: wire.payload,
            response_required: wire.response_required,
            timeout_seconds: wire.timeout_seconds,
            retry_count: wire.retry_count,
            max_retries: wire.max_retries,
        }
    }
}

impl From<WsMessage> for WireMessage {
    fn from(message: WsMessage) -> Self {
        Self {
            type_name: message.type_name().to_string(),
            correlation_id: message.correlation_id,
            timestamp: message.timestamp,
            priority: message.priority,
            payload: message.payload,
            response_required: message.response_required,
            timeout_seconds: message.timeout_seconds,
            retry_count: message.retry_count,
            max_retries: message.max_retries,
        }
    }
}

/// Per-call options for [`send`](crate::client::WebSocketProtocolClient::send).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendOptions {
    pub priority: MessagePriority,
    /// Wait for a message with the same correlation id.
    pub response_required: bool,
    /// Response wait; the client default applies when unset.
    pub timeout: Option<Duration>,
    /// Resend up to this many times when the response wait times out.
    pub max_retries: u32,
}

impl SendOptions {
    /// Options for a request that waits for its response.
    pub fn request() -> Self {
        Self {
            response_required: true,
            ..Default::default()
        }
    }

    pub fn priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}
