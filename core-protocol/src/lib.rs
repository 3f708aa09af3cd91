//! # Player Backend Protocol
//!
//! JSON-over-WebSocket messaging with the player backend.
//!
//! ## Overview
//!
//! This module handles:
//! - The wire message shape and the enumerated message types (`message`)
//! - Correlated request/response with per-request timeouts (`pending`)
//! - Heartbeat, reconnect with exponential backoff, and per-type routing
//!   (`client`, `backoff`)
//! - Typed transport and queue commands (`commands`)

pub mod backoff;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod message;
pub mod pending;

pub use backoff::ReconnectPolicy;
pub use client::{ConnectionState, WebSocketProtocolClient};
pub use commands::PlayerCommands;
pub use config::ProtocolConfig;
pub use error::{ProtocolError, Result};
pub use message::{MessagePriority, MessageType, SendOptions, WsMessage};
pub use pending::{PendingResponse, PendingResponses};
