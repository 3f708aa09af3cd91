//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the player core and
//! platform-specific implementations. Each trait represents a capability the
//! core requires but that is provided differently per host (desktop shell,
//! browser, test harness).
//!
//! ## Traits
//!
//! ### Networking
//! - [`WebSocketConnector`](websocket::WebSocketConnector) - Opens a persistent
//!   text-frame socket to the player backend
//! - [`WebSocketSink`](websocket::WebSocketSink) / [`WebSocketStream`](websocket::WebSocketStream) -
//!   The write and read halves of an open socket
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Wall-clock source for message timestamps
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert transport-specific errors into it and keep messages
//! actionable (include the URL or close reason where available).
//!
//! ## Thread Safety
//!
//! Connectors and sinks are shared across async tasks, so they carry
//! `Send + Sync` bounds. The socket halves are owned by a single task each and
//! only need `Send`.

pub mod error;
pub mod time;
pub mod websocket;

pub use error::BridgeError;

pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, MemoryLogger, SystemClock};
pub use websocket::{WebSocketChannel, WebSocketConnector, WebSocketSink, WebSocketStream, WsFrame};
