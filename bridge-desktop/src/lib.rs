//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `WebSocketConnector` using `tokio-tungstenite`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::TungsteniteConnector;
//! use bridge_traits::WebSocketConnector;
//! use std::sync::Arc;
//!
//! let connector: Arc<dyn WebSocketConnector> = Arc::new(TungsteniteConnector::new());
//! // Hand to CoreConfig::builder().connector(connector)
//! ```

mod websocket;

pub use websocket::TungsteniteConnector;
