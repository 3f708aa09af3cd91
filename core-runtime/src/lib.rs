//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the player core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Listener registries and the core event bus
//!
//! ## Overview
//!
//! Every other core crate depends on this one. It fixes the logging
//! conventions, the way host capabilities are injected, and the two event
//! mechanisms used throughout the workspace: ordered per-key listener
//! registries for synchronous callbacks, and a broadcast bus for consumers
//! that want an async stream of everything the session does.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
