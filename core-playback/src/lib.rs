//! # Chunked Playback Module
//!
//! Transport state, chunk bookkeeping and chunk loading for streamed tracks.
//!
//! ## Overview
//!
//! This module handles:
//! - The playback state machine and its request events (`controller`)
//! - Adaptive "wait for chunk" timeouts from observed latencies (`timeout`)
//! - The per-track chunk registry (`chunks`)
//! - Prioritised, bounded chunk preloading through a host `ChunkLoader`
//!   (`preload`)

pub mod chunks;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod preload;
pub mod timeout;
pub mod traits;
pub mod types;

pub use chunks::ChunkRegistry;
pub use config::{AdaptiveTimeoutConfig, ControllerConfig, PreloadConfig};
pub use controller::{PlaybackController, RequestOutcome};
pub use error::{PlaybackError, Result};
pub use events::{AdjacentChunks, ControllerEvent, EventKind};
pub use preload::{plan_loads, ChunkPreloadManager, LoadPriority, LoadRequest};
pub use timeout::{AdaptiveTimeoutManager, EmaEstimator, TimeoutEstimator, TimeoutStats};
pub use traits::ChunkLoader;
pub use types::{AudioBuffer, ChunkInfo, ChunkPosition, PlaybackState, StreamMetadata};
