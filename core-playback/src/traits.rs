//! # Core Playback Traits
//!
//! The controller is pure state and logic. Fetching and decoding chunk audio
//! belongs to a host-provided [`ChunkLoader`], driven by the
//! [`ChunkPreloadManager`](crate::preload::ChunkPreloadManager).
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use core_playback::{AudioBuffer, ChunkLoader, Result};
//!
//! struct SilentLoader;
//!
//! #[async_trait]
//! impl ChunkLoader for SilentLoader {
//!     async fn load_chunk(&self, chunk_index: usize) -> Result<AudioBuffer> {
//!         let _ = chunk_index;
//!         Ok(AudioBuffer::silence(10.0, 44_100, 2))
//!     }
//! }
//! ```

use crate::error::Result;
use crate::types::AudioBuffer;
use async_trait::async_trait;

/// Fetches and decodes one chunk of the current track.
///
/// Implementations are bound to a track by the host. Errors should use
/// `PlaybackError::Loader` with an actionable message; it ends up in the
/// chunk's `load_error` and in the `PlaybackError` event.
#[async_trait]
pub trait ChunkLoader: Send + Sync {
    async fn load_chunk(&self, chunk_index: usize) -> Result<AudioBuffer>;
}
