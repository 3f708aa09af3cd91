//! # Playback Error Types
//!
//! Error types for the chunked playback controller and its collaborators.

use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    // ========================================================================
    // Track Errors
    // ========================================================================
    /// `play()` or `seek()` was called before stream metadata was set.
    #[error("No track loaded")]
    NoTrackLoaded,

    /// Stream metadata is unusable (non-positive chunk duration, NaN, ...).
    #[error("Invalid stream metadata: {0}")]
    InvalidMetadata(String),

    /// Requested position is not a finite number.
    #[error("Invalid playback position: {0}")]
    InvalidPosition(f64),

    // ========================================================================
    // Chunk Errors
    // ========================================================================
    /// The target chunk did not become loaded within the adaptive timeout.
    #[error("Chunk {chunk_index} did not load within {timeout_ms} ms")]
    ChunkLoadTimeout { chunk_index: usize, timeout_ms: u64 },

    /// The loader reported a failure for the chunk being waited on.
    #[error("Chunk {chunk_index} failed to load: {reason}")]
    ChunkLoadFailed { chunk_index: usize, reason: String },

    /// The position maps to a chunk the registry does not hold.
    #[error("Chunk index {index} out of range (chunk count {count})")]
    ChunkOutOfRange { index: usize, count: usize },

    /// Fetching or decoding a chunk failed inside a `ChunkLoader`.
    #[error("Chunk loader error: {0}")]
    Loader(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlaybackError::ChunkLoadTimeout { .. }
                | PlaybackError::ChunkLoadFailed { .. }
                | PlaybackError::Loader(_)
        )
    }

    /// Returns `true` if the wait for a chunk ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PlaybackError::ChunkLoadTimeout { .. })
    }

    /// Chunk index the error refers to, if any.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            PlaybackError::ChunkLoadTimeout { chunk_index, .. }
            | PlaybackError::ChunkLoadFailed { chunk_index, .. } => Some(*chunk_index),
            PlaybackError::ChunkOutOfRange { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
