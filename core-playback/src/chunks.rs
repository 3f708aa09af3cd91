//! Per-track chunk load records, indexed by chunk number.

use crate::types::{AudioBuffer, ChunkInfo};

/// Authoritative load state for every chunk of the current track.
///
/// All accessors are bounds-checked; mutators return `false` instead of
/// panicking when the index is out of range.
#[derive(Debug, Clone, Default)]
pub struct ChunkRegistry {
    chunks: Vec<ChunkInfo>,
}

impl ChunkRegistry {
    pub fn new(count: usize) -> Self {
        Self {
            chunks: vec![ChunkInfo::default(); count],
        }
    }

    /// Replace every record with `count` fresh ones.
    pub fn reset(&mut self, count: usize) {
        self.chunks.clear();
        self.chunks.resize(count, ChunkInfo::default());
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChunkInfo> {
        self.chunks.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ChunkInfo> {
        self.chunks.get_mut(index)
    }

    pub fn is_loaded(&self, index: usize) -> bool {
        self.get(index).is_some_and(|chunk| chunk.is_loaded)
    }

    pub fn loaded_count(&self) -> usize {
        self.chunks.iter().filter(|chunk| chunk.is_loaded).count()
    }

    pub fn loading_count(&self) -> usize {
        self.chunks.iter().filter(|chunk| chunk.is_loading).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkInfo> {
        self.chunks.iter()
    }

    /// Record loader progress. Starting a load clears the previous failure.
    pub fn set_load_state(&mut self, index: usize, is_loading: bool, is_loaded: bool) -> bool {
        let Some(chunk) = self.chunks.get_mut(index) else {
            return false;
        };
        chunk.is_loading = is_loading;
        chunk.is_loaded = is_loaded;
        if is_loading || is_loaded {
            chunk.load_error = None;
        }
        true
    }

    pub fn set_audio_buffer(&mut self, index: usize, buffer: AudioBuffer) -> bool {
        let Some(chunk) = self.chunks.get_mut(index) else {
            return false;
        };
        chunk.audio_buffer = Some(buffer);
        true
    }

    /// Mark a chunk failed. Any previous buffer is dropped.
    pub fn mark_failed(&mut self, index: usize, reason: impl Into<String>) -> bool {
        let Some(chunk) = self.chunks.get_mut(index) else {
            return false;
        };
        chunk.is_loading = false;
        chunk.is_loaded = false;
        chunk.audio_buffer = None;
        chunk.load_error = Some(reason.into());
        true
    }

    /// Forget a previous failure so the chunk can be requested again.
    pub fn clear_failure(&mut self, index: usize) {
        if let Some(chunk) = self.chunks.get_mut(index) {
            chunk.load_error = None;
        }
    }
}
