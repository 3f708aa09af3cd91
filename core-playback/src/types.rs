//! Core playback data types: transport state, stream timing and per-chunk
//! load records.

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Transport state owned by the playback controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Buffering,
    Seeking,
    Error,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Ready => "ready",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Buffering => "buffering",
            PlaybackState::Seeking => "seeking",
            PlaybackState::Error => "error",
        }
    }

    /// Returns `true` while audio is meant to be advancing.
    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Buffering)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a track's audio is sliced into chunks. All values are seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Total track length.
    pub duration: f64,
    /// Length of each chunk's audio.
    pub chunk_duration: f64,
    /// Playback advance per chunk. Absent or non-positive means contiguous
    /// chunks, i.e. the same as `chunk_duration`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_interval: Option<f64>,
}

/// A position resolved against the chunk grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkPosition {
    pub chunk_index: usize,
    /// Seconds into the chunk.
    pub offset: f64,
}

impl StreamMetadata {
    pub fn new(duration: f64, chunk_duration: f64, chunk_interval: Option<f64>) -> Self {
        Self {
            duration,
            chunk_duration,
            chunk_interval,
        }
    }

    /// Contiguous chunks.
    pub fn contiguous(duration: f64, chunk_duration: f64) -> Self {
        Self::new(duration, chunk_duration, None)
    }

    /// Effective chunk interval.
    pub fn interval(&self) -> f64 {
        match self.chunk_interval {
            Some(interval) if interval > 0.0 => interval,
            _ => self.chunk_duration,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(PlaybackError::InvalidMetadata(format!(
                "duration must be a non-negative number, got {}",
                self.duration
            )));
        }

        if !self.chunk_duration.is_finite() || self.chunk_duration <= 0.0 {
            return Err(PlaybackError::InvalidMetadata(format!(
                "chunk_duration must be positive, got {}",
                self.chunk_duration
            )));
        }

        if !self.interval().is_finite() {
            return Err(PlaybackError::InvalidMetadata(
                "chunk_interval must be finite".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of chunks needed to cover the track.
    pub fn chunk_count(&self) -> usize {
        (self.duration / self.interval()).ceil() as usize
    }

    /// Resolve `time` to a chunk and an offset inside it.
    ///
    /// `time` is clamped to `[0, duration]`. The end of the track resolves to
    /// the last chunk rather than one past it.
    pub fn locate(&self, time: f64) -> ChunkPosition {
        let interval = self.interval();
        let time = time.max(0.0).min(self.duration);

        let mut chunk_index = (time / interval).floor() as usize;
        let count = self.chunk_count();
        if count > 0 && chunk_index >= count {
            chunk_index = count - 1;
        }

        ChunkPosition {
            chunk_index,
            offset: time - chunk_index as f64 * interval,
        }
    }
}

/// Decoded PCM for one chunk.
///
/// Samples are interleaved and shared, so cloning a buffer or a
/// [`ChunkInfo`] never copies audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels,
        }
    }

    /// A buffer of silence lasting `seconds`.
    pub fn silence(seconds: f64, sample_rate: u32, channels: u16) -> Self {
        let frames = (seconds.max(0.0) * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Load record for one chunk.
///
/// `is_loaded` implies `audio_buffer.is_some()` for playback to work; the type
/// does not enforce it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkInfo {
    pub is_loading: bool,
    pub is_loaded: bool,
    pub audio_buffer: Option<AudioBuffer>,
    /// Last failure reported by the loader, cleared by the next load attempt.
    pub load_error: Option<String>,
}

impl ChunkInfo {
    pub fn has_failed(&self) -> bool {
        self.load_error.is_some() && !self.is_loading && !self.is_loaded
    }

    /// Neither loading nor loaded.
    pub fn needs_load(&self) -> bool {
        !self.is_loading && !self.is_loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_interval_defaults_to_chunk_duration() {
        assert_eq!(StreamMetadata::contiguous(100.0, 10.0).interval(), 10.0);
        assert_eq!(StreamMetadata::new(100.0, 10.0, Some(0.0)).interval(), 10.0);
        assert_eq!(StreamMetadata::new(100.0, 10.0, Some(-2.0)).interval(), 10.0);
        assert_eq!(StreamMetadata::new(100.0, 15.0, Some(10.0)).interval(), 10.0);
    }

    #[test]
    fn test_chunk_count_rounds_up() {
        assert_eq!(StreamMetadata::contiguous(100.0, 10.0).chunk_count(), 10);
        assert_eq!(StreamMetadata::contiguous(101.0, 10.0).chunk_count(), 11);
        assert_eq!(StreamMetadata::contiguous(0.0, 10.0).chunk_count(), 0);
    }

    #[test]
    fn test_locate() {
        let meta = StreamMetadata::new(100.0, 10.0, Some(10.0));

        let pos = meta.locate(23.0);
        assert_eq!(pos.chunk_index, 2);
        assert!(approx(pos.offset, 3.0));

        let pos = meta.locate(55.0);
        assert_eq!(pos.chunk_index, 5);
        assert!(approx(pos.offset, 5.0));
    }

    #[test]
    fn test_locate_overlapping_chunks() {
        // 15 s chunks that advance by 10 s
        let meta = StreamMetadata::new(60.0, 15.0, Some(10.0));
        let pos = meta.locate(34.0);
        assert_eq!(pos.chunk_index, 3);
        assert!(approx(pos.offset, 4.0));
    }

    #[test]
    fn test_locate_clamps_to_track() {
        let meta = StreamMetadata::contiguous(100.0, 10.0);

        let end = meta.locate(100.0);
        assert_eq!(end.chunk_index, 9);
        assert!(approx(end.offset, 10.0));

        assert_eq!(meta.locate(250.0).chunk_index, 9);
        let start = meta.locate(-5.0);
        assert_eq!(start.chunk_index, 0);
        assert!(approx(start.offset, 0.0));
    }

    #[test]
    fn test_validate_metadata() {
        assert!(StreamMetadata::contiguous(100.0, 10.0).validate().is_ok());
        assert!(matches!(
            StreamMetadata::contiguous(100.0, 0.0).validate(),
            Err(PlaybackError::InvalidMetadata(_))
        ));
        assert!(matches!(
            StreamMetadata::contiguous(f64::NAN, 10.0).validate(),
            Err(PlaybackError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_metadata_deserializes_without_interval() {
        let meta: StreamMetadata =
            serde_json::from_str(r#"{"duration":180.5,"chunk_duration":30.0}"#).unwrap();
        assert_eq!(meta.chunk_interval, None);
        assert_eq!(meta.interval(), 30.0);
        assert_eq!(meta.chunk_count(), 7);
    }

    #[test]
    fn test_audio_buffer_duration() {
        let buffer = AudioBuffer::silence(2.5, 44_100, 2);
        assert_eq!(buffer.frames(), 110_250);
        assert_eq!(buffer.samples.len(), 220_500);
        assert_eq!(buffer.duration(), Duration::from_secs_f64(2.5));

        let empty = AudioBuffer::new(Vec::new(), 0, 0);
        assert_eq!(empty.frames(), 0);
        assert_eq!(empty.duration(), Duration::ZERO);
    }

    #[test]
    fn test_chunk_info_defaults() {
        let chunk = ChunkInfo::default();
        assert!(!chunk.is_loading);
        assert!(!chunk.is_loaded);
        assert!(chunk.audio_buffer.is_none());
        assert!(chunk.needs_load());
        assert!(!chunk.has_failed());
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&PlaybackState::Buffering).unwrap(),
            "\"buffering\""
        );
        assert_eq!(PlaybackState::Playing.to_string(), "playing");
        assert!(PlaybackState::Buffering.is_active());
        assert!(!PlaybackState::Paused.is_active());
    }
}
