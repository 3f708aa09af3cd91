//! Events emitted by the playback controller.
//!
//! Listeners subscribe per [`EventKind`] through
//! [`PlaybackController::on`](crate::controller::PlaybackController::on).

use crate::types::PlaybackState;
use serde::Serialize;

/// Event key for listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    PlayRequested,
    PauseRequested,
    SeekRequested,
    StopRequested,
    StateChanged,
    PlaybackError,
}

/// Neighbours of a seek target, for preload prioritisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdjacentChunks {
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

impl AdjacentChunks {
    /// Neighbours of `index` within a track of `count` chunks.
    pub fn around(index: usize, count: usize) -> Self {
        Self {
            prev: index.checked_sub(1),
            next: Some(index + 1).filter(|next| *next < count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ControllerEvent {
    /// Playback should start from `offset_in_chunk` seconds into `chunk_index`.
    PlayRequested {
        chunk_index: usize,
        offset_in_chunk: f64,
        chunk_interval: f64,
        chunk_duration: f64,
    },
    PauseRequested {
        pause_time: f64,
    },
    SeekRequested {
        target_time: f64,
        target_chunk: usize,
        offset: f64,
        chunk_interval: f64,
        was_playing: bool,
        adjacent_chunks: AdjacentChunks,
    },
    StopRequested,
    StateChanged {
        from: PlaybackState,
        to: PlaybackState,
    },
    PlaybackError {
        chunk_index: Option<usize>,
        message: String,
    },
}

impl ControllerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ControllerEvent::PlayRequested { .. } => EventKind::PlayRequested,
            ControllerEvent::PauseRequested { .. } => EventKind::PauseRequested,
            ControllerEvent::SeekRequested { .. } => EventKind::SeekRequested,
            ControllerEvent::StopRequested => EventKind::StopRequested,
            ControllerEvent::StateChanged { .. } => EventKind::StateChanged,
            ControllerEvent::PlaybackError { .. } => EventKind::PlaybackError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjacent_chunks_bounds() {
        assert_eq!(
            AdjacentChunks::around(5, 10),
            AdjacentChunks {
                prev: Some(4),
                next: Some(6)
            }
        );
        assert_eq!(AdjacentChunks::around(0, 10).prev, None);
        assert_eq!(AdjacentChunks::around(9, 10).next, None);
    }

    #[test]
    fn test_event_kind_and_wire_shape() {
        let event = ControllerEvent::PauseRequested { pause_time: 4.5 };
        assert_eq!(event.kind(), EventKind::PauseRequested);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "pause-requested");
        assert_eq!(json["pause_time"], 4.5);
    }
}
