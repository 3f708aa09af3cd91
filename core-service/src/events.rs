use core_playback::ControllerEvent;
use core_runtime::events::PlaybackEvent;

/// Flatten a controller event into its event-bus form.
pub fn playback_event(event: &ControllerEvent) -> PlaybackEvent {
    match event {
        ControllerEvent::PlayRequested {
            chunk_index,
            offset_in_chunk,
            ..
        } => PlaybackEvent::PlayRequested {
            chunk_index: *chunk_index,
            offset_in_chunk: *offset_in_chunk,
        },
        ControllerEvent::PauseRequested { pause_time } => PlaybackEvent::PauseRequested {
            pause_time: *pause_time,
        },
        ControllerEvent::SeekRequested {
            target_time,
            target_chunk,
            was_playing,
            ..
        } => PlaybackEvent::SeekRequested {
            target_time: *target_time,
            target_chunk: *target_chunk,
            was_playing: *was_playing,
        },
        ControllerEvent::StopRequested => PlaybackEvent::Stopped,
        ControllerEvent::StateChanged { from, to } => PlaybackEvent::StateChanged {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        },
        ControllerEvent::PlaybackError {
            chunk_index,
            message,
        } => PlaybackEvent::Error {
            message: message.clone(),
            chunk_index: *chunk_index,
        },
    }
}
