use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] core_protocol::ProtocolError),

    #[error("Player session has been shut down")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, CoreError>;
