use thiserror::Error;

/// Failures reported by the session engine to command handlers.
///
/// None of these are retried. They either describe caller misuse (a negative
/// skip count, an out-of-range volume) or a legitimate "nothing to do" state
/// (empty queue, no matching title).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MusicError {
    #[error("the queue is full (maximum {capacity} songs)")]
    CapacityExceeded { capacity: usize },

    #[error("the queue is empty")]
    QueueEmpty,

    #[error("the song history is empty")]
    EmptyHistory,

    #[error("couldn't find a song matching \"{0}\"")]
    NoMatchFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("volume must be between 0 and 200, got {value}")]
    OutOfRange { value: f64 },

    #[error("the bot is not connected to a voice channel")]
    VoiceNotConnected,

    #[error("couldn't resolve the track: {0}")]
    Resolution(String),

    #[error("voice output error: {0}")]
    Voice(String),
}

pub type Result<T> = std::result::Result<T, MusicError>;
