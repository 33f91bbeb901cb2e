//! Error types for the chat relay.

/// Top-level error type for the relay server and the chat client.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// HTTP server error (bind, serve).
    #[error("server error: {0}")]
    Server(String),

    /// Client transport error (endpoint unreachable, non-2xx reply).
    #[error("transport error: {0}")]
    Transport(String),

    /// Speech synthesis error.
    #[error("speech error: {0}")]
    Speech(String),

    /// Audio playback error.
    #[error("playback error: {0}")]
    Playback(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, RelayError>;
