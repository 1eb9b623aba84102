//! Error types for the session protocol.

use thiserror::Error;

/// Result type alias for protocol operations.
pub type ProtoResult<T> = Result<T, ProtoError>;

/// Errors that can occur while exchanging session messages.
#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("Session channel closed")]
    ChannelClosed,

    #[error("Decode request: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid log level: {0:?}")]
    InvalidLogLevel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
