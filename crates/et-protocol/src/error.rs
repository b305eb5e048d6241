//! Protocol error types

use thiserror::Error;

/// Errors that can occur while decoding a frame
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame is not a JSON object of the expected shape
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Unknown message type tag
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// A message type that requires a payload arrived without one
    #[error("Missing payload for '{0}' message")]
    MissingPayload(&'static str),

    /// Payload present but of the wrong shape
    #[error("Invalid payload for '{kind}' message: expected {expected}")]
    InvalidPayload {
        kind: &'static str,
        expected: &'static str,
    },

    /// Binary frame that is not UTF-8 text
    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,

    /// Frame exceeds maximum size
    #[error("Frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },
}
