//! Error types for Parley Core.

use thiserror::Error;

/// Core errors that can occur while building or decoding primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid participant id: {0}")]
    InvalidParticipantId(String),

    #[error("invalid participants: {0}")]
    InvalidParticipants(String),

    #[error("unsupported message version: {0}")]
    UnsupportedVersion(u8),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
