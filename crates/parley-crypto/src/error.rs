//! Error types for the message codec.

use parley_core::{ConversationId, CoreError};
use thiserror::Error;

/// Errors that can occur while building, sealing or opening messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Decryption failed (wrong key or tampered ciphertext).
    #[error("decryption failed")]
    DecryptionFailed,

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The plaintext is not a well-formed message.
    #[error("malformed message: {0}")]
    Malformed(#[from] CoreError),

    /// Signature missing or does not match the sender.
    #[error("invalid signature")]
    InvalidSignature,

    /// MAC does not match the conversation key.
    #[error("invalid mac")]
    InvalidMac,

    /// The message names a different conversation than the key it opened under.
    #[error("conversation mismatch: opened under {expected}, message names {found}")]
    ConversationMismatch {
        expected: ConversationId,
        found: ConversationId,
    },

    /// Only the original sender may revoke a message.
    #[error("only the original sender may revoke a message")]
    NotAuthorSender,

    /// Tombstones cannot themselves be revoked.
    #[error("tombstones cannot be revoked")]
    NotRevocable,
}

impl CodecError {
    /// Whether this error means the payload failed authentication under a
    /// trial key. These are expected during trial decryption.
    pub fn is_authenticity(&self) -> bool {
        matches!(
            self,
            CodecError::DecryptionFailed
                | CodecError::SerializationError(_)
                | CodecError::Malformed(_)
                | CodecError::InvalidSignature
                | CodecError::InvalidMac
                | CodecError::ConversationMismatch { .. }
        )
    }
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
