//! Error types for the chat core.

use parley_core::{ConversationId, CoreError, MessageId};
use parley_crypto::CodecError;
use parley_delivery::DeliveryError;
use parley_store::StoreError;
use thiserror::Error;

/// Errors that can occur during chat operations.
#[derive(Debug, Error)]
pub enum ChatError {
    /// `init` has not completed.
    #[error("chat core not initialized")]
    NotInitialized,

    /// `close` has been called.
    #[error("chat core closed")]
    Closed,

    /// Conversation not found.
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    /// A registered conversation has no key. Indicates a bug.
    #[error("no encryption key for conversation {0}")]
    EncryptionKeyMissing(ConversationId),

    /// Only the original sender may revoke a message.
    #[error("only the original sender may revoke a message")]
    NotAuthorSender,

    /// A direct conversation id where a group id is required.
    #[error("not a group conversation: {0}")]
    NotAGroup(ConversationId),

    /// Message not found.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// Participant set does not fit the conversation kind.
    #[error("invalid participants: {0}")]
    InvalidParticipants(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(CodecError),

    /// Delivery error.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

impl From<CoreError> for ChatError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidParticipants(reason) => ChatError::InvalidParticipants(reason),
            other => ChatError::Core(other),
        }
    }
}

impl From<CodecError> for ChatError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::NotAuthorSender => ChatError::NotAuthorSender,
            other => ChatError::Codec(other),
        }
    }
}

/// Result type for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;
