//! Store traits: the abstract interfaces for message and identity
//! persistence.
//!
//! These traits keep the delivery engine and the chat facade
//! storage-agnostic. Implementations include SQLite (primary) and
//! in-memory (for tests).

use std::collections::HashSet;

use async_trait::async_trait;
use parley_core::{ConversationId, Identity, Message, MessageId, ParticipantId};

use crate::error::Result;

/// The identity slot used when none is configured.
pub const DEFAULT_IDENTITY_SLOT: &str = "default";

/// Result of appending a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Message was new and is now in the log.
    Inserted,
    /// Message id was already seen (idempotent - not an error).
    AlreadySeen,
}

impl InsertResult {
    pub fn is_inserted(self) -> bool {
        self == InsertResult::Inserted
    }
}

/// The MessageStore trait: an append-only log per conversation with
/// deduplication and tombstone-based logical deletion.
///
/// # Design Notes
///
/// - **Idempotent appends**: appending an id twice returns `AlreadySeen`,
///   atomically with respect to concurrent appends of the same id.
/// - **Insertion order**: logs keep arrival order, not timestamp order.
/// - **Seen markers outlive entries**: `delete_local` removes the entry but
///   not the marker, so re-delivery of a deleted message is dropped.
/// - **Tombstones stay**: `delete_local` never removes a tombstone, so a
///   revoked message cannot become visible again.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message to its conversation's log.
    async fn append(&self, message: &Message) -> Result<InsertResult>;

    /// Get a stored message by id.
    async fn get(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Option<Message>>;

    /// Every stored message, tombstones included, in insertion order.
    async fn all_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>>;

    /// The user-facing view of a conversation. See [`visible_projection`].
    async fn visible_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        let all = self.all_messages(conversation_id).await?;
        Ok(visible_projection(&all))
    }

    /// Remove a message from the local log only. Returns whether an entry
    /// was removed. Tombstones are never removed.
    async fn delete_local(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<bool>;

    /// Whether this id has ever been appended (deleted entries included).
    async fn has_seen(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<bool>;

    /// Number of entries currently in the log.
    async fn count(&self, conversation_id: &ConversationId) -> Result<usize>;
}

/// Persistence for the local identity, keyed by slot.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Load the identity in `slot`.
    ///
    /// A record that exists but cannot be turned into an identity is
    /// reported as `StoreError::InvalidData`.
    async fn load_identity(&self, slot: &str) -> Result<Option<Identity>>;

    /// Save (or replace) the identity in `slot`.
    async fn save_identity(&self, slot: &str, identity: &Identity) -> Result<()>;
}

/// Rebuild an identity from a stored seed.
pub(crate) fn identity_from_seed(slot: &str, seed: &[u8]) -> Result<Identity> {
    let seed: [u8; 32] = seed.try_into().map_err(|_| {
        crate::error::StoreError::InvalidData(format!(
            "identity seed in slot {} has {} bytes, expected 32",
            slot,
            seed.len()
        ))
    })?;
    Ok(Identity::from_seed(&seed))
}

/// Project a conversation log to what the user sees.
///
/// Tombstones never appear. A text message is hidden when the log holds a
/// tombstone targeting it from the same sender; tombstones from anyone else
/// are ignored. Order is preserved.
pub fn visible_projection(messages: &[Message]) -> Vec<Message> {
    let revoked: HashSet<(&MessageId, &ParticipantId)> = messages
        .iter()
        .filter_map(|m| m.tombstone_for().map(|target| (target, m.sender())))
        .collect();

    messages
        .iter()
        .filter(|m| !m.is_tombstone())
        .filter(|m| !revoked.contains(&(m.id(), m.sender())))
        .cloned()
        .collect()
}
