//! Per-conversation key derivation.
//!
//! Every participant derives the same key from public inputs, so no
//! handshake is needed. This gives integrity and sender attribution, not
//! confidentiality against anyone who knows the conversation id and the
//! shared material.

use parley_core::ConversationId;

use crate::crypto::ConversationKey;

/// Blake3 `derive_key` context string.
pub const KEY_CONTEXT: &str = "parley v1 conversation key";

/// Derive the key for `conversation_id`.
///
/// `shared_material` is a deployment-wide value from configuration (empty
/// by default). The id is length-prefixed so distinct (id, material) pairs
/// never collide.
pub fn derive_conversation_key(
    conversation_id: &ConversationId,
    shared_material: &[u8],
) -> ConversationKey {
    let id = conversation_id.as_str().as_bytes();

    let mut hasher = blake3::Hasher::new_derive_key(KEY_CONTEXT);
    hasher.update(&(id.len() as u64).to_be_bytes());
    hasher.update(id);
    hasher.update(shared_material);
    ConversationKey::from_bytes(*hasher.finalize().as_bytes())
}
