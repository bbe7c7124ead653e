//! The key ring: conversation id to conversation key.
//!
//! Keys are inserted on first creation or join of a conversation and never
//! removed while the owning instance lives.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use parley_core::{ConversationId, Message};
use tracing::debug;

use crate::codec;
use crate::crypto::ConversationKey;

/// Outcome of a trial decryption over every known key.
#[derive(Debug)]
pub enum TrialOutcome {
    /// Opened under exactly this conversation.
    Opened(Message),
    /// No key opened the payload; `attempts` keys were tried.
    Unattributed { attempts: usize },
}

/// Thread-safe map of conversation keys.
#[derive(Debug, Default)]
pub struct KeyRing {
    keys: RwLock<HashMap<ConversationId, ConversationKey>>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key unless one is already present. Returns true if inserted.
    pub fn insert(&self, conversation_id: ConversationId, key: ConversationKey) -> bool {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        if keys.contains_key(&conversation_id) {
            return false;
        }
        keys.insert(conversation_id, key);
        true
    }

    pub fn get(&self, conversation_id: &ConversationId) -> Option<ConversationKey> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
            .cloned()
    }

    pub fn contains(&self, conversation_id: &ConversationId) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(conversation_id)
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Try every known key against `payload`, stopping at the first that
    /// opens it. Linear in the number of known conversations.
    pub fn trial_open(&self, payload: &[u8]) -> TrialOutcome {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);

        for (conversation_id, key) in keys.iter() {
            match codec::open(payload, conversation_id, key) {
                Ok(message) => return TrialOutcome::Opened(message),
                Err(e) => {
                    debug!(conversation = %conversation_id, error = %e, "trial open failed");
                }
            }
        }

        TrialOutcome::Unattributed {
            attempts: keys.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::derive_conversation_key;
    use parley_core::Identity;

    fn ring_with(ids: &[&str]) -> KeyRing {
        let ring = KeyRing::new();
        for id in ids {
            let id = ConversationId::new(*id);
            let key = derive_conversation_key(&id, b"");
            ring.insert(id, key);
        }
        ring
    }

    #[test]
    fn test_insert_is_first_writer_wins() {
        let ring = KeyRing::new();
        let id = ConversationId::new("c");
        assert!(ring.insert(id.clone(), ConversationKey::from_bytes([1; 32])));
        assert!(!ring.insert(id.clone(), ConversationKey::from_bytes([2; 32])));
        assert_eq!(ring.get(&id), Some(ConversationKey::from_bytes([1; 32])));
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_trial_open_finds_the_right_conversation() {
        let ring = ring_with(&["a", "b", "c"]);
        let alice = Identity::from_seed(&[1; 32]);

        let target = ConversationId::new("b");
        let key = ring.get(&target).unwrap();
        let draft = codec::build_text_message(&target, alice.id(), "to b", 1);
        let message = codec::seal(draft, &alice, &key);
        let wire = codec::encode_for_wire(&message, &key).unwrap();

        match ring.trial_open(&wire) {
            TrialOutcome::Opened(opened) => assert_eq!(opened.conversation_id(), &target),
            other => panic!("expected open, got {:?}", other),
        }
    }

    #[test]
    fn test_trial_open_unknown_payload() {
        let ring = ring_with(&["a", "b"]);
        match ring.trial_open(b"noise") {
            TrialOutcome::Unattributed { attempts } => assert_eq!(attempts, 2),
            other => panic!("expected unattributed, got {:?}", other),
        }
    }
}
