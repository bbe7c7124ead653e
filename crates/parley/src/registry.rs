//! The table of conversations this instance takes part in.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use parley_core::{Conversation, ConversationId, ConversationKind, ParticipantId};
use tracing::info;

use crate::error::{ChatError, Result};

/// Conversations known to one chat core, keyed by id.
///
/// Ids and kinds never change once registered. Group membership only grows.
#[derive(Default)]
pub struct ConversationRegistry {
    conversations: RwLock<HashMap<ConversationId, Conversation>>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation, or return the existing one with the same id.
    ///
    /// `own_id` is always added to the participants. Direct conversations
    /// must end up with exactly two distinct members. Returns whether a new
    /// entry was created.
    pub fn create_or_get(
        &self,
        own_id: &ParticipantId,
        participants: impl IntoIterator<Item = ParticipantId>,
        kind: ConversationKind,
        display_name: Option<String>,
    ) -> Result<(Conversation, bool)> {
        let mut members: BTreeSet<ParticipantId> = participants.into_iter().collect();
        members.insert(own_id.clone());

        let conversation = match kind {
            ConversationKind::Direct => Conversation::direct(members, display_name)?,
            ConversationKind::Group => Conversation::group(members, display_name),
        };

        Ok(self.insert_or_merge(conversation))
    }

    /// Register a group learned from elsewhere. A group already present
    /// gains any new members instead. Only group ids are accepted.
    pub fn join(
        &self,
        own_id: &ParticipantId,
        id: ConversationId,
        participants: impl IntoIterator<Item = ParticipantId>,
        display_name: Option<String>,
    ) -> Result<(Conversation, bool)> {
        if !id.is_group() {
            return Err(ChatError::NotAGroup(id));
        }

        let mut members: BTreeSet<ParticipantId> = participants.into_iter().collect();
        members.insert(own_id.clone());

        Ok(self.insert_or_merge(Conversation::group_with_id(id, members, display_name)))
    }

    fn insert_or_merge(&self, conversation: Conversation) -> (Conversation, bool) {
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = conversations.get_mut(&conversation.id) {
            existing.add_participants(conversation.participants);
            return (existing.clone(), false);
        }

        info!(
            conversation = %conversation.id,
            kind = ?conversation.kind,
            participants = conversation.participants.len(),
            "conversation registered"
        );
        conversations.insert(conversation.id.clone(), conversation.clone());
        (conversation, true)
    }

    pub fn lookup(&self, id: &ConversationId) -> Option<Conversation> {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Every registered conversation, ordered by id.
    pub fn list(&self) -> Vec<Conversation> {
        let mut all: Vec<Conversation> = self
            .conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        all
    }
}
