//! Conversations: logical channels between a set of participants.
//!
//! A Direct conversation id is a pure function of its two participants, so
//! both sides arrive at the same id without talking to each other. Group
//! ids are random and have to be shared out-of-band.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{CoreError, Result};
use crate::types::{ConversationId, ParticipantId};

/// Separator placed between participant ids in a Direct conversation id.
pub const DIRECT_SEPARATOR: &str = "_";

/// The kind of conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationKind {
    /// Exactly two participants, deterministic id.
    Direct,
    /// Any number of participants, random id.
    Group,
}

/// A conversation and its membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    /// Sorted and deduplicated.
    pub participants: BTreeSet<ParticipantId>,
    pub display_name: Option<String>,
}

/// Derive the id of the Direct conversation between `participants`.
///
/// The set is already sorted and deduplicated, so the id does not depend
/// on who computes it or in which order members were supplied.
pub fn direct_conversation_id(participants: &BTreeSet<ParticipantId>) -> ConversationId {
    let joined = participants
        .iter()
        .map(ParticipantId::as_str)
        .collect::<Vec<_>>()
        .join(DIRECT_SEPARATOR);
    ConversationId::new(joined)
}

impl Conversation {
    /// Build a Direct conversation. Requires exactly two distinct participants.
    pub fn direct(
        participants: BTreeSet<ParticipantId>,
        display_name: Option<String>,
    ) -> Result<Self> {
        if participants.len() != 2 {
            return Err(CoreError::InvalidParticipants(format!(
                "direct conversation needs exactly 2 distinct participants, got {}",
                participants.len()
            )));
        }
        Ok(Self {
            id: direct_conversation_id(&participants),
            kind: ConversationKind::Direct,
            participants,
            display_name,
        })
    }

    /// Build a Group conversation under a fresh random id.
    pub fn group(participants: BTreeSet<ParticipantId>, display_name: Option<String>) -> Self {
        Self::group_with_id(ConversationId::generate_group(), participants, display_name)
    }

    /// Build a Group conversation under an id learned from elsewhere.
    pub fn group_with_id(
        id: ConversationId,
        participants: BTreeSet<ParticipantId>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            id,
            kind: ConversationKind::Group,
            participants,
            display_name,
        }
    }

    pub fn is_participant(&self, id: &ParticipantId) -> bool {
        self.participants.contains(id)
    }

    /// Merge new members into a group. Membership only grows; Direct
    /// conversations are left untouched. Returns how many were added.
    pub fn add_participants(&mut self, members: impl IntoIterator<Item = ParticipantId>) -> usize {
        if self.kind == ConversationKind::Direct {
            return 0;
        }
        let before = self.participants.len();
        self.participants.extend(members);
        self.participants.len() - before
    }
}
