//! Message: the immutable unit of chat history.
//!
//! A message is a header, a tagged body, and a seal. The body is either
//! text or a tombstone that hides an earlier message. The seal carries the
//! sender's signature and the conversation MAC, both computed over the
//! canonical encoding of header + body (see [`crate::canonical`]).

use crate::canonical::draft_bytes;
use crate::crypto::{Ed25519Signature, MacTag};
use crate::types::{ConversationId, MessageId, ParticipantId};

/// The current message schema version.
pub const MESSAGE_VERSION: u8 = 1;

/// Wire discriminator for the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Text = 1,
    Tombstone = 2,
}

impl MessageKind {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Text),
            2 => Some(Self::Tombstone),
            _ => None,
        }
    }
}

/// Fields common to every message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: ParticipantId,
    /// Sender-claimed Unix milliseconds. Untrusted.
    pub timestamp: i64,
}

/// What the message says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text { content: String },
    /// Hides `target` from the visible projection of every compliant node.
    Tombstone { target: MessageId },
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Text { .. } => MessageKind::Text,
            MessageBody::Tombstone { .. } => MessageKind::Tombstone,
        }
    }

    /// Text content; empty for tombstones.
    pub fn content(&self) -> &str {
        match self {
            MessageBody::Text { content } => content,
            MessageBody::Tombstone { .. } => "",
        }
    }

    pub fn tombstone_for(&self) -> Option<&MessageId> {
        match self {
            MessageBody::Text { .. } => None,
            MessageBody::Tombstone { target } => Some(target),
        }
    }
}

/// Signature and MAC over the canonical draft bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seal {
    pub signature: Ed25519Signature,
    pub mac: MacTag,
}

impl Seal {
    /// A seal with neither signature nor MAC; never verifies.
    pub const UNSEALED: Self = Self {
        signature: Ed25519Signature::ZERO,
        mac: MacTag::ZERO,
    };
}

/// An unsealed message: everything that gets signed and MAC'd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub header: MessageHeader,
    pub body: MessageBody,
}

impl MessageDraft {
    /// A text draft under a fresh message id.
    pub fn text(
        conversation_id: ConversationId,
        sender: ParticipantId,
        content: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            header: MessageHeader {
                id: MessageId::generate(),
                conversation_id,
                sender,
                timestamp,
            },
            body: MessageBody::Text {
                content: content.into(),
            },
        }
    }

    /// A tombstone draft under a fresh message id.
    ///
    /// No authorization happens here; see `parley_crypto::codec::build_tombstone`.
    pub fn tombstone(
        conversation_id: ConversationId,
        sender: ParticipantId,
        target: MessageId,
        timestamp: i64,
    ) -> Self {
        Self {
            header: MessageHeader {
                id: MessageId::generate(),
                conversation_id,
                sender,
                timestamp,
            },
            body: MessageBody::Tombstone { target },
        }
    }

    /// Canonical bytes covered by the signature and the MAC.
    pub fn signing_bytes(&self) -> Vec<u8> {
        draft_bytes(self)
    }

    pub fn seal(self, seal: Seal) -> Message {
        Message {
            header: self.header,
            body: self.body,
            seal,
        }
    }
}

/// A complete, sealed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub body: MessageBody,
    pub seal: Seal,
}

impl Message {
    pub fn id(&self) -> &MessageId {
        &self.header.id
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.header.conversation_id
    }

    pub fn sender(&self) -> &ParticipantId {
        &self.header.sender
    }

    pub fn timestamp(&self) -> i64 {
        self.header.timestamp
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    pub fn content(&self) -> &str {
        self.body.content()
    }

    pub fn is_tombstone(&self) -> bool {
        self.kind() == MessageKind::Tombstone
    }

    /// The message this tombstone hides, if it is one.
    pub fn tombstone_for(&self) -> Option<&MessageId> {
        self.body.tombstone_for()
    }

    /// The unsealed view of this message.
    pub fn draft(&self) -> MessageDraft {
        MessageDraft {
            header: self.header.clone(),
            body: self.body.clone(),
        }
    }

    /// Canonical bytes covered by the signature and the MAC.
    pub fn signing_bytes(&self) -> Vec<u8> {
        self.draft().signing_bytes()
    }
}
