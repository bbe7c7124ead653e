//! Strong identifier types for Parley.
//!
//! All identifiers are string newtypes so they can travel through the
//! canonical encoding, logs and configuration unchanged, while still being
//! distinct at compile time.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::Ed25519PublicKey;
use crate::error::{CoreError, Result};

/// Length of a participant id in hex characters (32-byte public key).
pub const PARTICIPANT_ID_LEN: usize = 64;

/// Prefix carried by every group conversation id.
pub const GROUP_PREFIX: &str = "group_";

fn random_hex_16() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn short(s: &str) -> &str {
    match s.char_indices().nth(16) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// A participant identifier: the lowercase hex encoding of an Ed25519
/// public key.
///
/// Because the id *is* the public key, a receiver can verify a message
/// signature from the `sender` field alone.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Derive the participant id of a public key.
    pub fn from_public_key(public_key: &Ed25519PublicKey) -> Self {
        Self(public_key.to_hex())
    }

    /// Parse and validate a participant id.
    pub fn parse(s: &str) -> Result<Self> {
        let valid = s.len() == PARTICIPANT_ID_LEN
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid {
            return Err(CoreError::InvalidParticipantId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Recover the Ed25519 public key this id was derived from.
    pub fn public_key(&self) -> Result<Ed25519PublicKey> {
        Ed25519PublicKey::from_hex(&self.0).map_err(|_| CoreError::InvalidPublicKey)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParticipantId({})", short(&self.0))
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ParticipantId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<ParticipantId> for String {
    fn from(id: ParticipantId) -> Self {
        id.0
    }
}

/// A conversation identifier.
///
/// Direct conversation ids are a pure function of their participant set
/// (see [`crate::direct_conversation_id`]); group ids are random.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wrap an existing conversation id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, random group conversation id.
    pub fn generate_group() -> Self {
        Self(format!("{}{}", GROUP_PREFIX, random_hex_16()))
    }

    /// Whether this id has the group shape.
    pub fn is_group(&self) -> bool {
        self.0.starts_with(GROUP_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConversationId({})", short(&self.0))
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message identifier, generated once by the sender.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh random id (128 bits of entropy).
    pub fn generate() -> Self {
        Self(random_hex_16())
    }

    /// Wrap an existing message id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", short(&self.0))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
