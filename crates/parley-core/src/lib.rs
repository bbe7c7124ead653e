//! # Parley Core
//!
//! Pure primitives for Parley: participant identities, conversations,
//! messages and their canonical encoding.
//!
//! This crate contains no I/O, no storage, no networking, and no symmetric
//! cryptography. Keys, MACs and encryption live in `parley-crypto`.
//!
//! ## Key Types
//!
//! - [`Identity`] - A keypair plus the [`ParticipantId`] derived from it
//! - [`Conversation`] - A Direct or Group channel between participants
//! - [`Message`] - An immutable, sealed chat message (text or tombstone)
//! - [`MessageDraft`] - The unsealed form that gets signed and MAC'd
//!
//! ## Canonicalization
//!
//! Messages are encoded using deterministic CBOR. See [`canonical`] module.

pub mod canonical;
pub mod clock;
pub mod conversation;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod message;
pub mod types;

pub use canonical::{decode_message, draft_bytes, encode_message};
pub use clock::{now_millis, MonotonicClock};
pub use conversation::{direct_conversation_id, Conversation, ConversationKind};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair, MacTag};
pub use error::{CoreError, Result};
pub use identity::Identity;
pub use message::{Message, MessageBody, MessageDraft, MessageHeader, MessageKind, Seal};
pub use types::{ConversationId, MessageId, ParticipantId};
