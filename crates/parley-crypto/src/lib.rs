//! # Parley Crypto
//!
//! Conversation keys, encrypted envelopes, and the message codec.
//!
//! ## Overview
//!
//! Every conversation has one symmetric [`ConversationKey`], derived by
//! every participant from the conversation id and a deployment-wide shared
//! value (see [`kdf`]). Outbound messages are signed by the sender's
//! Ed25519 key, MAC'd under the conversation key, canonically encoded and
//! encrypted into an [`EncryptedPayload`].
//!
//! Inbound payloads carry no cleartext routing information, so receivers
//! attribute them by trial decryption against every key in their
//! [`KeyRing`].
//!
//! ## Key Types
//!
//! - [`ConversationKey`] - ChaCha20-Poly1305 key plus Blake3 MAC key
//! - [`EncryptedPayload`] - The CBOR envelope that goes on the wire
//! - [`KeyRing`] - Known conversation keys and the trial-open scan
//! - [`CodecError`] - Everything that can go wrong building or opening messages
//!
//! ## Usage
//!
//! ```rust,no_run
//! use parley_core::{ConversationId, Identity};
//! use parley_crypto::{codec, derive_conversation_key};
//!
//! let alice = Identity::generate();
//! let conversation = ConversationId::generate_group();
//! let key = derive_conversation_key(&conversation, b"");
//!
//! let draft = codec::build_text_message(&conversation, alice.id(), "hi", 0);
//! let message = codec::seal(draft, &alice, &key);
//! let wire = codec::encode_for_wire(&message, &key).unwrap();
//!
//! let opened = codec::open(&wire, &conversation, &key).unwrap();
//! assert_eq!(opened, message);
//! ```

pub mod codec;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod keyring;

pub use crypto::{ConversationKey, EncryptionNonce};
pub use envelope::{EncryptedPayload, EncryptionFormat};
pub use error::{CodecError, Result};
pub use kdf::derive_conversation_key;
pub use keyring::{KeyRing, TrialOutcome};
