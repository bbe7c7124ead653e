//! # Parley
//!
//! A small, transport-agnostic chat core: identities, Direct and Group
//! conversations, signed and encrypted messages, and revocation through
//! tombstones.
//!
//! ## Overview
//!
//! - **Identity**: an Ed25519 keypair; the participant id is the hex public key
//! - **Conversation**: Direct (deterministic id from two members) or Group
//!   (random id shared out-of-band)
//! - **Message**: immutable, signed by its sender, MAC'd and encrypted under
//!   the conversation key
//! - **Tombstone**: a message that hides an earlier one from the same sender
//!
//! Sends are local-first: the message is stored and local handlers run
//! before the transport is tried, with bounded retries.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parley::{ChatConfig, ChatCore, ConversationKind};
//! use parley::delivery::MemoryNetwork;
//!
//! async fn example() -> parley::Result<()> {
//!     let network = MemoryNetwork::new();
//!     let transport = Arc::new(network.create_transport());
//!
//!     let chat = ChatCore::open("chat.db", transport, ChatConfig::default())?;
//!     let me = chat.init(None).await?;
//!     println!("running as {}", me.id());
//!
//!     let group = chat
//!         .create_conversation([], ConversationKind::Group, Some("team".into()))
//!         .await?;
//!     chat.subscribe(&group.id, |m| println!("{}: {}", m.sender(), m.content()))
//!         .await?;
//!
//!     let sent = chat.send_message(&group.id, "hello").await?;
//!     if !sent.delivery.is_delivered() {
//!         println!("stored locally, not yet delivered");
//!     }
//!
//!     chat.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `parley::core` - ids, identity, conversation and message model
//! - `parley::crypto` - key derivation, envelope and message codec
//! - `parley::store` - message and identity storage (memory, SQLite)
//! - `parley::delivery` - transport contract, retry and delivery engine

pub mod chat;
pub mod config;
pub mod error;
pub mod identity;
pub mod registry;

// Re-export component crates
pub use parley_core as core;
pub use parley_crypto as crypto;
pub use parley_delivery as delivery;
pub use parley_store as store;

pub use chat::{ChatCore, Sent};
pub use config::ChatConfig;
pub use error::{ChatError, Result};
pub use identity::IdentityManager;
pub use registry::ConversationRegistry;

// Re-export commonly used types
pub use parley_core::{
    Conversation, ConversationId, ConversationKind, Identity, Message, MessageId, MessageKind,
    ParticipantId,
};
pub use parley_delivery::{PublishOutcome, RetryPolicy, Transport};
