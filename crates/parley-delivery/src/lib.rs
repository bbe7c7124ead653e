//! # Parley Delivery
//!
//! Moves sealed, encrypted messages between nodes over an abstract
//! publish/subscribe transport.
//!
//! ## Overview
//!
//! The transport is assumed to be at-least-once and unordered. The
//! [`DeliveryEngine`] makes that safe to consume:
//!
//! - **Publish** retries with exponential backoff under a [`RetryPolicy`];
//!   failure comes back as a [`PublishOutcome`], never as a panic or hang.
//! - **Subscribe** opens each conversation topic once and runs one task per
//!   topic that trial-opens payloads against the [`parley_crypto::KeyRing`].
//! - **Dedup** is delegated to the [`parley_store::MessageStore`]; handlers
//!   only see messages the store had not seen before.
//! - **Replay** pulls a topic's history through the same pipeline.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parley_core::ConversationId;
//! use parley_crypto::{derive_conversation_key, KeyRing};
//! use parley_delivery::{DeliveryEngine, MemoryNetwork, RetryPolicy};
//! use parley_store::MemoryStore;
//!
//! async fn example() {
//!     let network = MemoryNetwork::new();
//!     let keys = Arc::new(KeyRing::new());
//!     let engine = DeliveryEngine::new(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(network.create_transport()),
//!         keys.clone(),
//!         RetryPolicy::default(),
//!     );
//!
//!     let conversation = ConversationId::generate_group();
//!     keys.insert(conversation.clone(), derive_conversation_key(&conversation, b""));
//!     engine
//!         .subscribe(&conversation, Arc::new(|m: &parley_core::Message| println!("{}", m.content())))
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod engine;
pub mod error;
pub mod retry;
pub mod transport;

pub use engine::{DeliveryEngine, DeliveryStats, Handler};
pub use error::{DeliveryError, Result};
pub use retry::{PublishOutcome, RetryPolicy};
pub use transport::{
    memory::MemoryNetwork, memory::MemoryTransport, topic_for, Subscription, Transport,
};
