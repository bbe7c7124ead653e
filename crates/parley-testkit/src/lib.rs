//! # Parley Testkit
//!
//! Testing utilities for Parley.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a shared in-memory network, peers running a full chat
//!   core, and handler collectors
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust
//! use parley_testkit::fixtures::ChatNetwork;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let network = ChatNetwork::new();
//! let alice = network.peer(1).await?;
//! let bob = network.peer(2).await?;
//!
//! let on_alice = alice.direct_with(&bob).await?;
//! let on_bob = bob.direct_with(&alice).await?;
//! assert_eq!(on_alice.id, on_bob.id);
//!
//! let mut inbox = bob.inbox(&on_bob.id).await?;
//! alice.chat.send_message(&on_alice.id, "hi bob").await?;
//! assert_eq!(inbox.next().await?.content(), "hi bob");
//! # Ok(())
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use parley_testkit::generators::{conversation_key, message_from_params, MessageParams};
//!
//! proptest! {
//!     #[test]
//!     fn sealed_messages_verify(params: MessageParams, key in conversation_key()) {
//!         let message = message_from_params(&params, &key);
//!         prop_assert!(parley_crypto::codec::verify_signature(&message));
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{collector, fast_retry, ChatNetwork, Inbox, MemoryChat, Peer};
pub use generators::{message_from_params, MessageParams};
