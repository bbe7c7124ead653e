//! # Parley Store
//!
//! Storage abstraction for Parley. Provides trait-based interfaces for the
//! per-conversation message log and the local identity, with SQLite and
//! in-memory implementations.
//!
//! ## Key Types
//!
//! - [`MessageStore`] - Append-only message log with dedup and tombstones
//! - [`IdentityStore`] - Slot-keyed persistence for the local identity
//! - [`SqliteStore`] - SQLite-based persistent storage (implements both)
//! - [`MemoryStore`] / [`MemoryIdentityStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of appending a message
//!
//! ## Usage
//!
//! ```rust,no_run
//! use parley_store::{MessageStore, SqliteStore};
//! use parley_core::ConversationId;
//!
//! async fn example() {
//!     let store = SqliteStore::open("parley.db").unwrap();
//!
//!     let conversation = ConversationId::new("group_00112233445566778899aabbccddeeff");
//!     let visible = store.visible_messages(&conversation).await.unwrap();
//!     println!("{} visible messages", visible.len());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent appends**: Appending the same message id twice returns `AlreadySeen`
//! - **Logical deletion**: Tombstones hide their target from [`visible_projection`]
//!   only when both share a sender
//! - **Local deletion**: `delete_local` drops the entry but keeps the dedup marker

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::{MemoryIdentityStore, MemoryStore};
pub use sqlite::SqliteStore;
pub use traits::{
    visible_projection, IdentityStore, InsertResult, MessageStore, DEFAULT_IDENTITY_SLOT,
};
