//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend for Parley. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use parley_core::{
    decode_message, encode_message, now_millis, ConversationId, Identity, Message, MessageId,
    MessageKind,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{identity_from_seed, IdentityStore, InsertResult, MessageStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime. One connection serves both the
/// message log and the identity slots.
#[derive(Clone)]
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn decode_row(encoded: &[u8]) -> Result<Message> {
    decode_message(encoded).map_err(|e| StoreError::InvalidData(e.to_string()))
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append(&self, message: &Message) -> Result<InsertResult> {
        let message = message.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let now = now_millis();
            let conversation_id = message.conversation_id().as_str();
            let message_id = message.id().as_str();

            let marked = tx.execute(
                "INSERT OR IGNORE INTO seen (conversation_id, message_id, seen_at)
                 VALUES (?1, ?2, ?3)",
                params![conversation_id, message_id, now],
            )?;

            if marked == 0 {
                debug!(message = %message.id(), "duplicate message dropped");
                return Ok(InsertResult::AlreadySeen);
            }

            tx.execute(
                "INSERT INTO messages (
                    conversation_id, message_id, sender, kind, tombstone_for,
                    timestamp, encoded, ingested_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    conversation_id,
                    message_id,
                    message.sender().as_str(),
                    message.kind().to_u8(),
                    message.tombstone_for().map(MessageId::as_str),
                    message.timestamp(),
                    encode_message(&message),
                    now,
                ],
            )?;

            tx.commit()?;
            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Option<Message>> {
        let conversation_id = conversation_id.clone();
        let message_id = message_id.clone();

        self.run(move |conn| {
            let encoded: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT encoded FROM messages
                     WHERE conversation_id = ?1 AND message_id = ?2",
                    params![conversation_id.as_str(), message_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            encoded.as_deref().map(decode_row).transpose()
        })
        .await
    }

    async fn all_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        let conversation_id = conversation_id.clone();

        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT encoded FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY ordinal",
            )?;

            let rows = stmt.query_map(params![conversation_id.as_str()], |row| {
                row.get::<_, Vec<u8>>(0)
            })?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(decode_row(&row?)?);
            }
            Ok(messages)
        })
        .await
    }

    async fn delete_local(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<bool> {
        let conversation_id = conversation_id.clone();
        let message_id = message_id.clone();

        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM messages
                 WHERE conversation_id = ?1 AND message_id = ?2 AND kind != ?3",
                params![
                    conversation_id.as_str(),
                    message_id.as_str(),
                    MessageKind::Tombstone.to_u8()
                ],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn has_seen(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<bool> {
        let conversation_id = conversation_id.clone();
        let message_id = message_id.clone();

        self.run(move |conn| {
            let seen: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM seen WHERE conversation_id = ?1 AND message_id = ?2",
                    params![conversation_id.as_str(), message_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(seen.is_some())
        })
        .await
    }

    async fn count(&self, conversation_id: &ConversationId) -> Result<usize> {
        let conversation_id = conversation_id.clone();

        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                params![conversation_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn load_identity(&self, slot: &str) -> Result<Option<Identity>> {
        let slot = slot.to_string();

        self.run(move |conn| {
            let seed: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT seed FROM identities WHERE slot = ?1",
                    params![slot],
                    |row| row.get(0),
                )
                .optional()?;

            seed.map(|seed| identity_from_seed(&slot, &seed)).transpose()
        })
        .await
    }

    async fn save_identity(&self, slot: &str, identity: &Identity) -> Result<()> {
        let slot = slot.to_string();
        let seed = identity.secret_seed();

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO identities (slot, seed, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(slot) DO UPDATE SET seed = excluded.seed,
                                                 updated_at = excluded.updated_at",
                params![slot, seed.as_slice(), now_millis()],
            )?;
            Ok(())
        })
        .await
    }
}
