//! In-memory implementations of the store traits.
//!
//! These are primarily for testing. They have the same semantics as SQLite
//! but keep everything in memory with no persistence.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use parley_core::{ConversationId, Identity, Message, MessageId};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::traits::{identity_from_seed, IdentityStore, InsertResult, MessageStore};

/// In-memory message store.
///
/// Each conversation has its own lock, so appends to different
/// conversations never contend. The outer map lock is only held long enough
/// to find or create a conversation's log.
#[derive(Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<ConversationId, Arc<Mutex<ConversationLog>>>>,
}

#[derive(Default)]
struct ConversationLog {
    messages: Vec<Message>,
    seen: HashSet<MessageId>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self, conversation_id: &ConversationId) -> Result<Option<Arc<Mutex<ConversationLog>>>> {
        let conversations = self
            .conversations
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(conversations.get(conversation_id).cloned())
    }

    fn log_or_create(&self, conversation_id: &ConversationId) -> Result<Arc<Mutex<ConversationLog>>> {
        if let Some(log) = self.log(conversation_id)? {
            return Ok(log);
        }
        let mut conversations = self
            .conversations
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(conversations
            .entry(conversation_id.clone())
            .or_default()
            .clone())
    }

    /// Run `f` against a conversation's log, or return `default` if the
    /// conversation has never been written.
    fn read_log<T>(
        &self,
        conversation_id: &ConversationId,
        default: T,
        f: impl FnOnce(&ConversationLog) -> T,
    ) -> Result<T> {
        match self.log(conversation_id)? {
            Some(log) => {
                let log = log.lock().map_err(|_| StoreError::LockPoisoned)?;
                Ok(f(&log))
            }
            None => Ok(default),
        }
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, message: &Message) -> Result<InsertResult> {
        let log = self.log_or_create(message.conversation_id())?;
        let mut log = log.lock().map_err(|_| StoreError::LockPoisoned)?;

        if !log.seen.insert(message.id().clone()) {
            debug!(message = %message.id(), "duplicate message dropped");
            return Ok(InsertResult::AlreadySeen);
        }
        log.messages.push(message.clone());

        Ok(InsertResult::Inserted)
    }

    async fn get(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Option<Message>> {
        self.read_log(conversation_id, None, |log| {
            log.messages.iter().find(|m| m.id() == message_id).cloned()
        })
    }

    async fn all_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        self.read_log(conversation_id, Vec::new(), |log| log.messages.clone())
    }

    async fn delete_local(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<bool> {
        let Some(log) = self.log(conversation_id)? else {
            return Ok(false);
        };
        let mut log = log.lock().map_err(|_| StoreError::LockPoisoned)?;

        let position = log
            .messages
            .iter()
            .position(|m| m.id() == message_id && !m.is_tombstone());
        match position {
            Some(index) => {
                log.messages.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn has_seen(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<bool> {
        self.read_log(conversation_id, false, |log| log.seen.contains(message_id))
    }

    async fn count(&self, conversation_id: &ConversationId) -> Result<usize> {
        self.read_log(conversation_id, 0, |log| log.messages.len())
    }
}

/// In-memory identity store.
///
/// Seeds are kept as raw bytes so a corrupt record can be planted with
/// [`MemoryIdentityStore::put_raw`].
#[derive(Default)]
pub struct MemoryIdentityStore {
    seeds: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes in a slot, bypassing validation.
    pub fn put_raw(&self, slot: &str, seed: Vec<u8>) -> Result<()> {
        let mut seeds = self.seeds.write().map_err(|_| StoreError::LockPoisoned)?;
        seeds.insert(slot.to_string(), seed);
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn load_identity(&self, slot: &str) -> Result<Option<Identity>> {
        let seeds = self.seeds.read().map_err(|_| StoreError::LockPoisoned)?;
        seeds
            .get(slot)
            .map(|seed| identity_from_seed(slot, seed))
            .transpose()
    }

    async fn save_identity(&self, slot: &str, identity: &Identity) -> Result<()> {
        self.put_raw(slot, identity.secret_seed().to_vec())
    }
}
