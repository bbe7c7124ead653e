//! The ChatCore: one participant's view of every conversation it is in.
//!
//! ChatCore ties identity, the conversation table, key derivation, the
//! codec, the store and the delivery engine together. Every local effect
//! (append, handler notification) is committed before the network is
//! touched, so a failed publish never loses a message.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parley_core::{
    Conversation, ConversationId, ConversationKind, Identity, Message, MessageDraft, MessageId,
    MonotonicClock, ParticipantId,
};
use parley_crypto::{codec, derive_conversation_key, ConversationKey, KeyRing};
use parley_delivery::{DeliveryEngine, DeliveryStats, PublishOutcome, Transport};
use parley_store::{IdentityStore, MemoryIdentityStore, MemoryStore, MessageStore, SqliteStore};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::identity::IdentityManager;
use crate::registry::ConversationRegistry;

/// Result of a send or revoke.
///
/// The message is already stored locally. `delivery` says whether the
/// transport accepted it.
#[derive(Debug)]
pub struct Sent {
    pub message_id: MessageId,
    pub delivery: PublishOutcome,
}

/// The main chat entry point.
///
/// Nothing here is process-global: any number of instances can coexist,
/// each with its own conversations, keys and handlers.
pub struct ChatCore<S, I, T> {
    config: ChatConfig,
    /// Set once by `init`.
    identity: OnceCell<Identity>,
    identities: IdentityManager<I>,
    registry: ConversationRegistry,
    engine: DeliveryEngine<S, T>,
    clock: MonotonicClock,
    closed: AtomicBool,
}

impl<T> ChatCore<SqliteStore, SqliteStore, T>
where
    T: Transport + 'static,
{
    /// Open a SQLite-backed core. The same database holds messages and the
    /// identity.
    pub fn open(path: impl AsRef<Path>, transport: Arc<T>, config: ChatConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(path)?);
        Ok(Self::new(config, store.clone(), store, transport))
    }
}

impl<T> ChatCore<MemoryStore, MemoryIdentityStore, T>
where
    T: Transport + 'static,
{
    /// Create a core that keeps everything in memory.
    pub fn in_memory(transport: Arc<T>, config: ChatConfig) -> Self {
        Self::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryIdentityStore::new()),
            transport,
        )
    }
}

impl<S, I, T> ChatCore<S, I, T>
where
    S: MessageStore + 'static,
    I: IdentityStore,
    T: Transport + 'static,
{
    /// Create an uninitialized core. Call [`ChatCore::init`] before anything
    /// else.
    pub fn new(config: ChatConfig, store: Arc<S>, identities: Arc<I>, transport: Arc<T>) -> Self {
        let engine = DeliveryEngine::new(
            store,
            transport,
            Arc::new(KeyRing::new()),
            config.retry.clone(),
        );

        Self {
            identities: IdentityManager::new(identities, config.identity_slot.clone()),
            config,
            identity: OnceCell::new(),
            registry: ConversationRegistry::new(),
            engine,
            clock: MonotonicClock::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Resolve the local identity. Later calls return the identity chosen
    /// by the first one.
    pub async fn init(&self, existing: Option<Identity>) -> Result<Identity> {
        if self.is_closed() {
            return Err(ChatError::Closed);
        }

        let identity = self
            .identity
            .get_or_try_init(|| self.identities.obtain_identity(existing))
            .await?;
        Ok(identity.clone())
    }

    /// The local identity, once initialized.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.get()
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        self.engine.store()
    }

    pub fn stats(&self) -> DeliveryStats {
        self.engine.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Conversations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a conversation, or return the existing one with the same id.
    ///
    /// The local participant is always a member. A new conversation gets
    /// its key and a topic subscription before this returns.
    pub async fn create_conversation(
        &self,
        participants: impl IntoIterator<Item = ParticipantId>,
        kind: ConversationKind,
        display_name: Option<String>,
    ) -> Result<Conversation> {
        let identity = self.ready()?;
        let (conversation, _) = self
            .registry
            .create_or_get(identity.id(), participants, kind, display_name)?;
        self.activate(&conversation.id).await?;
        Ok(conversation)
    }

    /// Join a group whose id was shared out-of-band. Direct ids are refused.
    pub async fn join_group(
        &self,
        id: ConversationId,
        participants: impl IntoIterator<Item = ParticipantId>,
        display_name: Option<String>,
    ) -> Result<Conversation> {
        let identity = self.ready()?;
        let (conversation, _) = self
            .registry
            .join(identity.id(), id, participants, display_name)?;
        self.activate(&conversation.id).await?;
        Ok(conversation)
    }

    /// Every conversation this instance takes part in, ordered by id.
    pub fn conversations(&self) -> Vec<Conversation> {
        self.registry.list()
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<Conversation> {
        self.registry.lookup(id)
    }

    /// Install the key and subscription for a registered conversation.
    /// Keys are derived once and never replaced.
    ///
    /// Subscribing and replay are each bounded by the retry policy's
    /// `attempt_timeout_ms`. A timed-out subscribe fails the call and is
    /// retried by the next one; a timed-out replay is skipped.
    async fn activate(&self, conversation_id: &ConversationId) -> Result<()> {
        let keys = self.engine.keys();
        if !keys.contains(conversation_id) {
            let key =
                derive_conversation_key(conversation_id, self.config.key_material_bytes());
            keys.insert(conversation_id.clone(), key);
        }

        let opened = self.engine.ensure_subscribed(conversation_id).await?;
        if opened && self.config.replay_on_subscribe {
            self.engine.replay_history(conversation_id).await?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sending
    // ─────────────────────────────────────────────────────────────────────────

    /// Send a text message.
    ///
    /// Returns once the message is stored locally and the publish has
    /// either succeeded or run out of retries.
    pub async fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: impl Into<String>,
    ) -> Result<Sent> {
        let identity = self.ready()?;
        self.require_conversation(conversation_id)?;
        let key = self.key_for(conversation_id)?;

        let draft =
            codec::build_text_message(conversation_id, identity.id(), content, self.clock.now());
        self.commit_and_publish(draft, identity, &key).await
    }

    /// Revoke one of our own messages by publishing a tombstone for it.
    ///
    /// Compliant receivers hide the target; nothing is erased.
    pub async fn revoke_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Sent> {
        let identity = self.ready()?;
        self.require_conversation(conversation_id)?;
        let key = self.key_for(conversation_id)?;

        let target = self
            .engine
            .store()
            .get(conversation_id, message_id)
            .await?
            .ok_or_else(|| ChatError::MessageNotFound(message_id.clone()))?;

        let draft =
            codec::build_tombstone(conversation_id, identity.id(), &target, self.clock.now())?;
        self.commit_and_publish(draft, identity, &key).await
    }

    async fn commit_and_publish(
        &self,
        draft: MessageDraft,
        identity: &Identity,
        key: &ConversationKey,
    ) -> Result<Sent> {
        let message = codec::seal(draft, identity, key);
        let payload = codec::encode_for_wire(&message, key)?;

        if self.engine.store().append(&message).await?.is_inserted() {
            self.engine.notify_local(&message);
        }

        let delivery = self
            .engine
            .publish(message.conversation_id(), payload)
            .await;
        debug!(
            conversation = %message.conversation_id(),
            message = %message.id(),
            kind = ?message.kind(),
            delivered = delivery.is_delivered(),
            "message sent"
        );

        Ok(Sent {
            message_id: message.id().clone(),
            delivery,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Receiving and reading
    // ─────────────────────────────────────────────────────────────────────────

    /// Run `handler` for every new message in the conversation, local ones
    /// included. Duplicates never reach handlers.
    pub async fn subscribe<F>(&self, conversation_id: &ConversationId, handler: F) -> Result<()>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.ready()?;
        self.require_conversation(conversation_id)?;
        self.engine
            .subscribe(conversation_id, Arc::new(handler))
            .await?;
        Ok(())
    }

    /// Messages to display, in the order they were stored. Tombstones and
    /// the messages they revoke are left out.
    pub async fn visible_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        self.ready()?;
        self.require_conversation(conversation_id)?;
        Ok(self.engine.store().visible_messages(conversation_id).await?)
    }

    /// Remove a message from this instance only. Peers keep their copies
    /// and a redelivered copy is ignored. Tombstones are never removed, so
    /// this returns false for them.
    pub async fn delete_message_locally(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<bool> {
        self.ready()?;
        self.require_conversation(conversation_id)?;
        Ok(self
            .engine
            .store()
            .delete_local(conversation_id, message_id)
            .await?)
    }

    /// Pull whatever history the transport has for the conversation, then
    /// return its visible messages.
    pub async fn fetch_history(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        self.ready()?;
        self.require_conversation(conversation_id)?;
        Ok(self.engine.replay_history(conversation_id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Stop all subscriptions. Idempotent; every later operation fails
    /// with [`ChatError::Closed`].
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.engine.close().await;
        info!("chat core closed");
    }

    fn ready(&self) -> Result<&Identity> {
        if self.is_closed() {
            return Err(ChatError::Closed);
        }
        self.identity.get().ok_or(ChatError::NotInitialized)
    }

    fn require_conversation(&self, conversation_id: &ConversationId) -> Result<()> {
        if self.registry.contains(conversation_id) {
            Ok(())
        } else {
            Err(ChatError::ConversationNotFound(conversation_id.clone()))
        }
    }

    fn key_for(&self, conversation_id: &ConversationId) -> Result<ConversationKey> {
        self.engine
            .keys()
            .get(conversation_id)
            .ok_or_else(|| ChatError::EncryptionKeyMissing(conversation_id.clone()))
    }
}
