//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a shared in-memory network,
//! peers running a full chat core on it, and handler collectors.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use parley::{ChatConfig, ChatCore, Conversation, ConversationKind, RetryPolicy};
use parley_core::{ConversationId, Identity, Message, ParticipantId};
use parley_crypto::{codec, derive_conversation_key, ConversationKey};
use parley_delivery::{MemoryNetwork, MemoryTransport};
use parley_store::{MemoryIdentityStore, MemoryStore};
use tokio::sync::mpsc;

/// How long collectors wait for a message before failing.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(2);

/// A chat core wired to memory storage and the memory bus.
pub type MemoryChat = ChatCore<MemoryStore, MemoryIdentityStore, MemoryTransport>;

/// A retry policy with millisecond backoff so failure paths stay fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 10,
        attempt_timeout_ms: 250,
        deadline_ms: Some(2_000),
    }
}

/// Deterministic identity for `seed`.
pub fn identity(seed: u8) -> Identity {
    Identity::from_seed(&[seed; 32])
}

/// A shared bus that peers join.
pub struct ChatNetwork {
    pub bus: Arc<MemoryNetwork>,
    config: ChatConfig,
}

impl ChatNetwork {
    /// A bus with history and fast retries.
    pub fn new() -> Self {
        Self::with_bus(MemoryNetwork::new())
    }

    /// A bus that keeps no history.
    pub fn without_history() -> Self {
        Self::with_bus(MemoryNetwork::without_history())
    }

    fn with_bus(bus: Arc<MemoryNetwork>) -> Self {
        Self {
            bus,
            config: ChatConfig {
                retry: fast_retry(),
                ..ChatConfig::default()
            },
        }
    }

    /// Use `config` for peers created from now on.
    pub fn with_config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }

    /// Start a peer whose identity is derived from `seed`.
    pub async fn peer(&self, seed: u8) -> anyhow::Result<Peer> {
        let chat = ChatCore::in_memory(
            Arc::new(self.bus.create_transport()),
            self.config.clone(),
        );
        let identity = chat
            .init(Some(identity(seed)))
            .await
            .context("initializing peer")?;

        Ok(Peer {
            id: identity.id().clone(),
            chat,
        })
    }

    /// Start `count` peers with seeds 1..=count.
    pub async fn peers(&self, count: u8) -> anyhow::Result<Vec<Peer>> {
        let mut peers = Vec::with_capacity(count as usize);
        for seed in 1..=count {
            peers.push(self.peer(seed).await?);
        }
        Ok(peers)
    }
}

impl Default for ChatNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// One participant on a [`ChatNetwork`].
pub struct Peer {
    pub id: ParticipantId,
    pub chat: MemoryChat,
}

impl Peer {
    /// Open (or reopen) the Direct conversation with `other`.
    pub async fn direct_with(&self, other: &Peer) -> anyhow::Result<Conversation> {
        Ok(self
            .chat
            .create_conversation([other.id.clone()], ConversationKind::Direct, None)
            .await?)
    }

    /// Subscribe a collector to the conversation.
    pub async fn inbox(&self, conversation_id: &ConversationId) -> anyhow::Result<Inbox> {
        let (handler, inbox) = collector();
        self.chat.subscribe(conversation_id, handler).await?;
        Ok(inbox)
    }

    /// Contents of the visible messages, in store order.
    pub async fn visible_contents(
        &self,
        conversation_id: &ConversationId,
    ) -> anyhow::Result<Vec<String>> {
        Ok(self
            .chat
            .visible_messages(conversation_id)
            .await?
            .iter()
            .map(|m| m.content().to_string())
            .collect())
    }
}

/// Messages seen by a handler, in the order it ran.
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Message>,
    wait: Duration,
}

/// A handler that forwards every message into an [`Inbox`].
pub fn collector() -> (impl Fn(&Message) + Send + Sync + 'static, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |message: &Message| {
        let _ = tx.send(message.clone());
    };
    (
        handler,
        Inbox {
            rx,
            wait: DEFAULT_WAIT,
        },
    )
}

impl Inbox {
    /// Wait for the next message.
    pub async fn next(&mut self) -> anyhow::Result<Message> {
        tokio::time::timeout(self.wait, self.rx.recv())
            .await
            .map_err(|_| anyhow!("no message within {:?}", self.wait))?
            .ok_or_else(|| anyhow!("handler was dropped"))
    }

    /// Wait for the next `n` messages.
    pub async fn next_n(&mut self, n: usize) -> anyhow::Result<Vec<Message>> {
        let mut messages = Vec::with_capacity(n);
        for _ in 0..n {
            messages.push(self.next().await?);
        }
        Ok(messages)
    }

    /// Fail if anything arrives within `period`.
    pub async fn expect_quiet(&mut self, period: Duration) -> anyhow::Result<()> {
        match tokio::time::timeout(period, self.rx.recv()).await {
            Err(_) | Ok(None) => Ok(()),
            Ok(Some(message)) => Err(anyhow!("unexpected message {}", message.id())),
        }
    }
}

/// Sealed text message and its wire payload, built outside any chat core.
pub fn sealed_text(
    sender: &Identity,
    conversation_id: &ConversationId,
    key: &ConversationKey,
    content: &str,
    timestamp: i64,
) -> anyhow::Result<(Message, Vec<u8>)> {
    let draft = codec::build_text_message(conversation_id, sender.id(), content, timestamp);
    let message = codec::seal(draft, sender, key);
    let wire = codec::encode_for_wire(&message, key)?;
    Ok((message, wire.to_vec()))
}

/// The key a default-configured core derives for `conversation_id`.
pub fn default_key(conversation_id: &ConversationId) -> ConversationKey {
    derive_conversation_key(conversation_id, ChatConfig::default().key_material_bytes())
}
