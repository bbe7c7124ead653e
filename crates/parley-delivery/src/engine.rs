//! The delivery engine: publish with retry, subscribe and dispatch, and
//! history replay.
//!
//! ```text
//! transport ──payload──> subscription task ──> trial open (KeyRing)
//!                                                  │
//!                                      MessageStore::append (dedup)
//!                                                  │ Inserted
//!                                       handlers, registration order
//! ```
//!
//! One background task runs per subscribed conversation. Tasks only hold
//! the shared state, never the engine itself, so dropping or closing the
//! engine stops them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use parley_core::{ConversationId, Message};
use parley_crypto::{KeyRing, TrialOutcome};
use parley_store::{InsertResult, MessageStore};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{DeliveryError, Result};
use crate::retry::{PublishOutcome, RetryPolicy};
use crate::transport::{topic_for, Subscription, Transport};

/// A callback run for every new message in a conversation.
pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Snapshot of the engine's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Inbound payloads processed.
    pub received: u64,
    /// Inbound messages already in the store.
    pub duplicates: u64,
    /// Inbound payloads no known key could open.
    pub dropped_unattributed: u64,
    /// Publishes that never reached the transport.
    pub publish_failures: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    duplicates: AtomicU64,
    dropped_unattributed: AtomicU64,
    publish_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            received: self.received.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            dropped_unattributed: self.dropped_unattributed.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

/// State shared with subscription tasks.
struct Shared<S> {
    store: Arc<S>,
    keys: Arc<KeyRing>,
    handlers: RwLock<HashMap<ConversationId, Vec<Handler>>>,
    counters: Counters,
}

impl<S: MessageStore> Shared<S> {
    /// Trial-open, append, and dispatch one inbound payload.
    async fn ingest(&self, payload: &[u8]) -> Result<Option<Message>> {
        Counters::bump(&self.counters.received);

        let message = match self.keys.trial_open(payload) {
            TrialOutcome::Opened(message) => message,
            TrialOutcome::Unattributed { attempts } => {
                Counters::bump(&self.counters.dropped_unattributed);
                debug!(keys = attempts, "payload matched no known conversation");
                return Ok(None);
            }
        };

        match self.store.append(&message).await? {
            InsertResult::Inserted => {
                debug!(
                    conversation = %message.conversation_id(),
                    message = %message.id(),
                    "message received"
                );
                self.dispatch(&message);
                Ok(Some(message))
            }
            InsertResult::AlreadySeen => {
                Counters::bump(&self.counters.duplicates);
                Ok(None)
            }
        }
    }

    /// Run the handlers for the message's conversation, outside the lock.
    fn dispatch(&self, message: &Message) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(message.conversation_id())
            .cloned()
            .unwrap_or_default();

        for handler in handlers {
            handler(message);
        }
    }
}

/// Publishes, subscribes and replays conversation traffic.
pub struct DeliveryEngine<S, T> {
    shared: Arc<Shared<S>>,
    transport: Arc<T>,
    policy: RetryPolicy,
    subscriptions: Mutex<HashMap<ConversationId, JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<S, T> DeliveryEngine<S, T>
where
    S: MessageStore + 'static,
    T: Transport + 'static,
{
    pub fn new(store: Arc<S>, transport: Arc<T>, keys: Arc<KeyRing>, policy: RetryPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                keys,
                handlers: RwLock::new(HashMap::new()),
                counters: Counters::default(),
            }),
            transport,
            policy,
            subscriptions: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn keys(&self) -> &Arc<KeyRing> {
        &self.shared.keys
    }

    pub fn store(&self) -> &Arc<S> {
        &self.shared.store
    }

    pub fn stats(&self) -> DeliveryStats {
        self.shared.counters.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Publish a payload on the conversation's topic under the retry
    /// policy.
    pub async fn publish(&self, conversation_id: &ConversationId, payload: Bytes) -> PublishOutcome {
        if self.is_closed() {
            return PublishOutcome::Failed {
                attempts: 0,
                error: DeliveryError::Closed,
            };
        }

        let topic = topic_for(conversation_id);
        let result = self
            .policy
            .run(|_| {
                let transport = self.transport.clone();
                let topic = topic.clone();
                let payload = payload.clone();
                async move { transport.publish(&topic, payload).await }
            })
            .await;

        match result {
            Ok(((), attempts)) => {
                debug!(conversation = %conversation_id, attempts, "published");
                PublishOutcome::Delivered { attempts }
            }
            Err(error) => {
                Counters::bump(&self.shared.counters.publish_failures);
                let attempts = match &error {
                    DeliveryError::Timeout { attempts } | DeliveryError::Exhausted { attempts, .. } => {
                        *attempts
                    }
                    _ => 0,
                };
                warn!(conversation = %conversation_id, attempts, %error, "publish failed");
                PublishOutcome::Failed { attempts, error }
            }
        }
    }

    /// Register a handler for a conversation. Handlers run in registration
    /// order.
    pub fn add_handler(&self, conversation_id: &ConversationId, handler: Handler) {
        self.shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(conversation_id.clone())
            .or_default()
            .push(handler);
    }

    fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.policy.attempt_timeout_ms)
    }

    /// Subscribe to the conversation's topic unless already subscribed.
    /// Returns true if a new subscription was opened.
    ///
    /// The transport gets one attempt of `attempt_timeout_ms` to open the
    /// subscription.
    pub async fn ensure_subscribed(&self, conversation_id: &ConversationId) -> Result<bool> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }

        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.contains_key(conversation_id) {
            return Ok(false);
        }

        let topic = topic_for(conversation_id);
        let opening = self.transport.subscribe(&topic);
        let subscription = tokio::time::timeout(self.attempt_timeout(), opening)
            .await
            .map_err(|_| {
                warn!(conversation = %conversation_id, %topic, "subscribe timed out");
                DeliveryError::Timeout { attempts: 1 }
            })??;
        let task = tokio::spawn(Self::subscription_task(
            self.shared.clone(),
            conversation_id.clone(),
            subscription,
        ));
        subscriptions.insert(conversation_id.clone(), task);

        info!(conversation = %conversation_id, %topic, "subscription opened");
        Ok(true)
    }

    /// Register `handler` and make sure the topic is subscribed exactly
    /// once.
    pub async fn subscribe(&self, conversation_id: &ConversationId, handler: Handler) -> Result<()> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.add_handler(conversation_id, handler);
        self.ensure_subscribed(conversation_id).await?;
        Ok(())
    }

    pub async fn is_subscribed(&self, conversation_id: &ConversationId) -> bool {
        self.subscriptions.lock().await.contains_key(conversation_id)
    }

    /// Process one inbound payload as if it arrived on a subscription.
    pub async fn ingest(&self, payload: &[u8]) -> Result<Option<Message>> {
        self.shared.ingest(payload).await
    }

    /// Run the handlers for a locally produced message.
    pub fn notify_local(&self, message: &Message) {
        self.shared.dispatch(message);
    }

    /// Pull the topic's history through the inbound pipeline, then return
    /// the conversation's visible messages.
    ///
    /// Without history support, or if the query fails or outlasts
    /// `attempt_timeout_ms`, this returns what is already known locally.
    pub async fn replay_history(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        let topic = topic_for(conversation_id);
        let query = self.transport.query_history(&topic);

        match tokio::time::timeout(self.attempt_timeout(), query).await {
            Err(_) => {
                warn!(conversation = %conversation_id, "history query timed out");
            }
            Ok(Ok(Some(payloads))) => {
                let mut fresh = 0usize;
                for payload in &payloads {
                    if self.shared.ingest(payload).await?.is_some() {
                        fresh += 1;
                    }
                }
                info!(
                    conversation = %conversation_id,
                    payloads = payloads.len(),
                    fresh,
                    "history replayed"
                );
            }
            Ok(Ok(None)) => {
                debug!(conversation = %conversation_id, "transport keeps no history");
            }
            Ok(Err(e)) => {
                warn!(conversation = %conversation_id, error = %e, "history query failed");
            }
        }

        Ok(self.shared.store.visible_messages(conversation_id).await?)
    }

    /// Stop every subscription task and unsubscribe their topics.
    /// Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let subscriptions: Vec<_> = self.subscriptions.lock().await.drain().collect();
        for (conversation_id, task) in subscriptions {
            task.abort();
            if let Err(e) = self.transport.unsubscribe(&topic_for(&conversation_id)).await {
                warn!(conversation = %conversation_id, error = %e, "unsubscribe failed");
            }
        }
        info!("delivery engine closed");
    }

    async fn subscription_task(
        shared: Arc<Shared<S>>,
        conversation_id: ConversationId,
        mut subscription: Subscription,
    ) {
        debug!(conversation = %conversation_id, "subscription task started");

        while let Some(payload) = subscription.recv().await {
            if let Err(e) = shared.ingest(&payload).await {
                warn!(conversation = %conversation_id, error = %e, "failed to ingest payload");
            }
        }

        debug!(conversation = %conversation_id, "subscription task ended");
    }
}

impl<S, T> Drop for DeliveryEngine<S, T> {
    fn drop(&mut self) {
        for task in self.subscriptions.get_mut().values() {
            task.abort();
        }
    }
}
