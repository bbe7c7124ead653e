//! Transport abstraction: a topic-based publish/subscribe bus.
//!
//! The transport delivers opaque payloads at least once, in no particular
//! order. It may also be able to replay a topic's history. Implementations
//! may use gossip networks, relays, or any other bus.

use async_trait::async_trait;
use bytes::Bytes;
use parley_core::{Blake3Hash, ConversationId};
use tokio::sync::mpsc;

use crate::error::Result;

/// Stream of payloads published to a subscribed topic.
///
/// Duplicates are possible; ordering is not guaranteed. The stream ends
/// when the topic is unsubscribed.
pub type Subscription = mpsc::Receiver<Bytes>;

/// The transport topic carrying a conversation's traffic.
///
/// The conversation id is hashed so participant ids do not leak into topic
/// names.
pub fn topic_for(conversation_id: &ConversationId) -> String {
    let digest = Blake3Hash::hash(conversation_id.as_str().as_bytes());
    format!("/parley/1/{}/cbor", digest.to_hex())
}

/// Transport trait for publishing and receiving conversation payloads.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a payload to a topic. May fail transiently.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;

    /// Subscribe to a topic.
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;

    /// Stop receiving a topic. Unknown topics are a no-op.
    async fn unsubscribe(&self, topic: &str) -> Result<()>;

    /// Every payload the transport remembers for a topic, or `None` if it
    /// keeps no history.
    async fn query_history(&self, topic: &str) -> Result<Option<Vec<Bytes>>>;
}

/// A simple in-memory bus for testing.
///
/// Uses channels to simulate a shared pub/sub network between nodes.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tracing::debug;

    use crate::error::DeliveryError;

    /// Per-subscriber channel capacity.
    const CHANNEL_CAPACITY: usize = 1024;

    type NodeId = u64;

    #[derive(Default)]
    struct TopicState {
        subscribers: HashMap<NodeId, mpsc::Sender<Bytes>>,
        history: Vec<Bytes>,
    }

    /// Shared state for the memory network.
    pub struct MemoryNetwork {
        topics: RwLock<HashMap<String, TopicState>>,
        next_node: AtomicU64,
        keep_history: bool,
        fail_next: AtomicUsize,
        hang_publish: AtomicBool,
        hang_subscribe: AtomicBool,
        hang_history: AtomicBool,
        publishes: AtomicU64,
    }

    impl MemoryNetwork {
        /// Create a network that remembers every topic's history.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::with_history(true))
        }

        /// Create a network with no history support.
        pub fn without_history() -> Arc<Self> {
            Arc::new(Self::with_history(false))
        }

        fn with_history(keep_history: bool) -> Self {
            Self {
                topics: RwLock::new(HashMap::new()),
                next_node: AtomicU64::new(1),
                keep_history,
                fail_next: AtomicUsize::new(0),
                hang_publish: AtomicBool::new(false),
                hang_subscribe: AtomicBool::new(false),
                hang_history: AtomicBool::new(false),
                publishes: AtomicU64::new(0),
            }
        }

        /// Create a transport connected to this network.
        pub fn create_transport(self: &Arc<Self>) -> MemoryTransport {
            MemoryTransport {
                node_id: self.next_node.fetch_add(1, Ordering::Relaxed),
                network: Arc::clone(self),
            }
        }

        /// Make the next `n` publishes fail with a transport error.
        pub fn fail_next_publishes(&self, n: usize) {
            self.fail_next.store(n, Ordering::SeqCst);
        }

        /// While set, publishes never complete.
        pub fn hang_publishes(&self, hang: bool) {
            self.hang_publish.store(hang, Ordering::SeqCst);
        }

        /// While set, subscribes never complete.
        pub fn hang_subscribes(&self, hang: bool) {
            self.hang_subscribe.store(hang, Ordering::SeqCst);
        }

        /// While set, history queries never complete.
        pub fn hang_history(&self, hang: bool) {
            self.hang_history.store(hang, Ordering::SeqCst);
        }

        /// Number of publish calls that reached the network, failed ones
        /// included.
        pub fn publish_count(&self) -> u64 {
            self.publishes.load(Ordering::SeqCst)
        }

        /// Deliver a topic's whole history again to every subscriber,
        /// simulating at-least-once redelivery.
        pub async fn redeliver(&self, topic: &str) {
            let (payloads, senders) = {
                let topics = self.topics.read().await;
                match topics.get(topic) {
                    Some(state) => (
                        state.history.clone(),
                        state.subscribers.values().cloned().collect::<Vec<_>>(),
                    ),
                    None => return,
                }
            };

            for sender in senders {
                for payload in &payloads {
                    let _ = sender.send(payload.clone()).await;
                }
            }
        }

        /// Inject a raw payload onto a topic as if some unknown node
        /// published it.
        pub async fn inject(&self, topic: &str, payload: Bytes) {
            self.fan_out(0, topic, payload).await;
        }

        async fn fan_out(&self, from: NodeId, topic: &str, payload: Bytes) {
            let senders: Vec<mpsc::Sender<Bytes>> = {
                let mut topics = self.topics.write().await;
                let state = topics.entry(topic.to_string()).or_default();
                if self.keep_history {
                    state.history.push(payload.clone());
                }
                state
                    .subscribers
                    .iter()
                    .filter(|(node, _)| **node != from)
                    .map(|(_, sender)| sender.clone())
                    .collect()
            };

            for sender in senders {
                // Ignore errors (some subscribers may have gone away)
                let _ = sender.send(payload.clone()).await;
            }
        }
    }

    /// In-memory transport implementation.
    ///
    /// A node never receives its own publishes.
    pub struct MemoryTransport {
        node_id: NodeId,
        network: Arc<MemoryNetwork>,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
            let network = &self.network;
            network.publishes.fetch_add(1, Ordering::SeqCst);

            if network.hang_publish.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }

            let failing = network
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                debug!(topic, "injected publish failure");
                return Err(DeliveryError::Transport("injected failure".into()));
            }

            network.fan_out(self.node_id, topic, payload).await;
            Ok(())
        }

        async fn subscribe(&self, topic: &str) -> Result<Subscription> {
            if self.network.hang_subscribe.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            let mut topics = self.network.topics.write().await;
            topics
                .entry(topic.to_string())
                .or_default()
                .subscribers
                .insert(self.node_id, tx);
            Ok(rx)
        }

        async fn unsubscribe(&self, topic: &str) -> Result<()> {
            let mut topics = self.network.topics.write().await;
            if let Some(state) = topics.get_mut(topic) {
                state.subscribers.remove(&self.node_id);
            }
            Ok(())
        }

        async fn query_history(&self, topic: &str) -> Result<Option<Vec<Bytes>>> {
            if !self.network.keep_history {
                return Ok(None);
            }
            if self.network.hang_history.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            let topics = self.network.topics.read().await;
            Ok(Some(
                topics
                    .get(topic)
                    .map(|state| state.history.clone())
                    .unwrap_or_default(),
            ))
        }
    }
}
