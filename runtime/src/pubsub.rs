//! In-process topic pub/sub.
//!
//! [`PubSub`] keeps a registry of live subscriptions keyed by topic. Each
//! subscription owns one bounded channel; publishing to a topic pushes the
//! event into the channel of every subscription registered for it.
//!
//! # Delivery
//!
//! Publishing never waits. A subscription whose buffer is full loses the
//! event, and the loss is logged and counted. Delivery is at most once and
//! nothing is replayed to late subscribers.
//!
//! # Example
//!
//! ```
//! use office_hours_core::event::{Event, EventName};
//! use office_hours_core::event_bus::EventBus;
//! use office_hours_core::ids::QueueId;
//! use office_hours_core::topic::Topic;
//! use office_hours_runtime::pubsub::PubSub;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let bus = PubSub::new();
//! let topic = Topic::generic(QueueId::from_uuid(uuid::Uuid::nil()));
//! let mut sub = bus.subscribe(std::slice::from_ref(&topic)).await.unwrap();
//!
//! bus.publish(&topic, Arc::new(Event::bare(EventName::Refresh))).await.unwrap();
//! assert_eq!(sub.events.recv().await.unwrap().name, EventName::Refresh);
//! # });
//! ```

use office_hours_core::SmallVec;
use office_hours_core::event::Event;
use office_hours_core::event_bus::{EventBus, EventBusError, Subscription, SubscriptionId};
use office_hours_core::topic::Topic;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Events a subscription may have queued before new ones are dropped.
pub const DEFAULT_BUFFER: usize = 64;

/// Subscribers of one topic.
type Subscribers = HashMap<SubscriptionId, mpsc::Sender<Arc<Event>>>;

#[derive(Default)]
struct Registry {
    /// Topic key → subscribers.
    topics: HashMap<String, Subscribers>,
    /// Subscription → topic keys it registered for.
    subscriptions: HashMap<SubscriptionId, SmallVec<[String; 3]>>,
}

/// Registry-backed [`EventBus`] shared by every connection of the process.
///
/// Cloning is cheap; clones share one registry.
#[derive(Clone)]
pub struct PubSub {
    registry: Arc<RwLock<Registry>>,
    next_id: Arc<AtomicU64>,
    buffer: usize,
}

impl PubSub {
    /// Create a bus with [`DEFAULT_BUFFER`] events of slack per subscription.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    /// Create a bus with `buffer` events of slack per subscription.
    #[must_use]
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            next_id: Arc::new(AtomicU64::new(1)),
            buffer: buffer.max(1),
        }
    }

    /// Number of live subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.registry.read().await.subscriptions.len()
    }

    /// Number of topics with at least one subscriber.
    pub async fn topic_count(&self) -> usize {
        self.registry.read().await.topics.len()
    }

    /// Number of subscribers registered for `topic`.
    pub async fn subscribers_of(&self, topic: &Topic) -> usize {
        self.registry
            .read()
            .await
            .topics
            .get(topic.as_str())
            .map_or(0, HashMap::len)
    }
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PubSub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSub")
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

impl EventBus for PubSub {
    fn publish(
        &self,
        topic: &Topic,
        event: Arc<Event>,
    ) -> Pin<Box<dyn Future<Output = Result<usize, EventBusError>> + Send + '_>> {
        let key = topic.as_str().to_owned();
        let scope = topic.scope().label();

        Box::pin(async move {
            let registry = self.registry.read().await;
            let Some(subscribers) = registry.topics.get(&key) else {
                return Ok(0);
            };

            let mut delivered = 0;
            for (id, sender) in subscribers {
                match sender.try_send(Arc::clone(&event)) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            subscription = %id,
                            topic = %key,
                            event = %event.name,
                            "Subscriber buffer full, dropping event"
                        );
                        metrics::counter!("pubsub_events_dropped_total", "topic_scope" => scope)
                            .increment(1);
                    }
                    // The reader is gone; its owner unsubscribes on teardown.
                    Err(TrySendError::Closed(_)) => {
                        debug!(subscription = %id, topic = %key, "Subscriber receiver closed");
                    }
                }
            }
            Ok(delivered)
        })
    }

    fn subscribe(
        &self,
        topics: &[Topic],
    ) -> Pin<Box<dyn Future<Output = Result<Subscription, EventBusError>> + Send + '_>> {
        let keys: SmallVec<[String; 3]> = topics.iter().map(|t| t.as_str().to_owned()).collect();

        Box::pin(async move {
            if keys.is_empty() {
                return Err(EventBusError::SubscriptionFailed {
                    topics: Vec::new(),
                    reason: "at least one topic is required".to_string(),
                });
            }

            let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
            let (sender, events) = mpsc::channel(self.buffer);

            let mut registry = self.registry.write().await;
            for key in &keys {
                registry
                    .topics
                    .entry(key.clone())
                    .or_default()
                    .insert(id, sender.clone());
            }
            debug!(subscription = %id, topics = ?keys, "Subscribed");
            registry.subscriptions.insert(id, keys);

            Ok(Subscription { id, events })
        })
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            let mut registry = self.registry.write().await;
            let Some(keys) = registry.subscriptions.remove(&id) else {
                return false;
            };

            for key in keys {
                if let Some(subscribers) = registry.topics.get_mut(&key) {
                    subscribers.remove(&id);
                    if subscribers.is_empty() {
                        registry.topics.remove(&key);
                    }
                }
            }
            debug!(subscription = %id, "Unsubscribed");
            true
        })
    }
}
