//! Event bus abstraction for live client updates.
//!
//! This module provides the [`EventBus`] trait: topic-keyed publish and
//! subscribe with best-effort, at-most-once delivery to whoever is
//! subscribed right now. Nothing is persisted and nothing is replayed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   commit   ┌──────────────┐   publish   ┌──────────────┐
//! │   Request    │──────────> │    Outbox    │───────────> │   EventBus   │
//! │ transaction  │            │    flush     │             │   registry   │
//! └──────────────┘            └──────────────┘             └──────┬───────┘
//!                                                                 │
//!                                            ┌────────────────────┼───────────┐
//!                                            ▼                    ▼           ▼
//!                                      ┌──────────┐         ┌──────────┐    ...
//!                                      │ socket A │         │ socket B │
//!                                      └──────────┘         └──────────┘
//! ```
//!
//! A subscriber registers once for several topics and drains one merged
//! channel. The handle stays registered until [`EventBus::unsubscribe`] is
//! called; a publisher never removes a subscriber, even a slow one.
//!
//! # Dyn Compatibility
//!
//! This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
//! to enable trait object usage (`Arc<dyn EventBus>`), which is how the web
//! layer shares one bus across every connection.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::Event;
use crate::topic::Topic;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// The bus has shut down
    #[error("Event bus closed")]
    Closed,
}

/// Handle identifying one registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Wrap a raw handle value. Implementations hand these out.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw handle value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A live registration: its handle and the merged event stream.
///
/// The receiver yields `None` once the registration is removed.
#[derive(Debug)]
pub struct Subscription {
    /// Handle to pass to [`EventBus::unsubscribe`].
    pub id: SubscriptionId,
    /// Events published to any of the subscribed topics.
    pub events: mpsc::Receiver<Arc<Event>>,
}

/// Trait for event bus implementations.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`; every WebSocket connection and
/// every request's outbox flush touch the same instance concurrently.
pub trait EventBus: Send + Sync {
    /// Deliver `event` to every current subscriber of `topic`.
    ///
    /// Never waits on a subscriber. Returns how many subscribers accepted the
    /// event; a full subscriber buffer loses the event.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the bus cannot accept
    /// events at all.
    fn publish(
        &self,
        topic: &Topic,
        event: Arc<Event>,
    ) -> Pin<Box<dyn Future<Output = Result<usize, EventBusError>> + Send + '_>>;

    /// Register for `topics` and receive a merged stream of their events.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if registration fails.
    fn subscribe(
        &self,
        topics: &[Topic],
    ) -> Pin<Box<dyn Future<Output = Result<Subscription, EventBusError>> + Send + '_>>;

    /// Remove a registration.
    ///
    /// Returns `true` if `id` was registered. Calling it again for the same
    /// handle returns `false` and changes nothing.
    fn unsubscribe(&self, id: SubscriptionId) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}
