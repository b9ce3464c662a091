//! Events staged by a request, published only after its transaction commits.

use office_hours_core::event::Event;
use office_hours_core::event_bus::EventBus;
use office_hours_core::topic::Topic;
use std::sync::Arc;
use tracing::{debug, warn};

/// One staged publish.
#[derive(Clone, Debug)]
pub struct Publication {
    /// Where the event goes.
    pub topic: Topic,
    /// The event itself.
    pub event: Arc<Event>,
}

/// Publications collected while a request runs.
///
/// Operations push into the outbox instead of publishing directly. The
/// owner flushes it after a successful commit or drops it after a rollback,
/// so subscribers never observe a change that did not persist.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<Publication>,
}

impl Outbox {
    /// Empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `event` for `topic`.
    pub fn push(&mut self, topic: Topic, event: Event) {
        self.pending.push(Publication {
            topic,
            event: Arc::new(event),
        });
    }

    /// Stage one `event` for several topics, sharing the payload.
    pub fn push_all(&mut self, topics: impl IntoIterator<Item = Topic>, event: Event) {
        let event = Arc::new(event);
        self.pending.extend(topics.into_iter().map(|topic| Publication {
            topic,
            event: Arc::clone(&event),
        }));
    }

    /// Number of staged publications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Staged publications in the order they were pushed.
    #[must_use]
    pub fn publications(&self) -> &[Publication] {
        &self.pending
    }

    /// Publish everything in order. Returns how many deliveries succeeded.
    ///
    /// The change is already durable, so bus failures are logged and
    /// skipped rather than reported to the caller.
    pub async fn flush(self, bus: &dyn EventBus) -> usize {
        let mut delivered = 0;
        for Publication { topic, event } in self.pending {
            match bus.publish(&topic, Arc::clone(&event)).await {
                Ok(count) => delivered += count,
                Err(error) => {
                    warn!(topic = %topic, event = %event.name, error = %error, "Publish failed");
                }
            }
        }
        debug!(delivered, "Outbox flushed");
        delivered
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pubsub::PubSub;
    use office_hours_core::event::EventName;
    use office_hours_core::ids::QueueId;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_flush_preserves_push_order() {
        let bus = PubSub::new();
        let queue = QueueId::from_uuid(Uuid::now_v7());
        let mut sub = bus.subscribe(&[Topic::admin(queue)]).await.unwrap();

        let mut outbox = Outbox::new();
        outbox.push(Topic::admin(queue), Event::bare(EventName::StackRemove));
        outbox.push(Topic::admin(queue), Event::bare(EventName::EntryCreate));
        outbox.push(Topic::admin(queue), Event::bare(EventName::EntryPinned));
        assert_eq!(outbox.len(), 3);

        assert_eq!(outbox.flush(&bus).await, 3);
        let names: Vec<_> = (0..3)
            .map(|_| sub.events.try_recv().unwrap().name)
            .collect();
        assert_eq!(
            names,
            vec![
                EventName::StackRemove,
                EventName::EntryCreate,
                EventName::EntryPinned
            ]
        );
    }

    #[tokio::test]
    async fn test_push_all_shares_payload() {
        let queue = QueueId::from_uuid(Uuid::now_v7());
        let mut outbox = Outbox::new();
        outbox.push_all(
            [Topic::admin(queue), Topic::non_privileged(queue)],
            Event::bare(EventName::Refresh),
        );

        let staged = outbox.publications();
        assert_eq!(staged.len(), 2);
        assert!(Arc::ptr_eq(&staged[0].event, &staged[1].event));
    }

    #[tokio::test]
    async fn test_dropped_outbox_publishes_nothing() {
        let bus = PubSub::new();
        let queue = QueueId::from_uuid(Uuid::now_v7());
        let mut sub = bus.subscribe(&[Topic::generic(queue)]).await.unwrap();

        let mut outbox = Outbox::new();
        outbox.push(Topic::generic(queue), Event::bare(EventName::Refresh));
        drop(outbox);

        assert!(sub.events.try_recv().is_err());
    }
}
