//! Pub/sub fan-out benchmarks
//!
//! Measures what one committed request costs the bus:
//! - Publishing one event to a topic with many subscribers
//! - Flushing a typical outbox (three topics per change)
//! - Subscribe/unsubscribe churn as sockets come and go
//!
//! Run with: `cargo bench --bench pubsub_fanout`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use office_hours_core::event::{Event, EventName};
use office_hours_core::event_bus::EventBus;
use office_hours_core::ids::QueueId;
use office_hours_core::topic::Topic;
use office_hours_runtime::{Outbox, PubSub};
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// Benchmark Fixtures
// ============================================================================

fn queue() -> QueueId {
    QueueId::from_uuid(Uuid::from_u128(7))
}

fn payload() -> Event {
    Event::new(
        EventName::EntryUpdate,
        &serde_json::json!({
            "id": Uuid::nil(),
            "email": "student@example.edu",
            "description": "stuck on the linked list lab",
        }),
    )
    .expect("payload serializes")
}

// ============================================================================
// Benchmarks
// ============================================================================

/// Publish one event to a topic with N live subscribers, draining as we go.
fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fanout");
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");

    for subscribers in [1_usize, 10, 100] {
        group.throughput(Throughput::Elements(subscribers as u64));
        let bus = PubSub::with_buffer(1024);
        let topic = Topic::admin(queue());
        let mut receivers = runtime.block_on(async {
            let mut receivers = Vec::with_capacity(subscribers);
            for _ in 0..subscribers {
                let sub = bus
                    .subscribe(std::slice::from_ref(&topic))
                    .await
                    .expect("subscribe");
                receivers.push(sub.events);
            }
            receivers
        });
        let event = Arc::new(payload());

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                b.to_async(&runtime).iter(|| async {
                    let delivered = bus
                        .publish(&topic, Arc::clone(&event))
                        .await
                        .expect("publish");
                    black_box(delivered);
                });
                for rx in &mut receivers {
                    while rx.try_recv().is_ok() {}
                }
            },
        );
    }

    group.finish();
}

/// Flush an outbox holding the admin, non-privileged and personal copies.
fn bench_outbox_flush(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    let bus = PubSub::new();
    let topics = [
        Topic::admin(queue()),
        Topic::non_privileged(queue()),
        Topic::personal(queue(), "student@example.edu"),
    ];

    c.bench_function("outbox_flush_three_topics", |b| {
        b.to_async(&runtime).iter(|| async {
            let mut outbox = Outbox::new();
            outbox.push_all(topics.iter().cloned(), payload());
            black_box(outbox.flush(&bus).await);
        });
    });
}

/// Open and close one connection's subscription.
fn bench_subscription_churn(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    let bus = PubSub::new();
    let topics = vec![
        Topic::generic(queue()),
        Topic::non_privileged(queue()),
        Topic::personal(queue(), "student@example.edu"),
    ];

    c.bench_function("subscribe_unsubscribe", |b| {
        b.to_async(&runtime).iter(|| async {
            let sub = bus.subscribe(&topics).await.expect("subscribe");
            black_box(bus.unsubscribe(sub.id).await);
        });
    });
}

criterion_group!(
    benches,
    bench_publish_fanout,
    bench_outbox_flush,
    bench_subscription_churn
);
criterion_main!(benches);
