//! Integration tests for the wait-list lifecycle.
//!
//! Every test runs real operations against the in-memory storage, one
//! transaction per simulated request, and inspects both the committed rows
//! and the events each request staged.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use chrono::TimeDelta;
use office_hours_core::entry::{EntryView, Priority, QueueEntry};
use office_hours_core::event::EventName;
use office_hours_core::environment::IdGenerator;
use office_hours_core::event_bus::EventBus;
use office_hours_core::ids::EntryId;
use office_hours_core::queue::{Queue, QueueConfiguration};
use office_hours_core::schedule::{HalfHour, HalfHourGrid};
use office_hours_core::store::{EntryStore, Storage, Transaction};
use office_hours_core::topic::Topic;
use office_hours_core::{AdmissionDenied, QueueError, RequestContext};
use office_hours_runtime::{Outbox, Outcome, PubSub, RequestScope, queue};
use office_hours_testing::InMemoryStorage;
use office_hours_testing::fixtures::{self, ContextBuilder};

// ============================================================================
// Helpers
// ============================================================================

fn student(queue: &Queue, name: &str) -> RequestContext {
    ContextBuilder::new(queue.clone()).student(name).build()
}

fn admin(queue: &Queue) -> RequestContext {
    ContextBuilder::new(queue.clone()).admin().build()
}

fn names_for(outbox: &Outbox, topic: &Topic) -> Vec<EventName> {
    outbox
        .publications()
        .iter()
        .filter(|p| &p.topic == topic)
        .map(|p| p.event.name)
        .collect()
}

async fn configure(storage: &InMemoryStorage, queue: &Queue, configuration: QueueConfiguration) {
    let queue_id = queue.id;
    storage
        .seed(|t| {
            t.put_configuration(queue_id, configuration);
        })
        .await;
}

async fn join(storage: &InMemoryStorage, ctx: &RequestContext) -> Result<QueueEntry, QueueError> {
    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    let result = queue::add_entry(&mut tx, &mut outbox, ctx, fixtures::entry_details("lab 3")).await;
    if result.is_ok() {
        tx.commit().await.unwrap();
    } else {
        tx.rollback().await.unwrap();
    }
    result
}

async fn remove(storage: &InMemoryStorage, ctx: &RequestContext, id: EntryId) -> Outbox {
    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    queue::remove_entry(&mut tx, &mut outbox, ctx, id).await.unwrap();
    tx.commit().await.unwrap();
    outbox
}

// ============================================================================
// Joining
// ============================================================================

#[tokio::test]
async fn test_join_publishes_full_anonymous_and_personal_views() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let ctx = student(&queue, "ada");

    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    let entry = queue::add_entry(&mut tx, &mut outbox, &ctx, fixtures::entry_details("lab 3"))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(entry.email, "ada@example.edu");
    assert!(entry.active);
    assert_eq!(outbox.len(), 3);

    let pubs = outbox.publications();
    assert_eq!(pubs[0].topic, Topic::admin(queue.id));
    assert_eq!(pubs[0].event.data["email"], "ada@example.edu");
    assert_eq!(pubs[1].topic, Topic::non_privileged(queue.id));
    assert_eq!(pubs[1].event.name, EventName::EntryCreate);
    assert!(pubs[1].event.data.get("email").is_none());
    assert!(pubs[1].event.data.get("description").is_none());
    assert_eq!(pubs[2].topic, Topic::personal(queue.id, "ada@example.edu"));
    assert_eq!(pubs[2].event.name, EventName::EntryUpdate);
}

#[tokio::test]
async fn test_second_active_entry_is_a_conflict() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let ctx = student(&queue, "ada");

    join(&storage, &ctx).await.unwrap();
    let second = join(&storage, &ctx).await;

    assert!(matches!(second, Err(QueueError::Conflict(_))), "{second:?}");
    assert_eq!(storage.snapshot().await.entries(queue.id).len(), 1);
}

#[tokio::test]
async fn test_anonymous_caller_cannot_join() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let ctx = ContextBuilder::new(queue.clone()).build();

    let result = join(&storage, &ctx).await;
    assert!(matches!(result, Err(QueueError::Unauthorized)));
}

#[tokio::test]
async fn test_location_required_when_enabled() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    configure(
        &storage,
        &queue,
        QueueConfiguration {
            enable_location_field: true,
            ..QueueConfiguration::default()
        },
    )
    .await;

    let result = join(&storage, &student(&queue, "ada")).await;
    assert!(matches!(result, Err(QueueError::Validation(_))), "{result:?}");
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn test_closed_half_hour_denies_students_but_not_admins() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let closed = HalfHourGrid::uniform(HalfHour::Closed);
    let queue_id = queue.id;
    storage
        .seed(|t| {
            t.put_weekly_schedule(queue_id, &closed);
        })
        .await;

    let denied = join(&storage, &student(&queue, "ada")).await;
    assert!(matches!(
        denied,
        Err(QueueError::Denied(AdmissionDenied::QueueClosed))
    ));

    join(&storage, &admin(&queue)).await.unwrap();
}

#[tokio::test]
async fn test_day_without_schedule_is_closed() {
    let queue = fixtures::queue();
    let storage = InMemoryStorage::new();
    let seeded = queue.clone();
    storage
        .seed(|t| {
            t.put_queue(seeded);
        })
        .await;

    let denied = join(&storage, &student(&queue, "ada")).await;
    assert!(matches!(
        denied,
        Err(QueueError::Denied(AdmissionDenied::QueueClosed))
    ));
}

#[tokio::test]
async fn test_prioritized_half_hour_counts_as_open() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let grid = HalfHourGrid::uniform(HalfHour::Prioritized);
    let queue_id = queue.id;
    storage
        .seed(|t| {
            t.put_weekly_schedule(queue_id, &grid);
        })
        .await;

    join(&storage, &student(&queue, "ada")).await.unwrap();
}

#[tokio::test]
async fn test_unregistered_student_denied_when_roster_enforced() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    configure(
        &storage,
        &queue,
        QueueConfiguration {
            prevent_unregistered: true,
            ..QueueConfiguration::default()
        },
    )
    .await;
    let queue_id = queue.id;
    storage
        .seed(|t| {
            t.put_roster(queue_id, ["bob@example.edu"]);
        })
        .await;

    let denied = join(&storage, &student(&queue, "ada")).await;
    assert!(matches!(
        denied,
        Err(QueueError::Denied(AdmissionDenied::NotInRoster))
    ));
    join(&storage, &student(&queue, "bob")).await.unwrap();
}

#[tokio::test]
async fn test_one_teammate_at_a_time_when_groups_enforced() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    configure(
        &storage,
        &queue,
        QueueConfiguration {
            prevent_groups: true,
            ..QueueConfiguration::default()
        },
    )
    .await;
    let queue_id = queue.id;
    storage
        .seed(|t| {
            t.put_groups(
                queue_id,
                vec![vec!["ada@example.edu".into(), "bob@example.edu".into()]],
            );
        })
        .await;

    let bob = join(&storage, &student(&queue, "bob")).await.unwrap();
    let denied = join(&storage, &student(&queue, "ada")).await;
    assert!(matches!(
        denied,
        Err(QueueError::Denied(AdmissionDenied::TeammateInQueue))
    ));

    // Once bob is helped, ada may join.
    remove(&storage, &admin(&queue), bob.id).await;
    join(&storage, &student(&queue, "ada")).await.unwrap();

    // Students outside any group are unaffected.
    join(&storage, &student(&queue, "cy")).await.unwrap();
}

// ============================================================================
// Priority and ordering
// ============================================================================

fn prioritize_new() -> QueueConfiguration {
    QueueConfiguration {
        prioritize_new: true,
        ..QueueConfiguration::default()
    }
}

#[tokio::test]
async fn test_helped_students_drop_behind_first_visits() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    configure(&storage, &queue, prioritize_new()).await;
    let now = fixtures::now();

    let first = join(&storage, &student(&queue, "ada")).await.unwrap();
    assert_eq!(first.priority, Priority::Boosted);

    let ta = ContextBuilder::new(queue.clone())
        .admin()
        .at(now + TimeDelta::minutes(5))
        .build();
    remove(&storage, &ta, first.id).await;

    let ada_again = ContextBuilder::new(queue.clone())
        .student("ada")
        .at(now + TimeDelta::minutes(10))
        .build();
    let second = join(&storage, &ada_again).await.unwrap();
    assert_eq!(second.priority, Priority::Normal);

    let bob = ContextBuilder::new(queue.clone())
        .student("bob")
        .at(now + TimeDelta::minutes(15))
        .build();
    join(&storage, &bob).await.unwrap();

    let mut tx = storage.begin().await.unwrap();
    let order: Vec<String> = tx
        .active_entries(queue.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.email)
        .collect();
    assert_eq!(order, vec!["bob@example.edu", "ada@example.edu"]);
}

#[tokio::test]
async fn test_leaving_on_your_own_keeps_priority() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    configure(&storage, &queue, prioritize_new()).await;
    let ada = student(&queue, "ada");

    let first = join(&storage, &ada).await.unwrap();
    remove(&storage, &ada, first.id).await;

    let second = join(&storage, &ada).await.unwrap();
    assert_eq!(second.priority, Priority::Boosted);
}

#[tokio::test]
async fn test_teammate_help_counts_with_group_boost_rule() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    configure(
        &storage,
        &queue,
        QueueConfiguration {
            prioritize_new: true,
            prevent_groups_boost: true,
            ..QueueConfiguration::default()
        },
    )
    .await;
    let queue_id = queue.id;
    storage
        .seed(|t| {
            t.put_groups(
                queue_id,
                vec![vec!["ada@example.edu".into(), "bob@example.edu".into()]],
            );
        })
        .await;

    let bob = join(&storage, &student(&queue, "bob")).await.unwrap();
    remove(&storage, &admin(&queue), bob.id).await;

    let ada = join(&storage, &student(&queue, "ada")).await.unwrap();
    assert_eq!(ada.priority, Priority::Normal);
}

#[tokio::test]
async fn test_priority_is_normal_when_rule_is_off() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let entry = join(&storage, &student(&queue, "ada")).await.unwrap();
    assert_eq!(entry.priority, Priority::Normal);
}

#[tokio::test]
async fn test_pinned_then_priority_then_arrival() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let tiers = [
        (false, Priority::Boosted),
        (false, Priority::Normal),
        (true, Priority::Normal),
        (false, Priority::Boosted),
    ];
    let mut ids = Vec::new();
    for (i, (pinned, priority)) in tiers.into_iter().enumerate() {
        let email = format!("student{}@example.edu", i + 1);
        let created_at = fixtures::now() + TimeDelta::seconds(i64::try_from(i).unwrap());
        let new = fixtures::new_entry(&queue, &email, created_at);
        ids.push(new.id);
        let entry = QueueEntry {
            id: new.id,
            queue: queue.id,
            email: new.email,
            name: new.name,
            details: new.details,
            priority,
            pinned,
            active: true,
            helped: false,
            removed_by: None,
            removed_at: None,
            created_at,
        };
        storage
            .seed(|t| {
                t.put_entry(entry);
            })
            .await;
    }

    let mut tx = storage.begin().await.unwrap();
    let order: Vec<EntryId> = tx
        .active_entries(queue.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(order, vec![ids[2], ids[0], ids[3], ids[1]]);
}

// ============================================================================
// Removal, pinning, helped flag, clearing
// ============================================================================

#[tokio::test]
async fn test_removing_twice_is_a_quiet_success() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let entry = join(&storage, &student(&queue, "ada")).await.unwrap();
    let ta = admin(&queue);

    let first = remove(&storage, &ta, entry.id).await;
    assert_eq!(
        names_for(&first, &Topic::admin(queue.id)),
        vec![EventName::EntryRemove]
    );

    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    let again = queue::remove_entry(&mut tx, &mut outbox, &ta, entry.id)
        .await
        .unwrap();
    assert!(again.is_none());
    assert!(outbox.is_empty());
    drop(tx);

    let snapshot = storage.snapshot().await;
    let stored = snapshot.entry(entry.id).unwrap();
    assert!(!stored.active);
    assert!(stored.helped);
    assert_eq!(stored.removed_by.as_deref(), Some(fixtures::ADMIN_EMAIL));
}

#[tokio::test]
async fn test_students_cannot_remove_each_other() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let entry = join(&storage, &student(&queue, "ada")).await.unwrap();

    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    let result = queue::remove_entry(&mut tx, &mut outbox, &student(&queue, "bob"), entry.id).await;
    assert!(matches!(result, Err(QueueError::Forbidden(_))));
}

#[tokio::test]
async fn test_unknown_entry_is_not_found() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();

    let id = EntryId::from_uuid(fixtures::ids().next_id(fixtures::now()));
    let result = queue::remove_entry(&mut tx, &mut outbox, &admin(&queue), id).await;
    assert!(matches!(result, Err(QueueError::NotFound { .. })));
}

#[tokio::test]
async fn test_pin_from_stack_revives_entry_at_the_front() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let ada = join(&storage, &student(&queue, "ada")).await.unwrap();
    join(&storage, &student(&queue, "bob")).await.unwrap();
    let ta = admin(&queue);
    remove(&storage, &ta, ada.id).await;

    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    let pinned = queue::pin_entry(&mut tx, &mut outbox, &ta, ada.id).await.unwrap();
    assert!(pinned.active && pinned.pinned && !pinned.helped);
    assert!(pinned.removed_by.is_none());

    assert_eq!(
        names_for(&outbox, &Topic::admin(queue.id)),
        vec![EventName::StackRemove, EventName::EntryCreate]
    );
    assert_eq!(
        names_for(&outbox, &Topic::personal(queue.id, "ada@example.edu")),
        vec![EventName::EntryUpdate, EventName::EntryPinned]
    );

    let order: Vec<String> = tx
        .active_entries(queue.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.email)
        .collect();
    assert_eq!(order, vec!["ada@example.edu", "bob@example.edu"]);
    assert!(tx.stack(queue.id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pin_active_entry_sends_update() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let ada = join(&storage, &student(&queue, "ada")).await.unwrap();

    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    queue::pin_entry(&mut tx, &mut outbox, &admin(&queue), ada.id)
        .await
        .unwrap();
    assert_eq!(
        names_for(&outbox, &Topic::admin(queue.id)),
        vec![EventName::EntryUpdate]
    );
}

#[tokio::test]
async fn test_pin_refuses_second_active_entry() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let ada = student(&queue, "ada");
    let first = join(&storage, &ada).await.unwrap();
    remove(&storage, &ada, first.id).await;
    join(&storage, &ada).await.unwrap();

    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    let result = queue::pin_entry(&mut tx, &mut outbox, &admin(&queue), first.id).await;
    assert!(matches!(result, Err(QueueError::Conflict(_))), "{result:?}");
}

#[tokio::test]
async fn test_only_admins_pin() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let ada = student(&queue, "ada");
    let entry = join(&storage, &ada).await.unwrap();

    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    let result = queue::pin_entry(&mut tx, &mut outbox, &ada, entry.id).await;
    assert!(matches!(result, Err(QueueError::Forbidden(_))));
}

#[tokio::test]
async fn test_marking_not_helped_notifies_the_student() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let entry = join(&storage, &student(&queue, "ada")).await.unwrap();
    let ta = admin(&queue);
    remove(&storage, &ta, entry.id).await;

    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    let updated = queue::set_helped(&mut tx, &mut outbox, &ta, entry.id, false)
        .await
        .unwrap();
    assert!(!updated.helped);
    assert!(!updated.active);
    assert_eq!(
        names_for(&outbox, &Topic::personal(queue.id, "ada@example.edu")),
        vec![EventName::NotHelped]
    );
}

#[tokio::test]
async fn test_clear_removes_everyone_as_not_helped() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    for name in ["ada", "bob", "cy"] {
        join(&storage, &student(&queue, name)).await.unwrap();
    }

    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    let cleared = queue::clear_entries(&mut tx, &mut outbox, &admin(&queue))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(cleared, 3);
    let pubs = outbox.publications();
    assert_eq!(pubs.len(), 2);
    assert_eq!(pubs[0].event.data, fixtures::ADMIN_EMAIL);
    assert!(pubs[1].event.data.is_null());

    let entries = storage.snapshot().await.entries(queue.id);
    assert!(entries.iter().all(|e| !e.active && !e.helped));
}

#[tokio::test]
async fn test_clearing_does_not_cost_priority() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    configure(&storage, &queue, prioritize_new()).await;
    join(&storage, &student(&queue, "ada")).await.unwrap();

    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    queue::clear_entries(&mut tx, &mut outbox, &admin(&queue))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let again = join(&storage, &student(&queue, "ada")).await.unwrap();
    assert_eq!(again.priority, Priority::Boosted);
}

// ============================================================================
// Editing and the stack
// ============================================================================

#[tokio::test]
async fn test_owner_edits_entry_in_place() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let ada = student(&queue, "ada");
    let entry = join(&storage, &ada).await.unwrap();

    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    let mut details = fixtures::entry_details("lab 4");
    details.location = "table 2".into();
    let updated = queue::update_entry(&mut tx, &mut outbox, &ada, entry.id, details)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(updated.id, entry.id);
    assert_eq!(updated.details.description, "lab 4");
    assert_eq!(updated.details.location, "table 2");
    assert!(updated.active);
    assert_eq!(
        names_for(&outbox, &Topic::admin(queue.id)),
        vec![EventName::EntryUpdate]
    );
}

#[tokio::test]
async fn test_editing_is_owner_only_and_active_only() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let ada = student(&queue, "ada");
    let entry = join(&storage, &ada).await.unwrap();

    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    let result = queue::update_entry(
        &mut tx,
        &mut outbox,
        &student(&queue, "bob"),
        entry.id,
        fixtures::entry_details("mine now"),
    )
    .await;
    assert!(matches!(result, Err(QueueError::Forbidden(_))), "{result:?}");
    tx.rollback().await.unwrap();

    remove(&storage, &ada, entry.id).await;
    let mut tx = storage.begin().await.unwrap();
    let result = queue::update_entry(
        &mut tx,
        &mut outbox,
        &ada,
        entry.id,
        fixtures::entry_details("too late"),
    )
    .await;
    assert!(matches!(result, Err(QueueError::NotFound { .. })), "{result:?}");
}

#[tokio::test]
async fn test_stack_lists_latest_removal_first() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let ada = join(&storage, &student(&queue, "ada")).await.unwrap();
    let bob = join(&storage, &student(&queue, "bob")).await.unwrap();
    let ta = admin(&queue);
    remove(&storage, &ta, ada.id).await;
    remove(&storage, &ta, bob.id).await;

    let mut tx = storage.begin().await.unwrap();
    let stack: Vec<EntryId> = queue::stack(&mut tx, &ta, None)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.into_entry().id)
        .collect();
    assert_eq!(stack, vec![bob.id, ada.id]);

    let top = queue::stack(&mut tx, &ta, Some(1)).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].removed_by(), fixtures::ADMIN_EMAIL);

    let result = queue::stack(&mut tx, &student(&queue, "ada"), None).await;
    assert!(matches!(result, Err(QueueError::Forbidden(_))));
}

// ============================================================================
// Snapshot, messages, groups
// ============================================================================

#[tokio::test]
async fn test_snapshot_hides_other_students() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    join(&storage, &student(&queue, "ada")).await.unwrap();
    join(&storage, &student(&queue, "bob")).await.unwrap();

    let mut tx = storage.begin().await.unwrap();
    let view = queue::queue_snapshot(&mut tx, &student(&queue, "ada"))
        .await
        .unwrap();
    assert!(view.open);
    assert!(!view.admin);
    assert!(view.stack.is_none());
    assert!(matches!(&view.entries[0], EntryView::Full(e) if e.email == "ada@example.edu"));
    assert!(matches!(&view.entries[1], EntryView::Anonymous(_)));

    let admin_view = queue::queue_snapshot(&mut tx, &admin(&queue)).await.unwrap();
    assert!(admin_view.admin);
    assert!(admin_view.stack.is_some());
    assert!(
        admin_view
            .entries
            .iter()
            .all(|e| matches!(e, EntryView::Full(_)))
    );
}

#[tokio::test]
async fn test_messages_are_consumed_when_viewed() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;

    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    queue::send_message(
        &mut tx,
        &mut outbox,
        &admin(&queue),
        "ada@example.edu".into(),
        "come to the front desk".into(),
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(
        names_for(&outbox, &Topic::personal(queue.id, "ada@example.edu")),
        vec![EventName::MessageCreate]
    );

    let ada = student(&queue, "ada");
    let mut tx = storage.begin().await.unwrap();
    let first = queue::queue_snapshot(&mut tx, &ada).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(first.message.unwrap().content, "come to the front desk");

    let mut tx = storage.begin().await.unwrap();
    let second = queue::queue_snapshot(&mut tx, &ada).await.unwrap();
    assert!(second.message.is_none());
}

#[tokio::test]
async fn test_replacing_groups_normalizes_emails_and_sets_roster() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let ta = admin(&queue);

    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();
    let groups = queue::replace_groups(
        &mut tx,
        &mut outbox,
        &ta,
        vec![
            vec![" Bob@Example.edu".into(), "ada@example.edu".into(), "BOB@example.edu".into()],
            vec!["  ".into()],
        ],
    )
    .await
    .unwrap();

    assert_eq!(groups, vec![vec!["ada@example.edu", "bob@example.edu"]]);
    assert_eq!(
        queue::roster(&mut tx, &ta).await.unwrap(),
        vec!["ada@example.edu", "bob@example.edu"]
    );
    assert_eq!(
        names_for(&outbox, &Topic::generic(queue.id)),
        vec![EventName::Refresh]
    );
}

#[tokio::test]
async fn test_schedules_need_all_seven_days() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let mut tx = storage.begin().await.unwrap();
    let mut outbox = Outbox::new();

    let result = queue::replace_schedules(
        &mut tx,
        &mut outbox,
        &admin(&queue),
        vec![fixtures::open_all_day(); 6],
    )
    .await;
    assert!(matches!(result, Err(QueueError::Validation(_))));
    assert!(outbox.is_empty());
}

// ============================================================================
// Request scope: publish after commit only
// ============================================================================

#[tokio::test]
async fn test_events_reach_subscribers_only_after_commit() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let bus = PubSub::new();
    let mut sub = bus.subscribe(&[Topic::admin(queue.id)]).await.unwrap();

    let scope = RequestScope::begin(&storage).await.unwrap();
    {
        let mut guard = scope.lock().await;
        let (tx, outbox) = guard.parts().unwrap();
        queue::add_entry(tx, outbox, &student(&queue, "ada"), fixtures::entry_details("lab"))
            .await
            .unwrap();
    }
    assert!(sub.events.try_recv().is_err());

    let outcome = scope.finish(true, &bus).await.unwrap();
    assert_eq!(outcome, Outcome::Committed { delivered: 1 });
    assert_eq!(sub.events.recv().await.unwrap().name, EventName::EntryCreate);
}

#[tokio::test]
async fn test_rolled_back_request_publishes_nothing() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let bus = PubSub::new();
    let mut sub = bus.subscribe(&[Topic::admin(queue.id)]).await.unwrap();

    let scope = RequestScope::begin(&storage).await.unwrap();
    {
        let mut guard = scope.lock().await;
        let (tx, outbox) = guard.parts().unwrap();
        queue::add_entry(tx, outbox, &student(&queue, "ada"), fixtures::entry_details("lab"))
            .await
            .unwrap();
    }

    let outcome = scope.finish(false, &bus).await.unwrap();
    assert_eq!(outcome, Outcome::RolledBack);
    assert!(sub.events.try_recv().is_err());
    assert!(storage.snapshot().await.entries(queue.id).is_empty());
    assert_eq!(storage.rollbacks(), 1);
}

#[tokio::test]
async fn test_failed_commit_publishes_nothing() {
    let queue = fixtures::queue();
    let storage = fixtures::storage_for(&queue).await;
    let bus = PubSub::new();
    let mut sub = bus.subscribe(&[Topic::admin(queue.id)]).await.unwrap();
    storage.fail_next_commit();

    let scope = RequestScope::begin(&storage).await.unwrap();
    {
        let mut guard = scope.lock().await;
        let (tx, outbox) = guard.parts().unwrap();
        queue::add_entry(tx, outbox, &student(&queue, "ada"), fixtures::entry_details("lab"))
            .await
            .unwrap();
    }

    assert!(scope.finish(true, &bus).await.is_err());
    assert!(sub.events.try_recv().is_err());
    assert!(storage.snapshot().await.entries(queue.id).is_empty());
}
