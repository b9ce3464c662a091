//! # Office Hours Testing
//!
//! Testing utilities for the office hours service.
//!
//! This crate provides:
//! - Mock implementations of the injected environment (clock)
//! - [`InMemoryStorage`], a transactional store on plain collections
//! - Fixtures: queues, identities, calendars and request contexts
//! - A tracing subscriber that writes through the test harness
//!
//! ## Example
//!
//! ```ignore
//! use office_hours_testing::{InMemoryStorage, fixtures};
//!
//! #[tokio::test]
//! async fn test_join() {
//!     let queue = fixtures::queue();
//!     let storage = fixtures::storage_for(&queue).await;
//!     let ctx = fixtures::ContextBuilder::new(queue).student("ada").build();
//!
//!     let mut tx = storage.begin().await?;
//!     let mut outbox = Outbox::new();
//!     queue::add_entry(&mut tx, &mut outbox, &ctx, fixtures::entry_details("lab 3")).await?;
//! }
//! ```

use chrono::{DateTime, Utc};
use office_hours_core::environment::Clock;

pub mod storage;

pub use storage::{InMemoryStorage, InMemoryTransaction, Tables};

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use office_hours_testing::mocks::FixedClock;
    /// use office_hours_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Builders for the values most tests need.
///
/// Everything is fixed: one New York calendar, one Wednesday morning, a
/// handful of well-known ids. Ids handed out by contexts come from one
/// process-wide generator so rows created by different requests never
/// collide.
pub mod fixtures {
    use crate::storage::InMemoryStorage;
    use chrono::{DateTime, TimeZone, Utc};
    use office_hours_core::RequestContext;
    use office_hours_core::appointment::AppointmentDetails;
    use office_hours_core::entry::{EntryDetails, NewQueueEntry, Priority};
    use office_hours_core::environment::{IdGenerator, MonotonicIds};
    use office_hours_core::ids::{CourseId, EntryId, QueueId};
    use office_hours_core::queue::{Identity, Queue, QueueKind, Role};
    use office_hours_core::schedule::{Calendar, HalfHour, HalfHourGrid};
    use std::sync::{Arc, LazyLock};
    use uuid::Uuid;

    static IDS: LazyLock<Arc<MonotonicIds>> = LazyLock::new(|| Arc::new(MonotonicIds::new()));

    /// Email of the course admin every seeded queue has.
    pub const ADMIN_EMAIL: &str = "ta@example.edu";

    /// The shared id generator.
    #[must_use]
    pub fn ids() -> Arc<MonotonicIds> {
        Arc::clone(&IDS)
    }

    /// Wednesday 2025-01-08, 10:00 in New York.
    #[must_use]
    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 8, 15, 0, 0)
            .single()
            .unwrap_or_default()
    }

    /// New York calendar.
    #[must_use]
    pub const fn calendar() -> Calendar {
        Calendar::new(chrono_tz::America::New_York)
    }

    /// Course owning every fixture queue.
    #[must_use]
    pub const fn course() -> CourseId {
        CourseId::from_uuid(Uuid::from_u128(0xC0))
    }

    /// An active wait-list queue.
    #[must_use]
    pub fn queue() -> Queue {
        Queue {
            id: QueueId::from_uuid(Uuid::from_u128(0x0A)),
            course: course(),
            kind: QueueKind::Ordered,
            name: "CS 61B Office Hours".into(),
            location: "Soda 271".into(),
            active: true,
        }
    }

    /// An active appointments queue.
    #[must_use]
    pub fn appointment_queue() -> Queue {
        Queue {
            id: QueueId::from_uuid(Uuid::from_u128(0x0B)),
            kind: QueueKind::Appointments,
            name: "CS 61B Appointments".into(),
            ..queue()
        }
    }

    /// A student identity `<name>@example.edu`.
    #[must_use]
    pub fn student(name: &str) -> Identity {
        Identity {
            email: format!("{name}@example.edu"),
            name: name.to_owned(),
        }
    }

    /// The course admin.
    #[must_use]
    pub fn admin() -> Identity {
        Identity {
            email: ADMIN_EMAIL.into(),
            name: "TA".into(),
        }
    }

    /// A grid open all day.
    #[must_use]
    pub fn open_all_day() -> HalfHourGrid {
        HalfHourGrid::uniform(HalfHour::Open)
    }

    /// Entry fields with only a description.
    #[must_use]
    pub fn entry_details(description: &str) -> EntryDetails {
        EntryDetails {
            description: description.into(),
            ..EntryDetails::default()
        }
    }

    /// Appointment fields with a description and a location.
    #[must_use]
    pub fn appointment_details(description: &str) -> AppointmentDetails {
        AppointmentDetails {
            description: description.into(),
            location: "Zoom".into(),
            ..AppointmentDetails::default()
        }
    }

    /// A new entry row for `email`, stamped at `created_at`.
    #[must_use]
    pub fn new_entry(queue: &Queue, email: &str, created_at: DateTime<Utc>) -> NewQueueEntry {
        NewQueueEntry {
            id: EntryId::from_uuid(IDS.next_id(created_at)),
            queue: queue.id,
            email: email.into(),
            name: email.split('@').next().unwrap_or(email).into(),
            details: entry_details("help"),
            priority: Priority::Normal,
            created_at,
        }
    }

    /// Storage holding `queue`, its course admin and an all-open week.
    pub async fn storage_for(queue: &Queue) -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        let grid = open_all_day();
        storage
            .seed(|t| {
                t.put_queue(queue.clone())
                    .put_admin(queue.course, ADMIN_EMAIL)
                    .put_weekly_schedule(queue.id, &grid);
            })
            .await;
        storage
    }

    /// Builds [`RequestContext`]s.
    #[derive(Debug, Clone)]
    pub struct ContextBuilder {
        queue: Queue,
        identity: Option<Identity>,
        role: Role,
        now: DateTime<Utc>,
    }

    impl ContextBuilder {
        /// Anonymous caller on `queue` at [`now`].
        #[must_use]
        pub fn new(queue: Queue) -> Self {
            Self {
                queue,
                identity: None,
                role: Role::NonPrivileged,
                now: now(),
            }
        }

        /// Signed in as the student `<name>@example.edu`.
        #[must_use]
        pub fn student(mut self, name: &str) -> Self {
            self.identity = Some(student(name));
            self.role = Role::NonPrivileged;
            self
        }

        /// Signed in as the course admin.
        #[must_use]
        pub fn admin(mut self) -> Self {
            self.identity = Some(admin());
            self.role = Role::Admin;
            self
        }

        /// Signed in as `identity` with `role`.
        #[must_use]
        pub fn identity(mut self, identity: Identity, role: Role) -> Self {
            self.identity = Some(identity);
            self.role = role;
            self
        }

        /// Request time.
        #[must_use]
        pub const fn at(mut self, now: DateTime<Utc>) -> Self {
            self.now = now;
            self
        }

        /// The context.
        #[must_use]
        pub fn build(self) -> RequestContext {
            RequestContext::new(
                Uuid::now_v7(),
                self.queue,
                self.identity,
                self.role,
                self.now,
                calendar(),
                ids(),
            )
        }
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honours `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
