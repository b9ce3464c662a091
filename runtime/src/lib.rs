//! # Office Hours Runtime
//!
//! Operations and plumbing on top of `office-hours-core`.
//!
//! ## Core Components
//!
//! - **Queue operations** ([`queue`]): join, edit, remove, pin, help, clear,
//!   announcements, schedules, settings, messages, roster and groups
//! - **Appointment operations** ([`appointments`]): signup, claim, unclaim,
//!   cancel, reschedule and schedule maintenance
//! - **Pub/sub** ([`pubsub`]): the in-process [`EventBus`](office_hours_core::event_bus::EventBus)
//! - **Request scope** ([`transaction`]): one transaction and one
//!   [`Outbox`](outbox::Outbox) per request, published only after commit
//! - **Metrics** ([`metrics`]): Prometheus recorder and connection counters
//!
//! ## Example
//!
//! ```ignore
//! use office_hours_runtime::{queue, transaction::RequestScope};
//!
//! let scope = RequestScope::begin(&storage).await?;
//! let entry = {
//!     let mut guard = scope.lock().await;
//!     let (tx, outbox) = guard.parts()?;
//!     queue::add_entry(tx, outbox, &ctx, details).await
//! };
//! scope.finish(entry.is_ok(), &bus).await?;
//! ```

/// Appointment slot allocation and schedule maintenance
pub mod appointments;

/// Which events each change publishes, and where
pub mod fanout;

/// Prometheus metrics for observability
pub mod metrics;

/// Events staged until commit
pub mod outbox;

/// In-process topic pub/sub
pub mod pubsub;

/// Wait-list operations
pub mod queue;

/// Per-request transaction scope
pub mod transaction;

pub use outbox::Outbox;
pub use pubsub::PubSub;
pub use transaction::{Outcome, RequestScope};
