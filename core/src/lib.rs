//! # Office Hours Core
//!
//! Domain types and rules for an office hours queue.
//!
//! A queue hands out two kinds of help: a live FIFO-with-priority wait list
//! and a grid of bookable appointment timeslots. This crate holds the parts
//! that need no I/O:
//!
//! - **Schedule model**: weekday grids and DST-safe local calendar math
//! - **Entry lifecycle**: entry shapes, serving order, priority rule
//! - **Slot allocator**: the four-state slot machine and capacity planning
//! - **Topics and events**: broadcast keys and the wire event envelope
//! - **Contracts**: the [`event_bus::EventBus`] trait and the narrow
//!   storage capability traits in [`store`]
//!
//! ## Architecture Principles
//!
//! - Pure decisions here, effects in `office-hours-runtime`
//! - Storage behind narrow capability traits, one transaction per request
//! - Dependencies (clock, ids, bus) injected, never global
//!
//! ## Example
//!
//! ```
//! use office_hours_core::appointment::{plan_attach, Allocation, Party};
//!
//! // An empty timeslot with capacity 2 opens a new row for the first student.
//! assert_eq!(plan_attach(&[], Party::Student, 2), Ok(Allocation::Insert));
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub mod appointment;
pub mod context;
pub mod entry;
pub mod environment;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod ids;
pub mod queue;
pub mod schedule;
pub mod store;
pub mod topic;

pub use context::RequestContext;
pub use error::{AdmissionDenied, QueueError, StoreError};
pub use event::{Event, EventName};
pub use topic::{Scope, Topic};
