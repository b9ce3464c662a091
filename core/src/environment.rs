//! Injected dependencies: time and id generation.
//!
//! Both are traits so tests can pin the clock and still get strictly
//! increasing ids derived from it.

use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```ignore
/// // Production - uses system clock
/// let clock = SystemClock;
/// let now = clock.now();
///
/// // Test - fixed time for deterministic tests
/// let clock = FixedClock::new(now);
/// assert_eq!(clock.now(), now);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of time-ordered ids.
pub trait IdGenerator: Send + Sync {
    /// Next id for a row created at `now`.
    ///
    /// Implementations must return strictly increasing values for
    /// non-decreasing `now`.
    fn next_id(&self, now: DateTime<Utc>) -> Uuid;
}

/// UUIDv7 generator that never hands out the same or a smaller id twice.
///
/// The timestamp prefix comes from the supplied instant. When two ids are
/// requested within the same millisecond (or the clock stalls, as a fixed
/// test clock does) the previous id is incremented instead.
#[derive(Debug, Default)]
pub struct MonotonicIds {
    last: Mutex<u128>,
}

impl MonotonicIds {
    /// Create a generator with no history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: Mutex::new(0),
        }
    }
}

impl IdGenerator for MonotonicIds {
    fn next_id(&self, now: DateTime<Utc>) -> Uuid {
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let candidate = uuid::Builder::from_unix_timestamp_millis(millis, &[0; 10])
            .into_uuid()
            .as_u128();

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let next = if candidate > *last { candidate } else { *last + 1 };
        *last = next;
        Uuid::from_u128(next)
    }
}
