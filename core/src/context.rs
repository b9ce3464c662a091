//! Typed per-request context.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::environment::IdGenerator;
use crate::error::QueueError;
use crate::queue::{Identity, Queue, Role};
use crate::schedule::{Calendar, DayBounds, DayOfWeek};

/// Everything an operation needs to know about the request it serves.
///
/// Assembled once per request after the transaction is open and passed to
/// operations by reference.
#[derive(Clone)]
pub struct RequestContext {
    /// Correlation id of the request, for logs and error reports.
    pub correlation_id: Uuid,
    /// Queue addressed by the request.
    pub queue: Queue,
    /// Signed-in caller, if any.
    pub identity: Option<Identity>,
    /// Caller's role on `queue`.
    pub role: Role,
    /// Request time; every timestamp written by the request uses it.
    pub now: DateTime<Utc>,
    /// Local calendar of the deployment.
    pub calendar: Calendar,
    ids: Arc<dyn IdGenerator>,
}

impl RequestContext {
    /// Assemble a context.
    #[must_use]
    pub fn new(
        correlation_id: Uuid,
        queue: Queue,
        identity: Option<Identity>,
        role: Role,
        now: DateTime<Utc>,
        calendar: Calendar,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            correlation_id,
            queue,
            identity,
            role,
            now,
            calendar,
            ids,
        }
    }

    /// Whether the caller administers the queue.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// The caller's identity.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Unauthorized`] for anonymous callers.
    pub fn require_identity(&self) -> Result<&Identity, QueueError> {
        self.identity.as_ref().ok_or(QueueError::Unauthorized)
    }

    /// Fail unless the caller administers the queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Unauthorized`] for anonymous callers and
    /// [`QueueError::Forbidden`] for signed-in non-admins.
    pub fn require_admin(&self) -> Result<&Identity, QueueError> {
        let identity = self.require_identity()?;
        if self.is_admin() {
            Ok(identity)
        } else {
            Err(QueueError::forbidden("only course admins can do that"))
        }
    }

    /// Fresh time-ordered id stamped with the request time.
    #[must_use]
    pub fn next_id(&self) -> Uuid {
        self.ids.next_id(self.now)
    }

    /// Today's local weekday.
    #[must_use]
    pub fn today(&self) -> DayOfWeek {
        self.calendar.weekday(self.now)
    }

    /// Bounds of the next-or-current occurrence of `day`.
    #[must_use]
    pub fn day_bounds(&self, day: DayOfWeek) -> DayBounds {
        self.calendar.day_bounds(self.now, day)
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("correlation_id", &self.correlation_id)
            .field("queue", &self.queue.id)
            .field("identity", &self.identity.as_ref().map(|i| &i.email))
            .field("role", &self.role)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}
