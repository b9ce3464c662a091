//! Application state shared across all HTTP handlers.

use std::sync::Arc;
use std::time::Duration;

use office_hours_core::environment::{Clock, IdGenerator, MonotonicIds, SystemClock};
use office_hours_core::schedule::Calendar;
use office_hours_core::store::Storage;
use office_hours_runtime::PubSub;
use office_hours_runtime::metrics::ConnectionMetrics;

use crate::session::{ForwardedHeaders, SessionResolver};

/// Liveness timing of WebSocket connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Time between two PING events sent to a client.
    pub interval: Duration,
    /// Extra time a client gets on top of `interval` before it is dropped.
    pub slack: Duration,
}

impl HeartbeatConfig {
    /// How long a connection may stay silent.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.interval + self.slack
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            slack: Duration::from_secs(10),
        }
    }
}

/// Everything a handler may need.
///
/// Cheap to clone: every field is shared.
///
/// # Examples
///
/// ```ignore
/// let state = AppState::new(storage, Calendar::new(chrono_tz::America::Los_Angeles))
///     .with_heartbeat(HeartbeatConfig::default());
/// let app = office_hours_web::router(state);
/// ```
pub struct AppState<S> {
    /// Transactional storage.
    pub storage: S,
    /// Live event bus.
    pub bus: Arc<PubSub>,
    /// Source of request timestamps.
    pub clock: Arc<dyn Clock>,
    /// Source of row ids.
    pub ids: Arc<dyn IdGenerator>,
    /// Local calendar of the deployment.
    pub calendar: Calendar,
    /// WebSocket bookkeeping.
    pub metrics: Arc<ConnectionMetrics>,
    /// WebSocket liveness timing.
    pub heartbeat: HeartbeatConfig,
    /// Resolves callers.
    pub session: Arc<dyn SessionResolver>,
}

impl<S: Clone> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            bus: Arc::clone(&self.bus),
            clock: Arc::clone(&self.clock),
            ids: Arc::clone(&self.ids),
            calendar: self.calendar,
            metrics: Arc::clone(&self.metrics),
            heartbeat: self.heartbeat,
            session: Arc::clone(&self.session),
        }
    }
}

impl<S: Storage> AppState<S> {
    /// State with the system clock, a fresh bus and forwarded-header sessions.
    #[must_use]
    pub fn new(storage: S, calendar: Calendar) -> Self {
        Self {
            storage,
            bus: Arc::new(PubSub::new()),
            clock: Arc::new(SystemClock),
            ids: Arc::new(MonotonicIds::new()),
            calendar,
            metrics: Arc::new(ConnectionMetrics::new()),
            heartbeat: HeartbeatConfig::default(),
            session: Arc::new(ForwardedHeaders::default()),
        }
    }

    /// Use `bus` for live events.
    #[must_use]
    pub fn with_bus(mut self, bus: Arc<PubSub>) -> Self {
        self.bus = bus;
        self
    }

    /// Use `clock` for request timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use `ids` for row ids.
    #[must_use]
    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Use `heartbeat` for WebSocket liveness.
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Resolve callers with `session`.
    #[must_use]
    pub fn with_session(mut self, session: Arc<dyn SessionResolver>) -> Self {
        self.session = session;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_deadline() {
        let heartbeat = HeartbeatConfig::default();
        assert_eq!(heartbeat.deadline(), Duration::from_secs(40));
    }

    #[test]
    fn test_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState<office_hours_testing::InMemoryStorage>>();
    }
}
