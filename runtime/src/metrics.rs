//! Prometheus metrics for observability and monitoring.
//!
//! This module describes every metric the service emits and installs the
//! Prometheus recorder:
//! - Live WebSocket connections per queue
//! - Events written to sockets
//! - Events dropped by the pub/sub registry
//! - Request transaction outcomes
//!
//! # Example
//!
//! ```rust,no_run
//! use office_hours_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Rendered by the HTTP layer at /metrics
//! let body = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use office_hours_core::event::EventName;
use office_hours_core::ids::QueueId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder owner.
///
/// Installs the global recorder and renders the scrape body.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address the scrape endpoint is served on, for logging
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the metrics exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a
    /// warning, leaves [`MetricsServer::handle`] empty and succeeds.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics recorder installed - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this instance.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // WebSocket Metrics
    describe_gauge!(
        "websocket_connections",
        "Currently open WebSocket connections per queue"
    );
    describe_counter!(
        "websocket_events_sent_total",
        "Total number of events written to WebSocket clients"
    );
    describe_histogram!(
        "websocket_connection_duration_seconds",
        "How long WebSocket connections stayed open"
    );

    // Pub/Sub Metrics
    describe_counter!(
        "pubsub_events_dropped_total",
        "Total number of events dropped because a subscriber buffer was full"
    );

    // Transaction Metrics
    describe_counter!(
        "transactions_total",
        "Total number of request transactions by outcome"
    );
}

#[allow(clippy::cast_precision_loss)] // connection counts stay far below 2^52
fn gauge_value(count: i64) -> f64 {
    count as f64
}

#[derive(Default)]
struct ConnectionTally {
    open: HashMap<QueueId, i64>,
    sent: HashMap<(QueueId, EventName), u64>,
}

/// WebSocket connection metrics recorder.
///
/// Emits through the global `metrics` facade and keeps its own tally so
/// tests can read counts back without a recorder installed.
#[derive(Default)]
pub struct ConnectionMetrics {
    tally: Mutex<ConnectionTally>,
}

impl ConnectionMetrics {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection opening on `queue`.
    pub fn connection_opened(&self, queue: QueueId) {
        let mut tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        let open = tally.open.entry(queue).or_insert(0);
        *open += 1;
        gauge!("websocket_connections", "queue" => queue.to_string()).set(gauge_value(*open));
    }

    /// Record a connection on `queue` closing after `lifetime`.
    pub fn connection_closed(&self, queue: QueueId, lifetime: Duration) {
        let mut tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        let open = tally.open.entry(queue).or_insert(0);
        *open = (*open - 1).max(0);
        gauge!("websocket_connections", "queue" => queue.to_string()).set(gauge_value(*open));
        histogram!("websocket_connection_duration_seconds").record(lifetime.as_secs_f64());
    }

    /// Record an event written to a socket of `queue`.
    pub fn event_sent(&self, queue: QueueId, name: EventName) {
        let mut tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        *tally.sent.entry((queue, name)).or_insert(0) += 1;
        counter!(
            "websocket_events_sent_total",
            "queue" => queue.to_string(),
            "event" => name.as_str()
        )
        .increment(1);
    }

    /// Connections currently open on `queue`.
    #[must_use]
    pub fn connections(&self, queue: QueueId) -> i64 {
        let tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        tally.open.get(&queue).copied().unwrap_or(0)
    }

    /// Events of kind `name` written to sockets of `queue`.
    #[must_use]
    pub fn events_sent(&self, queue: QueueId, name: EventName) -> u64 {
        let tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        tally.sent.get(&(queue, name)).copied().unwrap_or(0)
    }
}

impl std::fmt::Debug for ConnectionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
    }

    #[tokio::test]
    async fn test_metrics_server_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        let metrics = ConnectionMetrics::new();
        let queue = QueueId::from_uuid(Uuid::now_v7());
        metrics.connection_opened(queue);
        metrics.event_sent(queue, EventName::Ping);

        // If this test runs after another test initialized the recorder,
        // handle might be None. That's OK - metrics are still being recorded.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("websocket_connections"));
            assert!(rendered.contains("websocket_events_sent_total"));
        }
    }

    #[test]
    fn test_connection_tally() {
        let metrics = ConnectionMetrics::new();
        let queue = QueueId::from_uuid(Uuid::now_v7());

        metrics.connection_opened(queue);
        metrics.connection_opened(queue);
        metrics.connection_closed(queue, Duration::from_secs(3));
        assert_eq!(metrics.connections(queue), 1);

        metrics.event_sent(queue, EventName::Ping);
        metrics.event_sent(queue, EventName::Ping);
        metrics.event_sent(queue, EventName::Refresh);
        assert_eq!(metrics.events_sent(queue, EventName::Ping), 2);
        assert_eq!(metrics.events_sent(queue, EventName::EntryCreate), 0);
    }

    #[test]
    fn test_close_never_goes_negative() {
        let metrics = ConnectionMetrics::new();
        let queue = QueueId::from_uuid(Uuid::now_v7());
        metrics.connection_closed(queue, Duration::ZERO);
        assert_eq!(metrics.connections(queue), 0);
    }
}
