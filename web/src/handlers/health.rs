//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use axum::{Json, extract::State, http::StatusCode};
use office_hours_core::store::{Storage, Transaction};
use serde::Serialize;

use crate::state::AppState;

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK to indicate the service is running.
/// This endpoint does NOT check dependencies (database, etc.).
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness report.
#[derive(Debug, Serialize)]
pub struct Readiness {
    /// `"ready"` or `"unavailable"`.
    pub status: &'static str,
    /// Open WebSocket subscriptions on this instance.
    pub subscriptions: usize,
}

/// Readiness check: storage must hand out a transaction.
///
/// # Status Codes
///
/// - 200 OK: a transaction could be opened
/// - 503 Service Unavailable: storage is unreachable
///
/// # Endpoint
///
/// ```text
/// GET /health/ready
/// ```
pub async fn readiness<S: Storage>(
    State(state): State<AppState<S>>,
) -> (StatusCode, Json<Readiness>) {
    let subscriptions = state.bus.subscription_count().await;

    let healthy = match state.storage.begin().await {
        Ok(tx) => {
            if let Err(error) = tx.rollback().await {
                tracing::warn!(error = %error, "Readiness rollback failed");
            }
            true
        }
        Err(error) => {
            tracing::warn!(error = %error, "Storage unavailable");
            false
        }
    };

    if healthy {
        (
            StatusCode::OK,
            Json(Readiness {
                status: "ready",
                subscriptions,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Readiness {
                status: "unavailable",
                subscriptions,
            }),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use office_hours_testing::{InMemoryStorage, fixtures};

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_readiness_with_in_memory_storage() {
        let state = AppState::new(InMemoryStorage::new(), fixtures::calendar());

        let (status, Json(report)) = readiness(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, "ready");
        assert_eq!(report.subscriptions, 0);
    }
}
