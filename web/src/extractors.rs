//! Custom Axum extractors.
//!
//! - `CorrelationId`: the request's correlation ID
//! - `QueueScope`: the addressed queue, the caller and the open transaction
//!
//! # Examples
//!
//! ```ignore
//! async fn pin<S>(
//!     q: QueueScope<S>,
//!     Path(EntryPath { entry_id }): Path<EntryPath>,
//! ) -> WebResult<Json<QueueEntry>>
//! where
//!     S: Storage,
//!     S::Tx: FullStore,
//! {
//!     let mut guard = q.lock().await;
//!     let (tx, outbox) = guard.parts()?;
//!     Ok(Json(queue::pin_entry(tx, outbox, &q.ctx, entry_id).await?))
//! }
//! ```

use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use office_hours_core::RequestContext;
use office_hours_core::environment::Clock;
use office_hours_core::ids::QueueId;
use office_hours_core::queue::Role;
use office_hours_core::store::{AdminStore, QueueStore, Storage};
use office_hours_runtime::RequestScope;
use office_hours_runtime::transaction::ScopeGuard;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{CORRELATION_ID_HEADER, CorrelationIdExt};
use crate::session::SessionResolver;
use crate::state::AppState;

/// Correlation ID for request tracing.
///
/// Taken from the extensions set by the correlation layer, then from the
/// `X-Correlation-ID` header, and generated as a last resort.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts.correlation_id().unwrap_or_else(|| {
            parts
                .headers
                .get(CORRELATION_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| Uuid::parse_str(s).ok())
                .unwrap_or_else(Uuid::new_v4)
        });

        Ok(Self(correlation_id))
    }
}

/// A request addressed to one queue.
///
/// Resolves the `queue_id` path parameter inside the request transaction,
/// resolves the caller and their role, and stamps the request time. Only
/// usable on routes behind [`transaction_scope`](crate::middleware::transaction_scope).
pub struct QueueScope<S: Storage> {
    /// Everything the operations need to know about the request.
    pub ctx: RequestContext,
    scope: RequestScope<S::Tx>,
}

impl<S: Storage> QueueScope<S> {
    /// Exclusive access to the request transaction and its outbox.
    pub async fn lock(&self) -> ScopeGuard<S::Tx> {
        self.scope.lock().await
    }
}

#[async_trait]
impl<S> FromRequestParts<AppState<S>> for QueueScope<S>
where
    S: Storage,
    S::Tx: QueueStore + AdminStore,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let scope = parts
            .extensions
            .get::<RequestScope<S::Tx>>()
            .cloned()
            .ok_or_else(|| AppError::internal("route is not wrapped in a transaction"))?;

        let Path(params) = Path::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::validation(rejection.body_text()))?;
        let raw = params
            .get("queue_id")
            .ok_or_else(|| AppError::internal("route has no queue id"))?;
        let queue_id: QueueId = raw.parse().map_err(|_| AppError::not_found("queue", raw))?;

        let correlation_id = parts.correlation_id().unwrap_or_else(Uuid::new_v4);
        let identity = state.session.resolve(&parts.headers);

        let (queue, role) = {
            let mut guard = scope.lock().await;
            let tx = guard.tx()?;
            let queue = tx
                .get_queue(queue_id)
                .await?
                .ok_or_else(|| AppError::not_found("queue", queue_id))?;
            let admin = match &identity {
                Some(identity) => tx.is_course_admin(queue.course, &identity.email).await?,
                None => false,
            };
            let role = if admin { Role::Admin } else { Role::NonPrivileged };
            (queue, role)
        };

        let ctx = RequestContext::new(
            correlation_id,
            queue,
            identity,
            role,
            state.clock.now(),
            state.calendar,
            std::sync::Arc::clone(&state.ids),
        );

        Ok(Self { ctx, scope })
    }
}
