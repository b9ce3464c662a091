//! Axum middleware for request tracking and transactions.
//!
//! This module provides two layers:
//! - **Correlation ID tracking**: extract or generate a correlation ID, run
//!   the request inside an `http_request` span and echo the ID back
//! - **Transaction scope**: every queue request runs inside one storage
//!   transaction whose events are published only after it commits
//!
//! # Example
//!
//! ```ignore
//! let queue_routes = Router::new()
//!     .route("/entries", post(entries::add::<S>))
//!     .route_layer(from_fn_with_state(state.clone(), transaction_scope::<S>));
//!
//! let app = Router::new()
//!     .nest("/queues/:queue_id", queue_routes)
//!     .layer(correlation_id_layer())
//!     .with_state(state);
//! ```
//!
//! # Transaction Flow
//!
//! 1. **Begin** a transaction and store its [`RequestScope`] in the extensions
//! 2. **Run** the handler, which borrows the transaction and fills the outbox
//! 3. **Commit** if the response status is below 400, otherwise roll back
//! 4. **Publish** the outbox, only after a successful commit

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use office_hours_core::store::Storage;
use office_hours_runtime::{Outcome, RequestScope};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{Instrument, debug};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Create a layer that adds correlation ID tracking to all requests.
///
/// This layer:
/// - Extracts correlation ID from request header or generates new UUID
/// - Stores correlation ID in request extensions
/// - Creates tracing span with correlation_id field
/// - Injects correlation ID into response header
///
#[must_use]
pub fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// Layer for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Middleware service for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for CorrelationIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        // Extract correlation ID from header or generate new
        let correlation_id = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        // Store in request extensions for handler access
        req.extensions_mut().insert(correlation_id);

        // Create tracing span with correlation context
        let span = tracing::info_span!(
            "http_request",
            correlation_id = %correlation_id,
            method = %req.method(),
            uri = %req.uri(),
        );

        let fut = self.inner.call(req);

        Box::pin(async move {
            // Execute request within span
            let mut response = fut.instrument(span).await?;

            // Inject correlation ID into response header
            if let Ok(header_value) = HeaderValue::from_str(&correlation_id.to_string()) {
                response
                    .headers_mut()
                    .insert(CORRELATION_ID_HEADER, header_value);
            }

            Ok(response)
        })
    }
}

/// Run the request inside one storage transaction.
///
/// The [`RequestScope`] is inserted into the request extensions. Responses
/// below 400 commit and then publish the outbox; everything else rolls back
/// and drops it. A failed begin or commit replaces the response with the
/// storage error.
pub async fn transaction_scope<S>(
    State(state): State<AppState<S>>,
    mut request: Request,
    next: Next,
) -> Response
where
    S: Storage,
{
    let scope = match RequestScope::begin(&state.storage).await {
        Ok(scope) => scope,
        Err(error) => return AppError::from(error).into_response(),
    };
    request.extensions_mut().insert(scope.clone());

    let response = next.run(request).await;
    let commit = response.status().as_u16() < 400;

    match scope.finish(commit, state.bus.as_ref()).await {
        Ok(Outcome::Committed { delivered }) => {
            debug!(delivered, "Transaction committed");
            response
        }
        Ok(Outcome::RolledBack | Outcome::AlreadyFinished) => response,
        Err(error) => AppError::from(error).into_response(),
    }
}

/// Correlation ID stored by [`correlation_id_layer`].
pub trait CorrelationIdExt {
    /// The correlation ID, or `None` if the layer is not installed.
    fn correlation_id(&self) -> Option<Uuid>;
}

impl<B> CorrelationIdExt for axum::http::Request<B> {
    fn correlation_id(&self) -> Option<Uuid> {
        self.extensions().get::<Uuid>().copied()
    }
}

impl CorrelationIdExt for axum::http::request::Parts {
    fn correlation_id(&self) -> Option<Uuid> {
        self.extensions.get::<Uuid>().copied()
    }
}
