//! HTTP and WebSocket surface of the office hours service.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Web Shell (Axum)              │  ← HTTP, JSON, WebSocket
//! │  - Correlation IDs, tracing spans       │
//! │  - One transaction per request          │  ← commit < 400, else rollback
//! │  - Caller and role resolution           │
//! ├─────────────────────────────────────────┤
//! │         Runtime Operations              │
//! │  - Queue and appointment rules          │  ← Testable on in-memory storage
//! │  - Events appended to an outbox         │  ← Published after commit
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Request Flow
//!
//! 1. **HTTP Request** enters the correlation span
//! 2. **Transaction** opens and is stored in the request extensions
//! 3. **QueueScope** loads the queue and resolves the caller's role
//! 4. **Operation** reads and writes through the transaction
//! 5. **Response** status decides commit or rollback
//! 6. **Outbox** is published to WebSocket subscribers after a commit
//!
//! # Example
//!
//! ```ignore
//! use office_hours_web::{AppState, router};
//!
//! let state = AppState::new(storage, calendar).with_heartbeat(heartbeat);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router(state)).await?;
//! ```

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{CorrelationId, QueueScope};
pub use middleware::{CORRELATION_ID_HEADER, CorrelationIdExt, correlation_id_layer};
pub use routes::router;
pub use session::{ForwardedHeaders, SessionResolver};
pub use state::{AppState, HeartbeatConfig};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
