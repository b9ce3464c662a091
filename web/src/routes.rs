//! The HTTP surface.
//!
//! ```text
//! /health                                   liveness
//! /health/ready                             storage reachable
//! /queues/:queue_id                         snapshot
//! /queues/:queue_id/ws                      live updates
//! /queues/:queue_id/stack                   recently removed entries
//! /queues/:queue_id/entries[/:entry_id[/pin|/helped]]
//! /queues/:queue_id/announcements[/:announcement_id]
//! /queues/:queue_id/schedule
//! /queues/:queue_id/configuration
//! /queues/:queue_id/roster, /groups, /messages
//! /queues/:queue_id/appointments/...        see handlers::appointments
//! ```
//!
//! Every `/queues` route runs inside [`transaction_scope`].

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};
use office_hours_core::store::{FullStore, Storage};
use tower_http::trace::TraceLayer;

use crate::handlers::{appointments, entries, health, queue, websocket};
use crate::middleware::{correlation_id_layer, transaction_scope};
use crate::state::AppState;

/// Build the application router.
pub fn router<S>(state: AppState<S>) -> Router
where
    S: Storage,
    S::Tx: FullStore,
{
    let queue_routes = Router::new()
        .route("/", get(queue::snapshot::<S>))
        .route("/ws", get(websocket::connect::<S>))
        .route("/stack", get(queue::stack::<S>))
        .route(
            "/entries",
            post(entries::add::<S>).delete(entries::clear::<S>),
        )
        .route(
            "/entries/:entry_id",
            put(entries::update::<S>).delete(entries::remove::<S>),
        )
        .route("/entries/:entry_id/pin", post(entries::pin::<S>))
        .route("/entries/:entry_id/helped", put(entries::set_helped::<S>))
        .route("/announcements", post(queue::add_announcement::<S>))
        .route(
            "/announcements/:announcement_id",
            delete(queue::remove_announcement::<S>),
        )
        .route(
            "/schedule",
            get(queue::schedules::<S>).put(queue::replace_schedules::<S>),
        )
        .route(
            "/configuration",
            get(queue::configuration::<S>).put(queue::update_configuration::<S>),
        )
        .route("/roster", get(queue::roster::<S>))
        .route(
            "/groups",
            get(queue::groups::<S>).put(queue::replace_groups::<S>),
        )
        .route("/messages", post(queue::send_message::<S>))
        .route("/appointments/schedule", get(appointments::schedules::<S>))
        .route(
            "/appointments/schedule/:day",
            get(appointments::schedule_for_day::<S>).put(appointments::update_schedule::<S>),
        )
        .route(
            "/appointments/claims/:appointment_id",
            delete(appointments::unclaim::<S>),
        )
        .route(
            "/appointments/:day_or_id",
            get(appointments::for_day::<S>)
                .put(appointments::update::<S>)
                .delete(appointments::cancel::<S>),
        )
        .route("/appointments/:day_or_id/@me", get(appointments::mine::<S>))
        .route(
            "/appointments/:day_or_id/:timeslot",
            post(appointments::signup::<S>),
        )
        .route(
            "/appointments/:day_or_id/claims/:timeslot",
            put(appointments::claim::<S>),
        )
        .route_layer(from_fn_with_state(state.clone(), transaction_scope::<S>));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness::<S>))
        .nest("/queues/:queue_id", queue_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
