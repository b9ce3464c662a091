//! Wait-list entry endpoints.

use axum::{Json, extract::Path, http::StatusCode};
use office_hours_core::entry::{EntryDetails, QueueEntry, RemovedQueueEntry};
use office_hours_core::ids::EntryId;
use office_hours_core::store::{FullStore, Storage};
use office_hours_runtime::queue;
use serde::{Deserialize, Serialize};

use crate::WebResult;
use crate::extractors::QueueScope;

/// Path of one entry.
#[derive(Debug, Deserialize)]
pub struct EntryPath {
    /// Entry id.
    pub entry_id: EntryId,
}

/// `POST /queues/:queue_id/entries`
pub async fn add<S>(
    q: QueueScope<S>,
    Json(details): Json<EntryDetails>,
) -> WebResult<(StatusCode, Json<QueueEntry>)>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    let entry = queue::add_entry(tx, outbox, &q.ctx, details).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// `PUT /queues/:queue_id/entries/:entry_id`
pub async fn update<S>(
    q: QueueScope<S>,
    Path(EntryPath { entry_id }): Path<EntryPath>,
    Json(details): Json<EntryDetails>,
) -> WebResult<Json<QueueEntry>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    Ok(Json(
        queue::update_entry(tx, outbox, &q.ctx, entry_id, details).await?,
    ))
}

/// `DELETE /queues/:queue_id/entries/:entry_id`
///
/// Answers `null` when the entry was already gone.
pub async fn remove<S>(
    q: QueueScope<S>,
    Path(EntryPath { entry_id }): Path<EntryPath>,
) -> WebResult<Json<Option<RemovedQueueEntry>>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    Ok(Json(queue::remove_entry(tx, outbox, &q.ctx, entry_id).await?))
}

/// `POST /queues/:queue_id/entries/:entry_id/pin`
pub async fn pin<S>(
    q: QueueScope<S>,
    Path(EntryPath { entry_id }): Path<EntryPath>,
) -> WebResult<Json<QueueEntry>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    Ok(Json(queue::pin_entry(tx, outbox, &q.ctx, entry_id).await?))
}

/// Body of the helped toggle.
#[derive(Debug, Deserialize)]
pub struct HelpedBody {
    /// New value.
    pub helped: bool,
}

/// `PUT /queues/:queue_id/entries/:entry_id/helped`
pub async fn set_helped<S>(
    q: QueueScope<S>,
    Path(EntryPath { entry_id }): Path<EntryPath>,
    Json(body): Json<HelpedBody>,
) -> WebResult<Json<QueueEntry>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    Ok(Json(
        queue::set_helped(tx, outbox, &q.ctx, entry_id, body.helped).await?,
    ))
}

/// Result of clearing the queue.
#[derive(Debug, Serialize)]
pub struct Cleared {
    /// Entries removed.
    pub removed: u64,
}

/// `DELETE /queues/:queue_id/entries`
pub async fn clear<S>(q: QueueScope<S>) -> WebResult<Json<Cleared>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    let removed = queue::clear_entries(tx, outbox, &q.ctx).await?;
    Ok(Json(Cleared { removed }))
}
