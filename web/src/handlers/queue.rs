//! Queue-wide endpoints: the snapshot, announcements, schedule, settings,
//! roster, groups and private messages.

use axum::{
    Json,
    extract::{Path, Query},
    http::StatusCode,
};
use office_hours_core::entry::RemovedQueueEntry;
use office_hours_core::ids::AnnouncementId;
use office_hours_core::queue::{Announcement, Message, QueueConfiguration};
use office_hours_core::schedule::{HalfHourGrid, QueueSchedule};
use office_hours_core::store::{FullStore, Storage};
use office_hours_runtime::queue::{self, QueueSnapshot};
use serde::Deserialize;

use super::ContentBody;
use crate::WebResult;
use crate::extractors::QueueScope;

/// `GET /queues/:queue_id`
///
/// Everything a client renders on load. Consumes the caller's oldest
/// pending message, so the transaction commits even though this is a read.
pub async fn snapshot<S>(q: QueueScope<S>) -> WebResult<Json<QueueSnapshot>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let tx = guard.tx()?;
    Ok(Json(queue::queue_snapshot(tx, &q.ctx).await?))
}

/// Query of the stack endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct StackQuery {
    /// Most entries to return.
    pub limit: Option<usize>,
}

/// `GET /queues/:queue_id/stack?limit=N`
pub async fn stack<S>(
    q: QueueScope<S>,
    Query(query): Query<StackQuery>,
) -> WebResult<Json<Vec<RemovedQueueEntry>>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let tx = guard.tx()?;
    Ok(Json(queue::stack(tx, &q.ctx, query.limit).await?))
}

/// `POST /queues/:queue_id/announcements`
pub async fn add_announcement<S>(
    q: QueueScope<S>,
    Json(body): Json<ContentBody>,
) -> WebResult<(StatusCode, Json<Announcement>)>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    let announcement = queue::add_announcement(tx, outbox, &q.ctx, body.content).await?;
    Ok((StatusCode::CREATED, Json(announcement)))
}

/// Path of one announcement.
#[derive(Debug, Deserialize)]
pub struct AnnouncementPath {
    /// Announcement id.
    pub announcement_id: AnnouncementId,
}

/// `DELETE /queues/:queue_id/announcements/:announcement_id`
pub async fn remove_announcement<S>(
    q: QueueScope<S>,
    Path(AnnouncementPath { announcement_id }): Path<AnnouncementPath>,
) -> WebResult<StatusCode>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    queue::remove_announcement(tx, outbox, &q.ctx, announcement_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /queues/:queue_id/schedule`
pub async fn schedules<S>(q: QueueScope<S>) -> WebResult<Json<Vec<QueueSchedule>>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let tx = guard.tx()?;
    Ok(Json(queue::schedules(tx, &q.ctx).await?))
}

/// `PUT /queues/:queue_id/schedule` with seven grids, Sunday first.
pub async fn replace_schedules<S>(
    q: QueueScope<S>,
    Json(grids): Json<Vec<HalfHourGrid>>,
) -> WebResult<Json<Vec<QueueSchedule>>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    Ok(Json(queue::replace_schedules(tx, outbox, &q.ctx, grids).await?))
}

/// `GET /queues/:queue_id/configuration`
pub async fn configuration<S>(q: QueueScope<S>) -> WebResult<Json<QueueConfiguration>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let tx = guard.tx()?;
    Ok(Json(queue::configuration(tx, &q.ctx).await?))
}

/// `PUT /queues/:queue_id/configuration`
pub async fn update_configuration<S>(
    q: QueueScope<S>,
    Json(configuration): Json<QueueConfiguration>,
) -> WebResult<Json<QueueConfiguration>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    Ok(Json(
        queue::update_configuration(tx, outbox, &q.ctx, configuration).await?,
    ))
}

/// `GET /queues/:queue_id/roster`
pub async fn roster<S>(q: QueueScope<S>) -> WebResult<Json<Vec<String>>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let tx = guard.tx()?;
    Ok(Json(queue::roster(tx, &q.ctx).await?))
}

/// `GET /queues/:queue_id/groups`
pub async fn groups<S>(q: QueueScope<S>) -> WebResult<Json<Vec<Vec<String>>>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let tx = guard.tx()?;
    Ok(Json(queue::groups(tx, &q.ctx).await?))
}

/// `PUT /queues/:queue_id/groups`
pub async fn replace_groups<S>(
    q: QueueScope<S>,
    Json(groups): Json<Vec<Vec<String>>>,
) -> WebResult<Json<Vec<Vec<String>>>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    Ok(Json(queue::replace_groups(tx, outbox, &q.ctx, groups).await?))
}

/// Body of a private message.
#[derive(Debug, Deserialize)]
pub struct MessageBody {
    /// Student email.
    pub receiver: String,
    /// Text.
    pub content: String,
}

/// `POST /queues/:queue_id/messages`
pub async fn send_message<S>(
    q: QueueScope<S>,
    Json(body): Json<MessageBody>,
) -> WebResult<(StatusCode, Json<Message>)>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    let message = queue::send_message(tx, outbox, &q.ctx, body.receiver, body.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
