//! Appointment endpoints.
//!
//! Days are weekday indexes (`0` is Sunday) and timeslots are offsets of
//! `duration` minutes from local midnight. Day routes and row routes share
//! the `:day_or_id` segment, so the path structs rename it.

use axum::{Json, extract::Path, http::StatusCode};
use office_hours_core::appointment::{
    AppointmentDetails, AppointmentSlot, AppointmentUpdate, AppointmentView,
};
use office_hours_core::ids::AppointmentId;
use office_hours_core::schedule::AppointmentSchedule;
use office_hours_core::store::{FullStore, Storage};
use office_hours_runtime::appointments::{self, AppointmentScheduleUpdate};
use serde::Deserialize;

use super::weekday;
use crate::WebResult;
use crate::extractors::QueueScope;

/// Path of one weekday.
#[derive(Debug, Deserialize)]
pub struct DayPath {
    /// Weekday index.
    #[serde(rename = "day_or_id")]
    pub day: u8,
}

/// Path of one timeslot.
#[derive(Debug, Deserialize)]
pub struct TimeslotPath {
    /// Weekday index.
    #[serde(rename = "day_or_id")]
    pub day: u8,
    /// Timeslot on that day.
    pub timeslot: usize,
}

/// Path of one appointment.
#[derive(Debug, Deserialize)]
pub struct AppointmentPath {
    /// Appointment id.
    #[serde(rename = "day_or_id")]
    pub appointment_id: AppointmentId,
}

/// Path of one claimed appointment.
#[derive(Debug, Deserialize)]
pub struct ClaimPath {
    /// Appointment id.
    pub appointment_id: AppointmentId,
}

/// Path of one weekday's descriptor.
#[derive(Debug, Deserialize)]
pub struct ScheduleDayPath {
    /// Weekday index.
    pub day: u8,
}

/// `GET /queues/:queue_id/appointments/:day`
pub async fn for_day<S>(
    q: QueueScope<S>,
    Path(DayPath { day }): Path<DayPath>,
) -> WebResult<Json<Vec<AppointmentView>>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let day = weekday(day)?;
    let mut guard = q.lock().await;
    let tx = guard.tx()?;
    Ok(Json(appointments::appointments(tx, &q.ctx, day).await?))
}

/// `GET /queues/:queue_id/appointments/:day/@me`
pub async fn mine<S>(
    q: QueueScope<S>,
    Path(DayPath { day }): Path<DayPath>,
) -> WebResult<Json<Vec<AppointmentSlot>>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let day = weekday(day)?;
    let mut guard = q.lock().await;
    let tx = guard.tx()?;
    Ok(Json(appointments::my_appointments(tx, &q.ctx, day).await?))
}

/// `POST /queues/:queue_id/appointments/:day/:timeslot`
pub async fn signup<S>(
    q: QueueScope<S>,
    Path(TimeslotPath { day, timeslot }): Path<TimeslotPath>,
    Json(details): Json<AppointmentDetails>,
) -> WebResult<(StatusCode, Json<AppointmentSlot>)>
where
    S: Storage,
    S::Tx: FullStore,
{
    let day = weekday(day)?;
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    let slot = appointments::signup(tx, outbox, &q.ctx, day, timeslot, details).await?;
    Ok((StatusCode::CREATED, Json(slot)))
}

/// `PUT /queues/:queue_id/appointments/:day/claims/:timeslot`
pub async fn claim<S>(
    q: QueueScope<S>,
    Path(TimeslotPath { day, timeslot }): Path<TimeslotPath>,
) -> WebResult<Json<AppointmentSlot>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let day = weekday(day)?;
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    Ok(Json(
        appointments::claim(tx, outbox, &q.ctx, day, timeslot).await?,
    ))
}

/// `DELETE /queues/:queue_id/appointments/claims/:appointment_id`
///
/// Answers `null` when the row was already gone.
pub async fn unclaim<S>(
    q: QueueScope<S>,
    Path(ClaimPath { appointment_id }): Path<ClaimPath>,
) -> WebResult<Json<Option<AppointmentSlot>>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    Ok(Json(
        appointments::unclaim(tx, outbox, &q.ctx, appointment_id).await?,
    ))
}

/// `DELETE /queues/:queue_id/appointments/:appointment_id`
pub async fn cancel<S>(
    q: QueueScope<S>,
    Path(AppointmentPath { appointment_id }): Path<AppointmentPath>,
) -> WebResult<StatusCode>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    appointments::remove_signup(tx, outbox, &q.ctx, appointment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /queues/:queue_id/appointments/:appointment_id`
pub async fn update<S>(
    q: QueueScope<S>,
    Path(AppointmentPath { appointment_id }): Path<AppointmentPath>,
    Json(update): Json<AppointmentUpdate>,
) -> WebResult<Json<AppointmentSlot>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    Ok(Json(
        appointments::update_appointment(tx, outbox, &q.ctx, appointment_id, update).await?,
    ))
}

/// `GET /queues/:queue_id/appointments/schedule`
pub async fn schedules<S>(q: QueueScope<S>) -> WebResult<Json<Vec<AppointmentSchedule>>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let mut guard = q.lock().await;
    let tx = guard.tx()?;
    Ok(Json(appointments::schedules(tx, &q.ctx).await?))
}

/// `GET /queues/:queue_id/appointments/schedule/:day`
pub async fn schedule_for_day<S>(
    q: QueueScope<S>,
    Path(ScheduleDayPath { day }): Path<ScheduleDayPath>,
) -> WebResult<Json<AppointmentSchedule>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let day = weekday(day)?;
    let mut guard = q.lock().await;
    let tx = guard.tx()?;
    Ok(Json(appointments::schedule_for_day(tx, &q.ctx, day).await?))
}

/// `PUT /queues/:queue_id/appointments/schedule/:day`
pub async fn update_schedule<S>(
    q: QueueScope<S>,
    Path(ScheduleDayPath { day }): Path<ScheduleDayPath>,
    Json(update): Json<AppointmentScheduleUpdate>,
) -> WebResult<Json<AppointmentSchedule>>
where
    S: Storage,
    S::Tx: FullStore,
{
    let day = weekday(day)?;
    let mut guard = q.lock().await;
    let (tx, outbox) = guard.parts()?;
    Ok(Json(
        appointments::update_schedule(tx, outbox, &q.ctx, day, update).await?,
    ))
}
