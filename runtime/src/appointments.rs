//! Appointment slot allocation.
//!
//! Rows of the slot table move through the four states of
//! [`SlotState`](office_hours_core::appointment::SlotState). The decisions
//! (which row to join, whether a row is deleted or detached) come from
//! [`plan_attach`] and [`plan_release`]; this module performs the reads
//! those plans need and the guarded writes they call for.
//!
//! Capacity checks are read-then-write with no in-process locking. The
//! storage transaction's isolation is what keeps two concurrent bookings
//! from both taking the last place.

use office_hours_core::appointment::{
    Allocation, AppointmentDetails, AppointmentSlot, AppointmentUpdate, AppointmentView,
    NewAppointmentSlot, Party, Release, SlotHolder, occupied, plan_attach, plan_release,
};
use office_hours_core::error::AdmissionDenied;
use office_hours_core::ids::{AppointmentId, QueueId};
use office_hours_core::schedule::{
    AppointmentSchedule, CapacityGrid, DayOfWeek, MINUTES_PER_DAY,
};
use office_hours_core::store::{
    AppointmentScheduleStore, AppointmentStore, ConfigurationStore, GroupStore, RosterStore,
};
use office_hours_core::{QueueError, RequestContext};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::fanout;
use crate::outbox::Outbox;

/// Body of an appointment schedule replacement.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AppointmentScheduleUpdate {
    /// Timeslot length in minutes.
    pub duration: u32,
    /// Buffer between appointments, in minutes.
    #[serde(default)]
    pub padding: u32,
    /// Capacity per timeslot.
    pub schedule: CapacityGrid,
}

fn changed_underneath() -> QueueError {
    QueueError::conflict("that appointment changed while you were editing it, try again")
}

async fn load_schedule<T>(
    tx: &mut T,
    queue: QueueId,
    day: DayOfWeek,
) -> Result<AppointmentSchedule, QueueError>
where
    T: AppointmentScheduleStore,
{
    tx.get_appointment_schedule(queue, day)
        .await?
        .ok_or_else(|| QueueError::not_found("appointment schedule", day))
}

async fn load_slot<T>(tx: &mut T, queue: QueueId, id: AppointmentId) -> Result<AppointmentSlot, QueueError>
where
    T: AppointmentStore,
{
    tx.get_appointment(queue, id)
        .await?
        .ok_or_else(|| QueueError::not_found("appointment", id))
}

fn capacity_at(schedule: &AppointmentSchedule, timeslot: usize) -> Result<u8, QueueError> {
    schedule.capacity_at(timeslot).ok_or_else(|| {
        QueueError::validation(format!(
            "timeslot {timeslot} does not exist; the day has {} timeslots",
            schedule.timeslots()
        ))
    })
}

/// Put `holder` into `timeslot` of the next-or-current `day`.
///
/// Joins a row held only by the other party when one exists, otherwise
/// inserts a new row. Returns the row and whether it already existed.
async fn place<T>(
    tx: &mut T,
    ctx: &RequestContext,
    schedule: &AppointmentSchedule,
    timeslot: usize,
    holder: SlotHolder,
) -> Result<(AppointmentSlot, bool), QueueError>
where
    T: AppointmentStore,
{
    let queue = ctx.queue.id;
    let day = schedule.day;
    let capacity = capacity_at(schedule, timeslot)?;
    let bounds = ctx.day_bounds(day);
    let rows = tx
        .appointments_at(queue, bounds.start, bounds.end, timeslot)
        .await?;

    let party = match &holder {
        SlotHolder::Student { .. } => Party::Student,
        SlotHolder::Staff { .. } => Party::Staff,
    };
    let plan = plan_attach(&rows, party, capacity).inspect_err(|full| {
        warn!(queue = %queue, day = %day, timeslot, reason = %full, "No room at timeslot");
    })?;

    match plan {
        Allocation::Attach(id) => {
            let slot = match &holder {
                SlotHolder::Student {
                    email,
                    name,
                    details,
                } => tx.attach_student(queue, id, email, name, details).await?,
                SlotHolder::Staff { email } => tx.attach_staff(queue, id, email).await?,
            };
            Ok((slot.ok_or_else(changed_underneath)?, true))
        }
        Allocation::Insert => {
            let slot = tx
                .insert_appointment(NewAppointmentSlot {
                    id: AppointmentId::from_uuid(ctx.next_id()),
                    queue,
                    scheduled_time: ctx
                        .calendar
                        .timeslot_start(ctx.now, day, timeslot, schedule.duration),
                    timeslot,
                    duration: schedule.duration,
                    holder,
                })
                .await?;
            Ok((slot, false))
        }
    }
}

/// Take the student off `slot`, deleting the row if nobody else holds it.
async fn release_student<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    slot: &AppointmentSlot,
) -> Result<(), QueueError>
where
    T: AppointmentStore,
{
    let remaining = match plan_release(slot, Party::Student) {
        Release::AlreadyAbsent => return Ok(()),
        Release::Delete => {
            if !tx.delete_appointment(slot.queue, slot.id).await? {
                return Err(changed_underneath());
            }
            None
        }
        Release::Detach => Some(
            tx.detach_student(slot.queue, slot.id)
                .await?
                .ok_or_else(changed_underneath)?,
        ),
    };
    fanout::appointment_cancelled(outbox, slot, remaining.as_ref())
}

/// Book `timeslot` on the next-or-current `day` for the signed-in caller.
///
/// # Errors
///
/// - [`QueueError::NotFound`] if the day has no appointment schedule
/// - [`QueueError::Denied`] if a roster or group rule rejects the caller
/// - [`QueueError::Validation`] for bad fields or a timeslot out of range
/// - [`QueueError::Conflict`] if the caller already has an ongoing or
///   upcoming appointment, or the timeslot is full
pub async fn signup<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    day: DayOfWeek,
    timeslot: usize,
    details: AppointmentDetails,
) -> Result<AppointmentSlot, QueueError>
where
    T: ConfigurationStore + RosterStore + GroupStore + AppointmentScheduleStore + AppointmentStore,
{
    let identity = ctx.require_identity()?;
    let queue = ctx.queue.id;
    let schedule = load_schedule(tx, queue, day).await?;
    // Anything starting after this is ongoing or upcoming.
    let since = ctx.now - schedule.slot_length();

    if !ctx.is_admin() {
        let config = tx.get_configuration(queue).await?;
        if config.prevent_unregistered && !tx.in_roster(queue, &identity.email).await? {
            return Err(QueueError::Denied(AdmissionDenied::NotInRoster));
        }
        if config.prevent_groups {
            let teammates = tx.teammates(queue, &identity.email).await?;
            if !teammates.is_empty()
                && !tx
                    .appointments_for_students(queue, &teammates, since)
                    .await?
                    .is_empty()
            {
                return Err(QueueError::Denied(AdmissionDenied::TeammateHasAppointment));
            }
        }
    }

    details.validate()?;
    capacity_at(&schedule, timeslot)?;

    let existing = tx
        .appointments_for_students(queue, std::slice::from_ref(&identity.email), since)
        .await?;
    if !existing.is_empty() {
        return Err(QueueError::conflict("you already have an upcoming appointment"));
    }

    let holder = SlotHolder::Student {
        email: identity.email.clone(),
        name: identity.name.clone(),
        details,
    };
    let (slot, attached) = place(tx, ctx, &schedule, timeslot, holder).await?;
    fanout::appointment_booked(outbox, &slot, attached)?;
    info!(
        queue = %queue,
        appointment = %slot.id,
        day = %day,
        timeslot,
        attached,
        "Appointment booked"
    );
    Ok(slot)
}

/// Reserve `timeslot` on the next-or-current `day` for the calling staff member.
///
/// # Errors
///
/// - [`QueueError::Forbidden`] for non-admins
/// - [`QueueError::NotFound`] if the day has no appointment schedule
/// - [`QueueError::Validation`] for a timeslot out of range
/// - [`QueueError::Conflict`] if the caller already claimed the timeslot or
///   it is full
pub async fn claim<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    day: DayOfWeek,
    timeslot: usize,
) -> Result<AppointmentSlot, QueueError>
where
    T: AppointmentScheduleStore + AppointmentStore,
{
    let identity = ctx.require_admin()?;
    let queue = ctx.queue.id;
    let schedule = load_schedule(tx, queue, day).await?;
    capacity_at(&schedule, timeslot)?;

    let bounds = ctx.day_bounds(day);
    let mine = tx
        .appointments_at(queue, bounds.start, bounds.end, timeslot)
        .await?
        .iter()
        .any(|row| row.staff_email.as_deref() == Some(identity.email.as_str()));
    if mine {
        return Err(QueueError::conflict("you already claimed that timeslot"));
    }

    let holder = SlotHolder::Staff {
        email: identity.email.clone(),
    };
    let (slot, attached) = place(tx, ctx, &schedule, timeslot, holder).await?;
    fanout::appointment_claimed(outbox, &slot, attached)?;
    info!(queue = %queue, appointment = %slot.id, day = %day, timeslot, attached, "Timeslot claimed");
    Ok(slot)
}

/// Drop the staff claim on an appointment.
///
/// A staff-only row is deleted; a booked row keeps its student. Unclaiming
/// a row nobody has claimed succeeds without changes and returns `None`.
///
/// # Errors
///
/// - [`QueueError::Forbidden`] for non-admins
/// - [`QueueError::NotFound`] if no row has that id
pub async fn unclaim<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    id: AppointmentId,
) -> Result<Option<AppointmentSlot>, QueueError>
where
    T: AppointmentStore,
{
    ctx.require_admin()?;
    let queue = ctx.queue.id;
    let slot = load_slot(tx, queue, id).await?;

    let remaining = match plan_release(&slot, Party::Staff) {
        Release::AlreadyAbsent => {
            debug!(queue = %queue, appointment = %id, "Appointment not claimed");
            return Ok(None);
        }
        Release::Delete => {
            if !tx.delete_appointment(queue, id).await? {
                return Err(changed_underneath());
            }
            None
        }
        Release::Detach => Some(
            tx.detach_staff(queue, id)
                .await?
                .ok_or_else(changed_underneath)?,
        ),
    };
    fanout::appointment_unclaimed(outbox, &slot, remaining.as_ref())?;
    info!(queue = %queue, appointment = %id, deleted = remaining.is_none(), "Claim removed");
    Ok(remaining)
}

/// Cancel the caller's booking.
///
/// Cancelling a row that no longer has a student succeeds without changes.
///
/// # Errors
///
/// - [`QueueError::NotFound`] if no row has that id
/// - [`QueueError::Forbidden`] if someone else booked it
/// - [`QueueError::Conflict`] if the appointment has already started
pub async fn remove_signup<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    id: AppointmentId,
) -> Result<(), QueueError>
where
    T: AppointmentStore,
{
    let identity = ctx.require_identity()?;
    let queue = ctx.queue.id;
    let slot = load_slot(tx, queue, id).await?;

    let Some(student) = slot.student_email.as_deref() else {
        debug!(queue = %queue, appointment = %id, "Signup already removed");
        return Ok(());
    };
    if student != identity.email {
        return Err(QueueError::forbidden("you can only cancel your own appointment"));
    }
    if slot.scheduled_time < ctx.now {
        return Err(QueueError::conflict("that appointment already started"));
    }

    release_student(tx, outbox, &slot).await?;
    info!(queue = %queue, appointment = %id, "Signup removed");
    Ok(())
}

/// Edit or move the caller's booking.
///
/// Keeping the timeslot edits the row in place. Moving it books the new
/// timeslot first and releases the old one only once that succeeded, so a
/// failed move leaves the original untouched.
///
/// # Errors
///
/// - [`QueueError::NotFound`] if no booked row has that id
/// - [`QueueError::Forbidden`] if someone else booked it
/// - [`QueueError::Validation`] for bad fields or a timeslot out of range
/// - [`QueueError::Conflict`] if the new time has passed or is full
pub async fn update_appointment<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    id: AppointmentId,
    update: AppointmentUpdate,
) -> Result<AppointmentSlot, QueueError>
where
    T: AppointmentScheduleStore + AppointmentStore,
{
    let identity = ctx.require_identity()?;
    let queue = ctx.queue.id;
    let slot = load_slot(tx, queue, id).await?;

    let Some(student) = slot.student_email.as_deref() else {
        return Err(QueueError::not_found("appointment", id));
    };
    if student != identity.email {
        return Err(QueueError::forbidden("you can only change your own appointment"));
    }
    update.details.validate()?;

    if update.timeslot == slot.timeslot {
        let updated = tx
            .update_appointment_details(queue, id, &update.details)
            .await?
            .ok_or_else(changed_underneath)?;
        fanout::appointment_updated(outbox, &updated)?;
        debug!(queue = %queue, appointment = %id, "Appointment edited");
        return Ok(updated);
    }

    let day = ctx.calendar.weekday(slot.scheduled_time);
    let schedule = load_schedule(tx, queue, day).await?;
    capacity_at(&schedule, update.timeslot)?;
    let new_time = ctx
        .calendar
        .timeslot_start(ctx.now, day, update.timeslot, schedule.duration);
    if new_time < ctx.now {
        return Err(QueueError::conflict("you can't move an appointment into the past"));
    }

    let holder = SlotHolder::Student {
        email: identity.email.clone(),
        name: identity.name.clone(),
        details: update.details,
    };
    let (created, attached) = place(tx, ctx, &schedule, update.timeslot, holder).await?;
    release_student(tx, outbox, &slot).await?;
    fanout::appointment_booked(outbox, &created, attached)?;

    info!(
        queue = %queue,
        from = %id,
        to = %created.id,
        timeslot = update.timeslot,
        "Appointment moved"
    );
    Ok(created)
}

/// Replace the appointment schedule of one weekday.
///
/// # Errors
///
/// - [`QueueError::Forbidden`] for non-admins
/// - [`QueueError::NotFound`] if the day has no schedule yet
/// - [`QueueError::Validation`] for a zero duration, a grid longer than a day,
///   or a grid whose length differs from the day's timeslot count
/// - [`QueueError::Conflict`] if the duration changes while the day has
///   appointments, or a timeslot would hold more rows than its new capacity
pub async fn update_schedule<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    day: DayOfWeek,
    update: AppointmentScheduleUpdate,
) -> Result<AppointmentSchedule, QueueError>
where
    T: AppointmentScheduleStore + AppointmentStore,
{
    ctx.require_admin()?;
    let queue = ctx.queue.id;
    let current = load_schedule(tx, queue, day).await?;
    if update.schedule.len() != current.timeslots() {
        return Err(QueueError::validation(format!(
            "schedule must have {} timeslots, got {}",
            current.timeslots(),
            update.schedule.len()
        )));
    }

    if update.duration == 0 {
        return Err(QueueError::validation("duration must be at least one minute"));
    }
    let span = u64::from(update.duration) * update.schedule.len() as u64;
    if span > u64::from(MINUTES_PER_DAY) {
        return Err(QueueError::validation(format!(
            "{} timeslots of {} minutes do not fit in a day",
            update.schedule.len(),
            update.duration
        )));
    }

    let bounds = ctx.day_bounds(day);
    let rows = tx.appointments_between(queue, bounds.start, bounds.end).await?;
    if !rows.is_empty() && update.duration != current.duration {
        return Err(QueueError::conflict(
            "you can't change the duration while the day has appointments",
        ));
    }

    let mut by_timeslot: BTreeMap<usize, Vec<AppointmentSlot>> = BTreeMap::new();
    for row in rows {
        by_timeslot.entry(row.timeslot).or_default().push(row);
    }
    for (timeslot, rows) in &by_timeslot {
        let capacity = usize::from(update.schedule.capacity_at(*timeslot).unwrap_or(0));
        let held = occupied(rows, Party::Student).max(occupied(rows, Party::Staff));
        if held > capacity {
            return Err(QueueError::conflict(format!(
                "timeslot {timeslot} has {held} appointments but the new schedule only allows {capacity}"
            )));
        }
    }

    let schedule = AppointmentSchedule {
        queue,
        day,
        duration: update.duration,
        padding: update.padding,
        schedule: update.schedule,
    };
    tx.update_appointment_schedule(&schedule).await?;
    fanout::refresh(outbox, queue);
    info!(queue = %queue, day = %day, "Appointment schedule updated");
    Ok(schedule)
}

/// All seven weekday descriptors.
///
/// # Errors
///
/// Propagates storage failures.
pub async fn schedules<T>(tx: &mut T, ctx: &RequestContext) -> Result<Vec<AppointmentSchedule>, QueueError>
where
    T: AppointmentScheduleStore,
{
    Ok(tx.get_appointment_schedules(ctx.queue.id).await?)
}

/// Descriptor of one weekday.
///
/// # Errors
///
/// Returns [`QueueError::NotFound`] if the day has no schedule.
pub async fn schedule_for_day<T>(
    tx: &mut T,
    ctx: &RequestContext,
    day: DayOfWeek,
) -> Result<AppointmentSchedule, QueueError>
where
    T: AppointmentScheduleStore,
{
    load_schedule(tx, ctx.queue.id, day).await
}

/// Appointments on the next-or-current `day` as the caller may see them.
///
/// Admins see every row in full. Others see booked rows only, anonymized
/// except their own, which is shown without the staff email.
///
/// # Errors
///
/// Propagates storage failures.
pub async fn appointments<T>(
    tx: &mut T,
    ctx: &RequestContext,
    day: DayOfWeek,
) -> Result<Vec<AppointmentView>, QueueError>
where
    T: AppointmentStore,
{
    let bounds = ctx.day_bounds(day);
    let rows = tx
        .appointments_between(ctx.queue.id, bounds.start, bounds.end)
        .await?;
    if ctx.is_admin() {
        return Ok(rows.into_iter().map(AppointmentView::Full).collect());
    }

    let caller = ctx.identity.as_ref().map(|i| i.email.as_str());
    Ok(rows
        .into_iter()
        .filter(|row| row.student_email.is_some())
        .map(|row| {
            if row.student_email.as_deref() == caller {
                AppointmentView::Full(row.without_staff())
            } else {
                AppointmentView::Anonymous(row.anonymized())
            }
        })
        .collect())
}

/// The caller's own bookings on the next-or-current `day`.
///
/// # Errors
///
/// Returns [`QueueError::Unauthorized`] for anonymous callers.
pub async fn my_appointments<T>(
    tx: &mut T,
    ctx: &RequestContext,
    day: DayOfWeek,
) -> Result<Vec<AppointmentSlot>, QueueError>
where
    T: AppointmentStore,
{
    let identity = ctx.require_identity()?;
    let bounds = ctx.day_bounds(day);
    let rows = tx
        .appointments_between(ctx.queue.id, bounds.start, bounds.end)
        .await?;
    let admin = ctx.is_admin();
    Ok(rows
        .into_iter()
        .filter(|row| row.student_email.as_deref() == Some(identity.email.as_str()))
        .map(|row| if admin { row } else { row.without_staff() })
        .collect())
}
