//! Row decoding and parameter encoding.
//!
//! Columns are read with `try_get` and converted into the checked domain
//! types; a value that fails the conversion is reported as an integrity
//! error instead of being coerced.

use office_hours_core::StoreError;
use office_hours_core::appointment::AppointmentSlot;
use office_hours_core::entry::{EntryDetails, Priority, QueueEntry};
use office_hours_core::ids::{AnnouncementId, AppointmentId, CourseId, EntryId, MessageId, QueueId};
use office_hours_core::queue::{Announcement, Message, Queue, QueueConfiguration, QueueKind};
use office_hours_core::schedule::{
    AppointmentSchedule, CapacityGrid, DayOfWeek, HalfHourGrid, QueueSchedule,
};
use office_hours_core::store::StoreResult;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::error::{corrupt, map_sqlx};

pub(crate) const QUEUE_COLUMNS: &str = "id, course_id, type, name, location, active";

pub(crate) const CONFIGURATION_COLUMNS: &str = "enable_location_field, prevent_unregistered, \
     prevent_groups, prevent_groups_boost, prioritize_new";

pub(crate) const ENTRY_COLUMNS: &str = "id, queue_id, email, name, description, location, \
     map_x, map_y, priority, pinned, active, helped, removed_by, removed_at, created_at";

pub(crate) const APPOINTMENT_COLUMNS: &str = "id, queue_id, staff_email, student_email, \
     scheduled_time, timeslot, duration, name, description, location, map_x, map_y";

pub(crate) const APPOINTMENT_SCHEDULE_COLUMNS: &str = "queue_id, day, duration, padding, schedule";

fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(map_sqlx)
}

fn uuid(row: &PgRow, column: &str) -> StoreResult<Uuid> {
    get(row, column)
}

fn day(row: &PgRow) -> StoreResult<DayOfWeek> {
    let raw: i16 = get(row, "day")?;
    let index = u8::try_from(raw).map_err(|e| corrupt("day", e))?;
    DayOfWeek::new(index).map_err(|e| corrupt("day", e))
}

fn minutes(row: &PgRow, column: &str) -> StoreResult<u32> {
    let raw: i32 = get(row, column)?;
    u32::try_from(raw).map_err(|e| corrupt(column, e))
}

pub(crate) fn row_to_queue(row: &PgRow) -> StoreResult<Queue> {
    let kind: String = get(row, "type")?;
    let kind = match kind.as_str() {
        "ordered" => QueueKind::Ordered,
        "appointments" => QueueKind::Appointments,
        other => return Err(corrupt("type", format!("unknown queue type {other}"))),
    };
    Ok(Queue {
        id: QueueId::from_uuid(uuid(row, "id")?),
        course: CourseId::from_uuid(uuid(row, "course_id")?),
        kind,
        name: get(row, "name")?,
        location: get(row, "location")?,
        active: get(row, "active")?,
    })
}

pub(crate) fn row_to_configuration(row: &PgRow) -> StoreResult<QueueConfiguration> {
    Ok(QueueConfiguration {
        enable_location_field: get(row, "enable_location_field")?,
        prevent_unregistered: get(row, "prevent_unregistered")?,
        prevent_groups: get(row, "prevent_groups")?,
        prevent_groups_boost: get(row, "prevent_groups_boost")?,
        prioritize_new: get(row, "prioritize_new")?,
    })
}

pub(crate) fn row_to_schedule(row: &PgRow) -> StoreResult<QueueSchedule> {
    let grid: String = get(row, "schedule")?;
    Ok(QueueSchedule {
        day: day(row)?,
        schedule: HalfHourGrid::try_from(grid).map_err(|e| corrupt("schedule", e))?,
    })
}

pub(crate) fn row_to_appointment_schedule(row: &PgRow) -> StoreResult<AppointmentSchedule> {
    let grid: String = get(row, "schedule")?;
    Ok(AppointmentSchedule {
        queue: QueueId::from_uuid(uuid(row, "queue_id")?),
        day: day(row)?,
        duration: minutes(row, "duration")?,
        padding: minutes(row, "padding")?,
        schedule: CapacityGrid::try_from(grid).map_err(|e| corrupt("schedule", e))?,
    })
}

pub(crate) fn row_to_entry(row: &PgRow) -> StoreResult<QueueEntry> {
    let priority: i16 = get(row, "priority")?;
    let priority = u8::try_from(priority)
        .map_err(|e| e.to_string())
        .and_then(Priority::try_from)
        .map_err(|e| corrupt("priority", e))?;
    Ok(QueueEntry {
        id: EntryId::from_uuid(uuid(row, "id")?),
        queue: QueueId::from_uuid(uuid(row, "queue_id")?),
        email: get(row, "email")?,
        name: get(row, "name")?,
        details: EntryDetails {
            description: get(row, "description")?,
            location: get(row, "location")?,
            map_x: get(row, "map_x")?,
            map_y: get(row, "map_y")?,
        },
        priority,
        pinned: get(row, "pinned")?,
        active: get(row, "active")?,
        helped: get(row, "helped")?,
        removed_by: get(row, "removed_by")?,
        removed_at: get(row, "removed_at")?,
        created_at: get(row, "created_at")?,
    })
}

pub(crate) fn row_to_announcement(row: &PgRow) -> StoreResult<Announcement> {
    Ok(Announcement {
        id: AnnouncementId::from_uuid(uuid(row, "id")?),
        queue: QueueId::from_uuid(uuid(row, "queue_id")?),
        content: get(row, "content")?,
        created_at: get(row, "created_at")?,
    })
}

pub(crate) fn row_to_message(row: &PgRow) -> StoreResult<Message> {
    Ok(Message {
        id: MessageId::from_uuid(uuid(row, "id")?),
        queue: QueueId::from_uuid(uuid(row, "queue_id")?),
        sender: get(row, "sender")?,
        receiver: get(row, "receiver")?,
        content: get(row, "content")?,
        created_at: get(row, "created_at")?,
    })
}

pub(crate) fn row_to_appointment(row: &PgRow) -> StoreResult<AppointmentSlot> {
    let timeslot: i32 = get(row, "timeslot")?;
    Ok(AppointmentSlot {
        id: AppointmentId::from_uuid(uuid(row, "id")?),
        queue: QueueId::from_uuid(uuid(row, "queue_id")?),
        staff_email: get(row, "staff_email")?,
        student_email: get(row, "student_email")?,
        scheduled_time: get(row, "scheduled_time")?,
        timeslot: usize::try_from(timeslot).map_err(|e| corrupt("timeslot", e))?,
        duration: minutes(row, "duration")?,
        name: get(row, "name")?,
        description: get(row, "description")?,
        location: get(row, "location")?,
        map_x: get(row, "map_x")?,
        map_y: get(row, "map_y")?,
    })
}

/// Decode every row with `f`, stopping at the first failure.
pub(crate) fn decode_all<T>(
    rows: &[PgRow],
    f: impl Fn(&PgRow) -> StoreResult<T>,
) -> StoreResult<Vec<T>> {
    rows.iter().map(f).collect()
}

pub(crate) fn encode_day(day: DayOfWeek) -> i16 {
    i16::from(day.index())
}

pub(crate) fn encode_priority(priority: Priority) -> i16 {
    i16::from(u8::from(priority))
}

pub(crate) fn encode_timeslot(timeslot: usize) -> StoreResult<i32> {
    i32::try_from(timeslot)
        .map_err(|_| StoreError::Integrity(format!("timeslot {timeslot} does not fit the table")))
}

pub(crate) fn encode_minutes(minutes: u32) -> StoreResult<i32> {
    i32::try_from(minutes)
        .map_err(|_| StoreError::Integrity(format!("{minutes} minutes does not fit the table")))
}

pub(crate) fn encode_kind(kind: QueueKind) -> &'static str {
    match kind {
        QueueKind::Ordered => "ordered",
        QueueKind::Appointments => "appointments",
    }
}
