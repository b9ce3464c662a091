//! Appointment descriptors and the sparse slot table.
//!
//! Rows are created lazily: the first party to take a timeslot inserts a
//! row and the other party attaches to it. Attach and detach statements
//! carry their precondition in the `WHERE` clause, so a concurrent change
//! makes them return no row instead of overwriting someone else.

use chrono::{DateTime, Utc};
use office_hours_core::appointment::{AppointmentDetails, AppointmentSlot, NewAppointmentSlot};
use office_hours_core::ids::{AppointmentId, QueueId};
use office_hours_core::schedule::{AppointmentSchedule, DayOfWeek};
use office_hours_core::store::{AppointmentScheduleStore, AppointmentStore, StoreResult};

use crate::PgTransaction;
use crate::error::map_sqlx;
use crate::rows::{
    APPOINTMENT_COLUMNS, APPOINTMENT_SCHEDULE_COLUMNS, decode_all, encode_day, encode_minutes,
    encode_timeslot, row_to_appointment, row_to_appointment_schedule,
};

impl AppointmentScheduleStore for PgTransaction {
    async fn get_appointment_schedules(&mut self, queue: QueueId) -> StoreResult<Vec<AppointmentSchedule>> {
        let sql = format!(
            "SELECT {APPOINTMENT_SCHEDULE_COLUMNS} FROM appointment_schedules \
             WHERE queue_id = $1 ORDER BY day"
        );
        let rows = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        decode_all(&rows, row_to_appointment_schedule)
    }

    async fn get_appointment_schedule(
        &mut self,
        queue: QueueId,
        day: DayOfWeek,
    ) -> StoreResult<Option<AppointmentSchedule>> {
        let sql = format!(
            "SELECT {APPOINTMENT_SCHEDULE_COLUMNS} FROM appointment_schedules \
             WHERE queue_id = $1 AND day = $2"
        );
        let row = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(encode_day(day))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_appointment_schedule).transpose()
    }

    async fn update_appointment_schedule(&mut self, schedule: &AppointmentSchedule) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO appointment_schedules (queue_id, day, duration, padding, schedule)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (queue_id, day) DO UPDATE SET
                duration = EXCLUDED.duration,
                padding = EXCLUDED.padding,
                schedule = EXCLUDED.schedule
            ",
        )
        .bind(schedule.queue.as_uuid())
        .bind(encode_day(schedule.day))
        .bind(encode_minutes(schedule.duration)?)
        .bind(encode_minutes(schedule.padding)?)
        .bind(schedule.schedule.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }
}

impl AppointmentStore for PgTransaction {
    async fn get_appointment(&mut self, queue: QueueId, id: AppointmentId) -> StoreResult<Option<AppointmentSlot>> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE queue_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_appointment).transpose()
    }

    async fn appointments_between(
        &mut self,
        queue: QueueId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<AppointmentSlot>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments \
             WHERE queue_id = $1 AND scheduled_time >= $2 AND scheduled_time < $3 \
             ORDER BY scheduled_time, id"
        );
        let rows = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(from)
            .bind(to)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        decode_all(&rows, row_to_appointment)
    }

    async fn appointments_at(
        &mut self,
        queue: QueueId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        timeslot: usize,
    ) -> StoreResult<Vec<AppointmentSlot>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments \
             WHERE queue_id = $1 AND scheduled_time >= $2 AND scheduled_time < $3 \
               AND timeslot = $4 \
             ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(from)
            .bind(to)
            .bind(encode_timeslot(timeslot)?)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        decode_all(&rows, row_to_appointment)
    }

    async fn appointments_for_students(
        &mut self,
        queue: QueueId,
        students: &[String],
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<AppointmentSlot>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments \
             WHERE queue_id = $1 AND student_email = ANY($2) AND scheduled_time >= $3 \
             ORDER BY scheduled_time, id"
        );
        let rows = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(students)
            .bind(since)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        decode_all(&rows, row_to_appointment)
    }

    async fn insert_appointment(&mut self, slot: NewAppointmentSlot) -> StoreResult<AppointmentSlot> {
        let slot = slot.into_slot();
        let sql = format!(
            "INSERT INTO appointments ({APPOINTMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {APPOINTMENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(slot.id.as_uuid())
            .bind(slot.queue.as_uuid())
            .bind(&slot.staff_email)
            .bind(&slot.student_email)
            .bind(slot.scheduled_time)
            .bind(encode_timeslot(slot.timeslot)?)
            .bind(encode_minutes(slot.duration)?)
            .bind(&slot.name)
            .bind(&slot.description)
            .bind(&slot.location)
            .bind(slot.map_x)
            .bind(slot.map_y)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row_to_appointment(&row)
    }

    async fn attach_student(
        &mut self,
        queue: QueueId,
        id: AppointmentId,
        email: &str,
        name: &str,
        details: &AppointmentDetails,
    ) -> StoreResult<Option<AppointmentSlot>> {
        let sql = format!(
            "UPDATE appointments SET student_email = $3, name = $4, description = $5, \
             location = $6, map_x = $7, map_y = $8 \
             WHERE queue_id = $1 AND id = $2 AND student_email IS NULL \
             RETURNING {APPOINTMENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(id.as_uuid())
            .bind(email)
            .bind(name)
            .bind(&details.description)
            .bind(&details.location)
            .bind(details.map_x)
            .bind(details.map_y)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_appointment).transpose()
    }

    async fn attach_staff(&mut self, queue: QueueId, id: AppointmentId, email: &str) -> StoreResult<Option<AppointmentSlot>> {
        let sql = format!(
            "UPDATE appointments SET staff_email = $3 \
             WHERE queue_id = $1 AND id = $2 AND staff_email IS NULL \
             RETURNING {APPOINTMENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(id.as_uuid())
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_appointment).transpose()
    }

    async fn detach_student(&mut self, queue: QueueId, id: AppointmentId) -> StoreResult<Option<AppointmentSlot>> {
        let sql = format!(
            "UPDATE appointments SET student_email = NULL, name = NULL, description = NULL, \
             location = NULL, map_x = NULL, map_y = NULL \
             WHERE queue_id = $1 AND id = $2 \
               AND student_email IS NOT NULL AND staff_email IS NOT NULL \
             RETURNING {APPOINTMENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_appointment).transpose()
    }

    async fn detach_staff(&mut self, queue: QueueId, id: AppointmentId) -> StoreResult<Option<AppointmentSlot>> {
        let sql = format!(
            "UPDATE appointments SET staff_email = NULL \
             WHERE queue_id = $1 AND id = $2 \
               AND student_email IS NOT NULL AND staff_email IS NOT NULL \
             RETURNING {APPOINTMENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_appointment).transpose()
    }

    async fn delete_appointment(&mut self, queue: QueueId, id: AppointmentId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM appointments WHERE queue_id = $1 AND id = $2")
            .bind(queue.as_uuid())
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_appointment_details(
        &mut self,
        queue: QueueId,
        id: AppointmentId,
        details: &AppointmentDetails,
    ) -> StoreResult<Option<AppointmentSlot>> {
        let sql = format!(
            "UPDATE appointments SET description = $3, location = $4, map_x = $5, map_y = $6 \
             WHERE queue_id = $1 AND id = $2 AND student_email IS NOT NULL \
             RETURNING {APPOINTMENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(id.as_uuid())
            .bind(&details.description)
            .bind(&details.location)
            .bind(details.map_x)
            .bind(details.map_y)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_appointment).transpose()
    }
}
