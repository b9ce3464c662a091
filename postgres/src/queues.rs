//! Queues, admins, configuration, roster, groups and weekly schedules.

use office_hours_core::ids::{CourseId, QueueId};
use office_hours_core::queue::{Queue, QueueConfiguration};
use office_hours_core::schedule::{DayOfWeek, QueueSchedule};
use office_hours_core::store::{
    AdminStore, ConfigurationStore, GroupStore, QueueStore, RosterStore, ScheduleStore, StoreResult,
};
use sqlx::Row;

use crate::PgTransaction;
use crate::error::map_sqlx;
use crate::rows::{
    CONFIGURATION_COLUMNS, QUEUE_COLUMNS, decode_all, encode_day, row_to_configuration,
    row_to_queue, row_to_schedule,
};

impl QueueStore for PgTransaction {
    async fn get_queue(&mut self, id: QueueId) -> StoreResult<Option<Queue>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM queues WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_queue).transpose()
    }
}

impl AdminStore for PgTransaction {
    async fn is_course_admin(&mut self, course: CourseId, email: &str) -> StoreResult<bool> {
        let found: (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS (
                SELECT 1 FROM course_admins WHERE course_id = $1 AND email = $2
            )
            ",
        )
        .bind(course.as_uuid())
        .bind(email)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(found.0)
    }
}

impl ConfigurationStore for PgTransaction {
    async fn get_configuration(&mut self, queue: QueueId) -> StoreResult<QueueConfiguration> {
        let sql = format!("SELECT {CONFIGURATION_COLUMNS} FROM queue_configurations WHERE queue_id = $1");
        let row = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        Ok(row
            .as_ref()
            .map(row_to_configuration)
            .transpose()?
            .unwrap_or_default())
    }

    async fn update_configuration(
        &mut self,
        queue: QueueId,
        configuration: &QueueConfiguration,
    ) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO queue_configurations (
                queue_id, enable_location_field, prevent_unregistered,
                prevent_groups, prevent_groups_boost, prioritize_new
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (queue_id) DO UPDATE SET
                enable_location_field = EXCLUDED.enable_location_field,
                prevent_unregistered = EXCLUDED.prevent_unregistered,
                prevent_groups = EXCLUDED.prevent_groups,
                prevent_groups_boost = EXCLUDED.prevent_groups_boost,
                prioritize_new = EXCLUDED.prioritize_new
            ",
        )
        .bind(queue.as_uuid())
        .bind(configuration.enable_location_field)
        .bind(configuration.prevent_unregistered)
        .bind(configuration.prevent_groups)
        .bind(configuration.prevent_groups_boost)
        .bind(configuration.prioritize_new)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }
}

impl RosterStore for PgTransaction {
    async fn in_roster(&mut self, queue: QueueId, email: &str) -> StoreResult<bool> {
        let found: (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM roster WHERE queue_id = $1 AND email = $2)",
        )
        .bind(queue.as_uuid())
        .bind(email)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(found.0)
    }

    async fn get_roster(&mut self, queue: QueueId) -> StoreResult<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT email FROM roster WHERE queue_id = $1 ORDER BY email")
                .bind(queue.as_uuid())
                .fetch_all(&mut *self.tx)
                .await
                .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(|(email,)| email).collect())
    }
}

impl GroupStore for PgTransaction {
    async fn get_groups(&mut self, queue: QueueId) -> StoreResult<Vec<Vec<String>>> {
        let rows = sqlx::query(
            r"
            SELECT group_index, email FROM group_members
            WHERE queue_id = $1
            ORDER BY group_index, email
            ",
        )
        .bind(queue.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        let mut groups: Vec<Vec<String>> = Vec::new();
        let mut current = None;
        for row in &rows {
            let index: i32 = row.try_get("group_index").map_err(map_sqlx)?;
            let email: String = row.try_get("email").map_err(map_sqlx)?;
            if current != Some(index) {
                groups.push(Vec::new());
                current = Some(index);
            }
            if let Some(group) = groups.last_mut() {
                group.push(email);
            }
        }
        Ok(groups)
    }

    async fn replace_groups(&mut self, queue: QueueId, groups: &[Vec<String>]) -> StoreResult<()> {
        let mut indexes = Vec::new();
        let mut emails = Vec::new();
        for (index, group) in (0_i32..).zip(groups) {
            for email in group {
                indexes.push(index);
                emails.push(email.clone());
            }
        }

        sqlx::query("DELETE FROM group_members WHERE queue_id = $1")
            .bind(queue.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        sqlx::query("DELETE FROM roster WHERE queue_id = $1")
            .bind(queue.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        sqlx::query(
            r"
            INSERT INTO group_members (queue_id, group_index, email)
            SELECT $1, g.group_index, g.email
            FROM UNNEST($2::INTEGER[], $3::TEXT[]) AS g (group_index, email)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(queue.as_uuid())
        .bind(&indexes)
        .bind(&emails)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        sqlx::query(
            r"
            INSERT INTO roster (queue_id, email)
            SELECT DISTINCT queue_id, email FROM group_members WHERE queue_id = $1
            ",
        )
        .bind(queue.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        tracing::debug!(queue = %queue, groups = groups.len(), students = emails.len(), "Groups replaced");
        Ok(())
    }

    async fn teammates(&mut self, queue: QueueId, email: &str) -> StoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r"
            SELECT DISTINCT other.email
            FROM group_members me
            JOIN group_members other
              ON other.queue_id = me.queue_id AND other.group_index = me.group_index
            WHERE me.queue_id = $1 AND me.email = $2 AND other.email <> $2
            ORDER BY other.email
            ",
        )
        .bind(queue.as_uuid())
        .bind(email)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(|(email,)| email).collect())
    }
}

impl ScheduleStore for PgTransaction {
    async fn get_schedules(&mut self, queue: QueueId) -> StoreResult<Vec<QueueSchedule>> {
        let rows = sqlx::query("SELECT day, schedule FROM schedules WHERE queue_id = $1 ORDER BY day")
            .bind(queue.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        decode_all(&rows, row_to_schedule)
    }

    async fn get_schedule(&mut self, queue: QueueId, day: DayOfWeek) -> StoreResult<Option<QueueSchedule>> {
        let row = sqlx::query("SELECT day, schedule FROM schedules WHERE queue_id = $1 AND day = $2")
            .bind(queue.as_uuid())
            .bind(encode_day(day))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_schedule).transpose()
    }

    async fn replace_schedules(&mut self, queue: QueueId, schedules: &[QueueSchedule]) -> StoreResult<()> {
        for schedule in schedules {
            sqlx::query(
                r"
                INSERT INTO schedules (queue_id, day, schedule) VALUES ($1, $2, $3)
                ON CONFLICT (queue_id, day) DO UPDATE SET schedule = EXCLUDED.schedule
                ",
            )
            .bind(queue.as_uuid())
            .bind(encode_day(schedule.day))
            .bind(schedule.schedule.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        }
        Ok(())
    }
}
