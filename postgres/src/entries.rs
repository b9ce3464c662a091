//! Wait-list entries, announcements and messages.

use chrono::{DateTime, Utc};
use office_hours_core::StoreError;
use office_hours_core::entry::{EntryDetails, NewQueueEntry, QueueEntry, RemovedQueueEntry};
use office_hours_core::ids::{AnnouncementId, EntryId, QueueId};
use office_hours_core::queue::{Announcement, Message};
use office_hours_core::store::{AnnouncementStore, EntryStore, MessageStore, StoreResult};

use crate::PgTransaction;
use crate::error::map_sqlx;
use crate::rows::{
    ENTRY_COLUMNS, decode_all, encode_priority, row_to_announcement, row_to_entry, row_to_message,
};

fn removed(entry: QueueEntry) -> StoreResult<RemovedQueueEntry> {
    RemovedQueueEntry::try_from(entry).map_err(|e| StoreError::Integrity(e.to_string()))
}

impl EntryStore for PgTransaction {
    async fn get_entry(&mut self, queue: QueueId, id: EntryId) -> StoreResult<Option<QueueEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE queue_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_entry).transpose()
    }

    async fn active_entries(&mut self, queue: QueueId) -> StoreResult<Vec<QueueEntry>> {
        // Serving order: pinned, then priority tier, then arrival.
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE queue_id = $1 AND active \
             ORDER BY pinned DESC, priority DESC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        decode_all(&rows, row_to_entry)
    }

    async fn active_entries_for(&mut self, queue: QueueId, email: &str) -> StoreResult<Vec<QueueEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE queue_id = $1 AND active AND email = $2 \
             ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(email)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        decode_all(&rows, row_to_entry)
    }

    async fn any_active_among(&mut self, queue: QueueId, emails: &[String]) -> StoreResult<bool> {
        let found: (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS (
                SELECT 1 FROM entries WHERE queue_id = $1 AND active AND email = ANY($2)
            )
            ",
        )
        .bind(queue.as_uuid())
        .bind(emails)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(found.0)
    }

    async fn helped_since(&mut self, queue: QueueId, emails: &[String], since: EntryId) -> StoreResult<bool> {
        let found: (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS (
                SELECT 1 FROM entries
                WHERE queue_id = $1
                  AND NOT active
                  AND helped
                  AND email = ANY($2)
                  AND id >= $3
                  AND removed_by IS DISTINCT FROM email
            )
            ",
        )
        .bind(queue.as_uuid())
        .bind(emails)
        .bind(since.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(found.0)
    }

    async fn insert_entry(&mut self, entry: NewQueueEntry) -> StoreResult<QueueEntry> {
        let sql = format!(
            "INSERT INTO entries (id, queue_id, email, name, description, location, map_x, map_y, \
             priority, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {ENTRY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(entry.id.as_uuid())
            .bind(entry.queue.as_uuid())
            .bind(&entry.email)
            .bind(&entry.name)
            .bind(&entry.details.description)
            .bind(&entry.details.location)
            .bind(entry.details.map_x)
            .bind(entry.details.map_y)
            .bind(encode_priority(entry.priority))
            .bind(entry.created_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row_to_entry(&row)
    }

    async fn update_entry_details(
        &mut self,
        queue: QueueId,
        id: EntryId,
        details: &EntryDetails,
    ) -> StoreResult<Option<QueueEntry>> {
        let sql = format!(
            "UPDATE entries SET description = $3, location = $4, map_x = $5, map_y = $6 \
             WHERE queue_id = $1 AND id = $2 AND active RETURNING {ENTRY_COLUMNS}"
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
        row.as_ref().map(row_to_entry).transpose()
    }

    async fn remove_entry(
        &mut self,
        queue: QueueId,
        id: EntryId,
        remover: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RemovedQueueEntry>> {
        let sql = format!(
            "UPDATE entries SET active = FALSE, pinned = FALSE, helped = TRUE, \
             removed_by = $3, removed_at = $4 \
             WHERE queue_id = $1 AND id = $2 AND active RETURNING {ENTRY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(id.as_uuid())
            .bind(remover)
            .bind(at)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.as_ref()
            .map(|row| row_to_entry(row).and_then(removed))
            .transpose()
    }

    async fn pin_entry(&mut self, queue: QueueId, id: EntryId) -> StoreResult<Option<QueueEntry>> {
        // A second active entry for the same student trips entries_one_active.
        let sql = format!(
            "UPDATE entries SET active = TRUE, pinned = TRUE, helped = FALSE, \
             removed_by = NULL, removed_at = NULL \
             WHERE queue_id = $1 AND id = $2 RETURNING {ENTRY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_entry).transpose()
    }

    async fn set_helped(&mut self, queue: QueueId, id: EntryId, helped: bool) -> StoreResult<Option<QueueEntry>> {
        let sql = format!(
            "UPDATE entries SET helped = $3 WHERE queue_id = $1 AND id = $2 RETURNING {ENTRY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(id.as_uuid())
            .bind(helped)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_entry).transpose()
    }

    async fn clear_entries(&mut self, queue: QueueId, remover: &str, at: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r"
            UPDATE entries SET
                active = FALSE, pinned = FALSE, helped = FALSE,
                removed_by = $2, removed_at = $3
            WHERE queue_id = $1 AND active
            ",
        )
        .bind(queue.as_uuid())
        .bind(remover)
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn stack(&mut self, queue: QueueId, limit: usize) -> StoreResult<Vec<RemovedQueueEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE queue_id = $1 AND NOT active \
             ORDER BY removed_at DESC, id DESC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(queue.as_uuid())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        rows.iter()
            .map(|row| row_to_entry(row).and_then(removed))
            .collect()
    }
}

impl AnnouncementStore for PgTransaction {
    async fn list_announcements(&mut self, queue: QueueId) -> StoreResult<Vec<Announcement>> {
        let rows = sqlx::query(
            "SELECT id, queue_id, content, created_at FROM announcements WHERE queue_id = $1 ORDER BY id",
        )
        .bind(queue.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        decode_all(&rows, row_to_announcement)
    }

    async fn insert_announcement(&mut self, announcement: &Announcement) -> StoreResult<()> {
        sqlx::query("INSERT INTO announcements (id, queue_id, content, created_at) VALUES ($1, $2, $3, $4)")
            .bind(announcement.id.as_uuid())
            .bind(announcement.queue.as_uuid())
            .bind(&announcement.content)
            .bind(announcement.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn delete_announcement(&mut self, queue: QueueId, id: AnnouncementId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM announcements WHERE queue_id = $1 AND id = $2")
            .bind(queue.as_uuid())
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }
}

impl MessageStore for PgTransaction {
    async fn insert_message(&mut self, message: &Message) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO messages (id, queue_id, sender, receiver, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(message.id.as_uuid())
        .bind(message.queue.as_uuid())
        .bind(&message.sender)
        .bind(&message.receiver)
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn take_message(&mut self, queue: QueueId, receiver: &str) -> StoreResult<Option<Message>> {
        let row = sqlx::query(
            r"
            DELETE FROM messages
            WHERE id = (
                SELECT id FROM messages
                WHERE queue_id = $1 AND receiver = $2
                ORDER BY id
                LIMIT 1
            )
            RETURNING id, queue_id, sender, receiver, content, created_at
            ",
        )
        .bind(queue.as_uuid())
        .bind(receiver)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(row_to_message).transpose()
    }
}
