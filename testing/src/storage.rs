//! In-memory storage for fast, deterministic tests.
//!
//! [`InMemoryStorage`] implements every store capability on plain
//! collections. A transaction takes an exclusive lock on the committed
//! tables and works on a private copy: commit swaps the copy in, rollback
//! drops it. Transactions therefore run one after another, which is the
//! strongest isolation a test can ask for.

use chrono::{DateTime, Utc};
use office_hours_core::StoreError;
use office_hours_core::appointment::{AppointmentDetails, AppointmentSlot, NewAppointmentSlot};
use office_hours_core::entry::{
    EntryDetails, NewQueueEntry, QueueEntry, RemovedQueueEntry, queue_order, stack_order,
};
use office_hours_core::ids::{
    AnnouncementId, AppointmentId, CourseId, EntryId, MessageId, QueueId,
};
use office_hours_core::queue::{Announcement, Message, Queue, QueueConfiguration};
use office_hours_core::schedule::{AppointmentSchedule, DayOfWeek, HalfHourGrid, QueueSchedule};
use office_hours_core::store::{
    AdminStore, AnnouncementStore, AppointmentScheduleStore, AppointmentStore,
    ConfigurationStore, EntryStore, GroupStore, MessageStore, QueueStore, RosterStore,
    ScheduleStore, Storage, StoreResult, Transaction,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Every table, as plain collections.
#[derive(Clone, Debug, Default)]
pub struct Tables {
    queues: HashMap<QueueId, Queue>,
    admins: HashSet<(CourseId, String)>,
    configurations: HashMap<QueueId, QueueConfiguration>,
    rosters: HashMap<QueueId, BTreeSet<String>>,
    groups: HashMap<QueueId, Vec<Vec<String>>>,
    schedules: HashMap<(QueueId, DayOfWeek), HalfHourGrid>,
    entries: BTreeMap<EntryId, QueueEntry>,
    announcements: BTreeMap<AnnouncementId, Announcement>,
    messages: BTreeMap<MessageId, Message>,
    appointment_schedules: HashMap<(QueueId, DayOfWeek), AppointmentSchedule>,
    appointments: BTreeMap<AppointmentId, AppointmentSlot>,
}

impl Tables {
    /// Add or replace a queue.
    pub fn put_queue(&mut self, queue: Queue) -> &mut Self {
        self.queues.insert(queue.id, queue);
        self
    }

    /// Make `email` an admin of `course`.
    pub fn put_admin(&mut self, course: CourseId, email: &str) -> &mut Self {
        self.admins.insert((course, email.to_owned()));
        self
    }

    /// Set a queue's configuration.
    pub fn put_configuration(&mut self, queue: QueueId, configuration: QueueConfiguration) -> &mut Self {
        self.configurations.insert(queue, configuration);
        self
    }

    /// Set a queue's roster.
    pub fn put_roster<I, S>(&mut self, queue: QueueId, emails: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rosters
            .insert(queue, emails.into_iter().map(Into::into).collect());
        self
    }

    /// Set a queue's groups without touching the roster.
    pub fn put_groups(&mut self, queue: QueueId, groups: Vec<Vec<String>>) -> &mut Self {
        self.groups.insert(queue, groups);
        self
    }

    /// Set one weekday's half-hour grid.
    pub fn put_schedule(&mut self, queue: QueueId, day: DayOfWeek, grid: HalfHourGrid) -> &mut Self {
        self.schedules.insert((queue, day), grid);
        self
    }

    /// Set the same half-hour grid on every weekday.
    pub fn put_weekly_schedule(&mut self, queue: QueueId, grid: &HalfHourGrid) -> &mut Self {
        for day in DayOfWeek::all() {
            self.schedules.insert((queue, day), grid.clone());
        }
        self
    }

    /// Set one weekday's appointment descriptor.
    pub fn put_appointment_schedule(&mut self, schedule: AppointmentSchedule) -> &mut Self {
        self.appointment_schedules
            .insert((schedule.queue, schedule.day), schedule);
        self
    }

    /// Insert an entry row as is.
    pub fn put_entry(&mut self, entry: QueueEntry) -> &mut Self {
        self.entries.insert(entry.id, entry);
        self
    }

    /// Insert an appointment row as is.
    pub fn put_appointment(&mut self, slot: AppointmentSlot) -> &mut Self {
        self.appointments.insert(slot.id, slot);
        self
    }

    /// Every entry of `queue`, active or not, by id.
    #[must_use]
    pub fn entries(&self, queue: QueueId) -> Vec<QueueEntry> {
        self.entries
            .values()
            .filter(|e| e.queue == queue)
            .cloned()
            .collect()
    }

    /// Every appointment row of `queue`, by id.
    #[must_use]
    pub fn appointments(&self, queue: QueueId) -> Vec<AppointmentSlot> {
        self.appointments
            .values()
            .filter(|a| a.queue == queue)
            .cloned()
            .collect()
    }

    /// One appointment row.
    #[must_use]
    pub fn appointment(&self, id: AppointmentId) -> Option<&AppointmentSlot> {
        self.appointments.get(&id)
    }

    /// One entry row.
    #[must_use]
    pub fn entry(&self, id: EntryId) -> Option<&QueueEntry> {
        self.entries.get(&id)
    }

    /// Unread messages of `queue`.
    #[must_use]
    pub fn messages(&self, queue: QueueId) -> Vec<Message> {
        self.messages
            .values()
            .filter(|m| m.queue == queue)
            .cloned()
            .collect()
    }

    /// Appointment descriptor of one weekday.
    #[must_use]
    pub fn appointment_schedule(&self, queue: QueueId, day: DayOfWeek) -> Option<&AppointmentSchedule> {
        self.appointment_schedules.get(&(queue, day))
    }

    fn roster_of(&mut self, queue: QueueId) -> &mut BTreeSet<String> {
        self.rosters.entry(queue).or_default()
    }
}

/// Transactional in-memory [`Storage`].
///
/// Cloning is cheap; clones share the committed tables.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStorage {
    committed: Arc<Mutex<Tables>>,
    fail_next_commit: Arc<AtomicBool>,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
}

impl InMemoryStorage {
    /// Empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Modify the committed tables directly, outside any transaction.
    pub async fn seed(&self, f: impl FnOnce(&mut Tables)) {
        let mut tables = self.committed.lock().await;
        f(&mut tables);
    }

    /// Copy of the committed tables.
    pub async fn snapshot(&self) -> Tables {
        self.committed.lock().await.clone()
    }

    /// Make the next commit fail with a serialization failure.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of successful commits so far.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of rollbacks so far.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

impl Storage for InMemoryStorage {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> StoreResult<InMemoryTransaction> {
        let guard = Arc::clone(&self.committed).lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            working,
            storage: self.clone(),
        })
    }
}

/// An open in-memory transaction.
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    storage: InMemoryStorage,
}

impl std::fmt::Debug for InMemoryTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransaction").finish_non_exhaustive()
    }
}

impl Transaction for InMemoryTransaction {
    async fn commit(self) -> StoreResult<()> {
        let Self {
            mut guard,
            working,
            storage,
        } = self;
        if storage.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::SerializationFailure(
                "could not serialize access due to concurrent update".into(),
            ));
        }
        *guard = working;
        storage.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.storage.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn removed(entry: QueueEntry) -> StoreResult<RemovedQueueEntry> {
    RemovedQueueEntry::try_from(entry).map_err(|e| StoreError::Integrity(e.to_string()))
}

impl QueueStore for InMemoryTransaction {
    async fn get_queue(&mut self, id: QueueId) -> StoreResult<Option<Queue>> {
        Ok(self.working.queues.get(&id).cloned())
    }
}

impl AdminStore for InMemoryTransaction {
    async fn is_course_admin(&mut self, course: CourseId, email: &str) -> StoreResult<bool> {
        Ok(self.working.admins.contains(&(course, email.to_owned())))
    }
}

impl ConfigurationStore for InMemoryTransaction {
    async fn get_configuration(&mut self, queue: QueueId) -> StoreResult<QueueConfiguration> {
        Ok(self
            .working
            .configurations
            .get(&queue)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_configuration(
        &mut self,
        queue: QueueId,
        configuration: &QueueConfiguration,
    ) -> StoreResult<()> {
        self.working
            .configurations
            .insert(queue, configuration.clone());
        Ok(())
    }
}

impl RosterStore for InMemoryTransaction {
    async fn in_roster(&mut self, queue: QueueId, email: &str) -> StoreResult<bool> {
        Ok(self
            .working
            .rosters
            .get(&queue)
            .is_some_and(|roster| roster.contains(email)))
    }

    async fn get_roster(&mut self, queue: QueueId) -> StoreResult<Vec<String>> {
        Ok(self
            .working
            .rosters
            .get(&queue)
            .map(|roster| roster.iter().cloned().collect())
            .unwrap_or_default())
    }
}

impl GroupStore for InMemoryTransaction {
    async fn get_groups(&mut self, queue: QueueId) -> StoreResult<Vec<Vec<String>>> {
        Ok(self.working.groups.get(&queue).cloned().unwrap_or_default())
    }

    async fn replace_groups(&mut self, queue: QueueId, groups: &[Vec<String>]) -> StoreResult<()> {
        self.working.groups.insert(queue, groups.to_vec());
        let roster = self.working.roster_of(queue);
        roster.clear();
        roster.extend(groups.iter().flatten().cloned());
        Ok(())
    }

    async fn teammates(&mut self, queue: QueueId, email: &str) -> StoreResult<Vec<String>> {
        let mates: BTreeSet<String> = self
            .working
            .groups
            .get(&queue)
            .into_iter()
            .flatten()
            .filter(|group| group.iter().any(|member| member == email))
            .flatten()
            .filter(|member| *member != email)
            .cloned()
            .collect();
        Ok(mates.into_iter().collect())
    }
}

impl ScheduleStore for InMemoryTransaction {
    async fn get_schedules(&mut self, queue: QueueId) -> StoreResult<Vec<QueueSchedule>> {
        Ok(DayOfWeek::all()
            .filter_map(|day| {
                self.working
                    .schedules
                    .get(&(queue, day))
                    .map(|grid| QueueSchedule {
                        day,
                        schedule: grid.clone(),
                    })
            })
            .collect())
    }

    async fn get_schedule(&mut self, queue: QueueId, day: DayOfWeek) -> StoreResult<Option<QueueSchedule>> {
        Ok(self
            .working
            .schedules
            .get(&(queue, day))
            .map(|grid| QueueSchedule {
                day,
                schedule: grid.clone(),
            }))
    }

    async fn replace_schedules(&mut self, queue: QueueId, schedules: &[QueueSchedule]) -> StoreResult<()> {
        for schedule in schedules {
            self.working
                .schedules
                .insert((queue, schedule.day), schedule.schedule.clone());
        }
        Ok(())
    }
}

impl EntryStore for InMemoryTransaction {
    async fn get_entry(&mut self, queue: QueueId, id: EntryId) -> StoreResult<Option<QueueEntry>> {
        Ok(self
            .working
            .entries
            .get(&id)
            .filter(|e| e.queue == queue)
            .cloned())
    }

    async fn active_entries(&mut self, queue: QueueId) -> StoreResult<Vec<QueueEntry>> {
        let mut active: Vec<QueueEntry> = self
            .working
            .entries
            .values()
            .filter(|e| e.queue == queue && e.active)
            .cloned()
            .collect();
        active.sort_by(queue_order);
        Ok(active)
    }

    async fn active_entries_for(&mut self, queue: QueueId, email: &str) -> StoreResult<Vec<QueueEntry>> {
        Ok(self
            .working
            .entries
            .values()
            .filter(|e| e.queue == queue && e.active && e.email == email)
            .cloned()
            .collect())
    }

    async fn any_active_among(&mut self, queue: QueueId, emails: &[String]) -> StoreResult<bool> {
        Ok(self
            .working
            .entries
            .values()
            .any(|e| e.queue == queue && e.active && emails.contains(&e.email)))
    }

    async fn helped_since(&mut self, queue: QueueId, emails: &[String], since: EntryId) -> StoreResult<bool> {
        Ok(self.working.entries.range(since..).any(|(_, e)| {
            e.queue == queue
                && !e.active
                && e.helped
                && emails.contains(&e.email)
                && e.removed_by.as_deref() != Some(e.email.as_str())
        }))
    }

    async fn insert_entry(&mut self, entry: NewQueueEntry) -> StoreResult<QueueEntry> {
        let duplicate = self
            .working
            .entries
            .values()
            .any(|e| e.queue == entry.queue && e.active && e.email == entry.email);
        if duplicate {
            return Err(StoreError::Integrity(
                "you already have an entry in this queue".into(),
            ));
        }
        let entry = entry.into_entry();
        self.working.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn update_entry_details(
        &mut self,
        queue: QueueId,
        id: EntryId,
        details: &EntryDetails,
    ) -> StoreResult<Option<QueueEntry>> {
        Ok(self
            .working
            .entries
            .get_mut(&id)
            .filter(|e| e.queue == queue && e.active)
            .map(|e| {
                e.details = details.clone();
                e.clone()
            }))
    }

    async fn remove_entry(
        &mut self,
        queue: QueueId,
        id: EntryId,
        remover: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RemovedQueueEntry>> {
        let Some(entry) = self
            .working
            .entries
            .get_mut(&id)
            .filter(|e| e.queue == queue && e.active)
        else {
            return Ok(None);
        };
        entry.active = false;
        entry.pinned = false;
        entry.helped = true;
        entry.removed_by = Some(remover.to_owned());
        entry.removed_at = Some(at);
        removed(entry.clone()).map(Some)
    }

    async fn pin_entry(&mut self, queue: QueueId, id: EntryId) -> StoreResult<Option<QueueEntry>> {
        let Some(email) = self
            .working
            .entries
            .get(&id)
            .filter(|e| e.queue == queue)
            .map(|e| e.email.clone())
        else {
            return Ok(None);
        };
        let duplicate = self
            .working
            .entries
            .values()
            .any(|e| e.queue == queue && e.active && e.email == email && e.id != id);
        if duplicate {
            return Err(StoreError::Integrity(
                "that student already has another entry in the queue".into(),
            ));
        }

        Ok(self.working.entries.get_mut(&id).map(|e| {
            e.active = true;
            e.pinned = true;
            e.helped = false;
            e.removed_by = None;
            e.removed_at = None;
            e.clone()
        }))
    }

    async fn set_helped(&mut self, queue: QueueId, id: EntryId, helped: bool) -> StoreResult<Option<QueueEntry>> {
        Ok(self
            .working
            .entries
            .get_mut(&id)
            .filter(|e| e.queue == queue)
            .map(|e| {
                e.helped = helped;
                e.clone()
            }))
    }

    async fn clear_entries(&mut self, queue: QueueId, remover: &str, at: DateTime<Utc>) -> StoreResult<u64> {
        let mut cleared = 0;
        for entry in self
            .working
            .entries
            .values_mut()
            .filter(|e| e.queue == queue && e.active)
        {
            entry.active = false;
            entry.pinned = false;
            entry.helped = false;
            entry.removed_by = Some(remover.to_owned());
            entry.removed_at = Some(at);
            cleared += 1;
        }
        Ok(cleared)
    }

    async fn stack(&mut self, queue: QueueId, limit: usize) -> StoreResult<Vec<RemovedQueueEntry>> {
        let mut stack: Vec<QueueEntry> = self
            .working
            .entries
            .values()
            .filter(|e| e.queue == queue && e.is_removed())
            .cloned()
            .collect();
        stack.sort_by(stack_order);
        stack.into_iter().take(limit).map(removed).collect()
    }
}

impl AnnouncementStore for InMemoryTransaction {
    async fn list_announcements(&mut self, queue: QueueId) -> StoreResult<Vec<Announcement>> {
        Ok(self
            .working
            .announcements
            .values()
            .filter(|a| a.queue == queue)
            .cloned()
            .collect())
    }

    async fn insert_announcement(&mut self, announcement: &Announcement) -> StoreResult<()> {
        self.working
            .announcements
            .insert(announcement.id, announcement.clone());
        Ok(())
    }

    async fn delete_announcement(&mut self, queue: QueueId, id: AnnouncementId) -> StoreResult<bool> {
        let owned = self
            .working
            .announcements
            .get(&id)
            .is_some_and(|a| a.queue == queue);
        if owned {
            self.working.announcements.remove(&id);
        }
        Ok(owned)
    }
}

impl MessageStore for InMemoryTransaction {
    async fn insert_message(&mut self, message: &Message) -> StoreResult<()> {
        self.working.messages.insert(message.id, message.clone());
        Ok(())
    }

    async fn take_message(&mut self, queue: QueueId, receiver: &str) -> StoreResult<Option<Message>> {
        let id = self
            .working
            .messages
            .values()
            .find(|m| m.queue == queue && m.receiver == receiver)
            .map(|m| m.id);
        Ok(id.and_then(|id| self.working.messages.remove(&id)))
    }
}

impl AppointmentScheduleStore for InMemoryTransaction {
    async fn get_appointment_schedules(&mut self, queue: QueueId) -> StoreResult<Vec<AppointmentSchedule>> {
        Ok(DayOfWeek::all()
            .filter_map(|day| self.working.appointment_schedules.get(&(queue, day)).cloned())
            .collect())
    }

    async fn get_appointment_schedule(
        &mut self,
        queue: QueueId,
        day: DayOfWeek,
    ) -> StoreResult<Option<AppointmentSchedule>> {
        Ok(self.working.appointment_schedules.get(&(queue, day)).cloned())
    }

    async fn update_appointment_schedule(&mut self, schedule: &AppointmentSchedule) -> StoreResult<()> {
        self.working
            .appointment_schedules
            .insert((schedule.queue, schedule.day), schedule.clone());
        Ok(())
    }
}

impl InMemoryTransaction {
    fn appointment_mut(&mut self, queue: QueueId, id: AppointmentId) -> Option<&mut AppointmentSlot> {
        self.working
            .appointments
            .get_mut(&id)
            .filter(|a| a.queue == queue)
    }
}

impl AppointmentStore for InMemoryTransaction {
    async fn get_appointment(&mut self, queue: QueueId, id: AppointmentId) -> StoreResult<Option<AppointmentSlot>> {
        Ok(self.appointment_mut(queue, id).cloned())
    }

    async fn appointments_between(
        &mut self,
        queue: QueueId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<AppointmentSlot>> {
        let mut rows: Vec<AppointmentSlot> = self
            .working
            .appointments
            .values()
            .filter(|a| a.queue == queue && a.scheduled_time >= from && a.scheduled_time < to)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn appointments_at(
        &mut self,
        queue: QueueId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        timeslot: usize,
    ) -> StoreResult<Vec<AppointmentSlot>> {
        Ok(self
            .working
            .appointments
            .values()
            .filter(|a| {
                a.queue == queue
                    && a.timeslot == timeslot
                    && a.scheduled_time >= from
                    && a.scheduled_time < to
            })
            .cloned()
            .collect())
    }

    async fn appointments_for_students(
        &mut self,
        queue: QueueId,
        students: &[String],
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<AppointmentSlot>> {
        Ok(self
            .working
            .appointments
            .values()
            .filter(|a| {
                a.queue == queue
                    && a.scheduled_time >= since
                    && a.student_email.as_ref().is_some_and(|s| students.contains(s))
            })
            .cloned()
            .collect())
    }

    async fn insert_appointment(&mut self, slot: NewAppointmentSlot) -> StoreResult<AppointmentSlot> {
        let slot = slot.into_slot();
        self.working.appointments.insert(slot.id, slot.clone());
        Ok(slot)
    }

    async fn attach_student(
        &mut self,
        queue: QueueId,
        id: AppointmentId,
        email: &str,
        name: &str,
        details: &AppointmentDetails,
    ) -> StoreResult<Option<AppointmentSlot>> {
        Ok(self
            .appointment_mut(queue, id)
            .filter(|a| a.student_email.is_none())
            .map(|a| {
                a.student_email = Some(email.to_owned());
                a.name = Some(name.to_owned());
                a.description = Some(details.description.clone());
                a.location = Some(details.location.clone());
                a.map_x = Some(details.map_x);
                a.map_y = Some(details.map_y);
                a.clone()
            }))
    }

    async fn attach_staff(&mut self, queue: QueueId, id: AppointmentId, email: &str) -> StoreResult<Option<AppointmentSlot>> {
        Ok(self
            .appointment_mut(queue, id)
            .filter(|a| a.staff_email.is_none())
            .map(|a| {
                a.staff_email = Some(email.to_owned());
                a.clone()
            }))
    }

    async fn detach_student(&mut self, queue: QueueId, id: AppointmentId) -> StoreResult<Option<AppointmentSlot>> {
        Ok(self
            .appointment_mut(queue, id)
            .filter(|a| a.student_email.is_some() && a.staff_email.is_some())
            .map(|a| {
                *a = a.without_student();
                a.clone()
            }))
    }

    async fn detach_staff(&mut self, queue: QueueId, id: AppointmentId) -> StoreResult<Option<AppointmentSlot>> {
        Ok(self
            .appointment_mut(queue, id)
            .filter(|a| a.student_email.is_some() && a.staff_email.is_some())
            .map(|a| {
                a.staff_email = None;
                a.clone()
            }))
    }

    async fn delete_appointment(&mut self, queue: QueueId, id: AppointmentId) -> StoreResult<bool> {
        if self.appointment_mut(queue, id).is_none() {
            return Ok(false);
        }
        Ok(self.working.appointments.remove(&id).is_some())
    }

    async fn update_appointment_details(
        &mut self,
        queue: QueueId,
        id: AppointmentId,
        details: &AppointmentDetails,
    ) -> StoreResult<Option<AppointmentSlot>> {
        Ok(self
            .appointment_mut(queue, id)
            .filter(|a| a.student_email.is_some())
            .map(|a| {
                a.description = Some(details.description.clone());
                a.location = Some(details.location.clone());
                a.map_x = Some(details.map_x);
                a.map_y = Some(details.map_y);
                a.clone()
            }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let storage = InMemoryStorage::new();
        let queue = fixtures::queue();
        storage.seed(|t| {
            t.put_queue(queue.clone());
        })
        .await;

        let mut tx = storage.begin().await.unwrap();
        tx.insert_entry(fixtures::new_entry(&queue, "a@example.edu", fixtures::now()))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert!(storage.snapshot().await.entries(queue.id).is_empty());
        assert_eq!(storage.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_commit_applies_writes() {
        let storage = InMemoryStorage::new();
        let queue = fixtures::queue();

        let mut tx = storage.begin().await.unwrap();
        tx.insert_entry(fixtures::new_entry(&queue, "a@example.edu", fixtures::now()))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(storage.snapshot().await.entries(queue.id).len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_active_entry_is_integrity_error() {
        let storage = InMemoryStorage::new();
        let queue = fixtures::queue();

        let mut tx = storage.begin().await.unwrap();
        tx.insert_entry(fixtures::new_entry(&queue, "a@example.edu", fixtures::now()))
            .await
            .unwrap();
        let second = tx
            .insert_entry(fixtures::new_entry(&queue, "a@example.edu", fixtures::now()))
            .await;
        assert!(matches!(second, Err(StoreError::Integrity(_))));
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_old_state() {
        let storage = InMemoryStorage::new();
        let queue = fixtures::queue();
        storage.fail_next_commit();

        let mut tx = storage.begin().await.unwrap();
        tx.insert_entry(fixtures::new_entry(&queue, "a@example.edu", fixtures::now()))
            .await
            .unwrap();
        assert!(tx.commit().await.is_err());
        assert!(storage.snapshot().await.entries(queue.id).is_empty());
    }

    #[tokio::test]
    async fn test_groups_define_roster() {
        let storage = InMemoryStorage::new();
        let queue = fixtures::queue();

        let mut tx = storage.begin().await.unwrap();
        tx.replace_groups(
            queue.id,
            &[
                vec!["a@x.edu".into(), "b@x.edu".into()],
                vec!["c@x.edu".into()],
            ],
        )
        .await
        .unwrap();

        assert_eq!(
            tx.get_roster(queue.id).await.unwrap(),
            vec!["a@x.edu", "b@x.edu", "c@x.edu"]
        );
        assert_eq!(tx.teammates(queue.id, "a@x.edu").await.unwrap(), vec!["b@x.edu"]);
        assert!(tx.teammates(queue.id, "c@x.edu").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_take_message_pops_oldest() {
        let storage = InMemoryStorage::new();
        let queue = fixtures::queue();
        let mut tx = storage.begin().await.unwrap();
        for (n, content) in [(1, "first"), (2, "second")] {
            tx.insert_message(&Message {
                id: MessageId::from_uuid(uuid::Uuid::from_u128(n)),
                queue: queue.id,
                sender: "ta@x.edu".into(),
                receiver: "a@x.edu".into(),
                content: content.into(),
                created_at: fixtures::now(),
            })
            .await
            .unwrap();
        }

        let first = tx.take_message(queue.id, "a@x.edu").await.unwrap().unwrap();
        assert_eq!(first.content, "first");
        let second = tx.take_message(queue.id, "a@x.edu").await.unwrap().unwrap();
        assert_eq!(second.content, "second");
        assert!(tx.take_message(queue.id, "a@x.edu").await.unwrap().is_none());
    }
}
