//! Storage collaborator contract.
//!
//! Storage is split into narrow capability traits. Every operation bounds
//! its transaction type by exactly the traits it touches, so a test double
//! only has to provide what the operation under test reads and writes.
//!
//! All methods run inside a transaction handle obtained from
//! [`Storage::begin`]. Writes that change who holds a row (`attach_*`,
//! `detach_*`, `remove_entry`) are single "update where predicate, return
//! the row" statements: they return `None` instead of overwriting when the
//! predicate no longer holds.

use chrono::{DateTime, Utc};
use std::future::Future;

use crate::appointment::{AppointmentDetails, AppointmentSlot, NewAppointmentSlot};
use crate::entry::{EntryDetails, NewQueueEntry, QueueEntry, RemovedQueueEntry};
use crate::error::StoreError;
use crate::ids::{AnnouncementId, AppointmentId, CourseId, EntryId, QueueId};
use crate::queue::{Announcement, Message, Queue, QueueConfiguration};
use crate::schedule::{AppointmentSchedule, DayOfWeek, QueueSchedule};

/// Result alias for storage calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Opens transactions.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Transaction handle.
    type Tx: Transaction;

    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if no transaction could be opened.
    fn begin(&self) -> impl Future<Output = StoreResult<Self::Tx>> + Send;
}

/// Ends a transaction.
pub trait Transaction: Send + 'static {
    /// Make every write durable.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the commit failed; nothing was applied.
    fn commit(self) -> impl Future<Output = StoreResult<()>> + Send;

    /// Discard every write.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the rollback could not be confirmed.
    fn rollback(self) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Queue lookup.
pub trait QueueStore: Send {
    /// Load a queue.
    fn get_queue(&mut self, id: QueueId) -> impl Future<Output = StoreResult<Option<Queue>>> + Send;
}

/// Course admin membership.
pub trait AdminStore: Send {
    /// Whether `email` administers `course`.
    fn is_course_admin(
        &mut self,
        course: CourseId,
        email: &str,
    ) -> impl Future<Output = StoreResult<bool>> + Send;
}

/// Queue-wide switches.
pub trait ConfigurationStore: Send {
    /// Current configuration; defaults when none was stored.
    fn get_configuration(
        &mut self,
        queue: QueueId,
    ) -> impl Future<Output = StoreResult<QueueConfiguration>> + Send;

    /// Replace the configuration.
    fn update_configuration(
        &mut self,
        queue: QueueId,
        configuration: &QueueConfiguration,
    ) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Students registered for a queue.
pub trait RosterStore: Send {
    /// Whether `email` is on the roster.
    fn in_roster(
        &mut self,
        queue: QueueId,
        email: &str,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Every rostered email, sorted.
    fn get_roster(&mut self, queue: QueueId) -> impl Future<Output = StoreResult<Vec<String>>> + Send;
}

/// Student groups of a queue.
pub trait GroupStore: Send {
    /// Every group as a list of emails.
    fn get_groups(
        &mut self,
        queue: QueueId,
    ) -> impl Future<Output = StoreResult<Vec<Vec<String>>>> + Send;

    /// Replace all groups and set the roster to the union of their members.
    fn replace_groups(
        &mut self,
        queue: QueueId,
        groups: &[Vec<String>],
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Members sharing a group with `email`, excluding `email`.
    fn teammates(
        &mut self,
        queue: QueueId,
        email: &str,
    ) -> impl Future<Output = StoreResult<Vec<String>>> + Send;
}

/// Weekly open/closed grids.
pub trait ScheduleStore: Send {
    /// All stored weekday grids, ordered by day.
    fn get_schedules(
        &mut self,
        queue: QueueId,
    ) -> impl Future<Output = StoreResult<Vec<QueueSchedule>>> + Send;

    /// Grid of one weekday.
    fn get_schedule(
        &mut self,
        queue: QueueId,
        day: DayOfWeek,
    ) -> impl Future<Output = StoreResult<Option<QueueSchedule>>> + Send;

    /// Replace the grids of the given weekdays.
    fn replace_schedules(
        &mut self,
        queue: QueueId,
        schedules: &[QueueSchedule],
    ) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Wait-list entries.
pub trait EntryStore: Send {
    /// Load an entry, active or removed.
    fn get_entry(
        &mut self,
        queue: QueueId,
        id: EntryId,
    ) -> impl Future<Output = StoreResult<Option<QueueEntry>>> + Send;

    /// Active entries in serving order.
    fn active_entries(
        &mut self,
        queue: QueueId,
    ) -> impl Future<Output = StoreResult<Vec<QueueEntry>>> + Send;

    /// Active entries of one requester.
    fn active_entries_for(
        &mut self,
        queue: QueueId,
        email: &str,
    ) -> impl Future<Output = StoreResult<Vec<QueueEntry>>> + Send;

    /// Whether any of `emails` has an active entry.
    fn any_active_among(
        &mut self,
        queue: QueueId,
        emails: &[String],
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Whether any of `emails` has a helped entry with id at least `since`
    /// that was removed by someone other than its owner.
    fn helped_since(
        &mut self,
        queue: QueueId,
        emails: &[String],
        since: EntryId,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Insert a new active entry.
    fn insert_entry(
        &mut self,
        entry: NewQueueEntry,
    ) -> impl Future<Output = StoreResult<QueueEntry>> + Send;

    /// Replace the editable fields of an active entry.
    fn update_entry_details(
        &mut self,
        queue: QueueId,
        id: EntryId,
        details: &EntryDetails,
    ) -> impl Future<Output = StoreResult<Option<QueueEntry>>> + Send;

    /// Deactivate an active entry: stamp remover and time, set helped,
    /// clear pinned. `None` if the entry is not active.
    fn remove_entry(
        &mut self,
        queue: QueueId,
        id: EntryId,
        remover: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Option<RemovedQueueEntry>>> + Send;

    /// Make an entry active and pinned, clearing removal metadata and helped.
    fn pin_entry(
        &mut self,
        queue: QueueId,
        id: EntryId,
    ) -> impl Future<Output = StoreResult<Option<QueueEntry>>> + Send;

    /// Set the helped flag only.
    fn set_helped(
        &mut self,
        queue: QueueId,
        id: EntryId,
        helped: bool,
    ) -> impl Future<Output = StoreResult<Option<QueueEntry>>> + Send;

    /// Deactivate every active entry as not helped. Returns how many.
    fn clear_entries(
        &mut self,
        queue: QueueId,
        remover: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Removed entries, most recent first.
    fn stack(
        &mut self,
        queue: QueueId,
        limit: usize,
    ) -> impl Future<Output = StoreResult<Vec<RemovedQueueEntry>>> + Send;
}

/// Announcements.
pub trait AnnouncementStore: Send {
    /// Announcements, oldest first.
    fn list_announcements(
        &mut self,
        queue: QueueId,
    ) -> impl Future<Output = StoreResult<Vec<Announcement>>> + Send;

    /// Store an announcement.
    fn insert_announcement(
        &mut self,
        announcement: &Announcement,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Delete an announcement. `false` if it did not exist.
    fn delete_announcement(
        &mut self,
        queue: QueueId,
        id: AnnouncementId,
    ) -> impl Future<Output = StoreResult<bool>> + Send;
}

/// Staff-to-student messages.
pub trait MessageStore: Send {
    /// Store a message.
    fn insert_message(&mut self, message: &Message) -> impl Future<Output = StoreResult<()>> + Send;

    /// Delete and return the oldest message for `receiver`.
    fn take_message(
        &mut self,
        queue: QueueId,
        receiver: &str,
    ) -> impl Future<Output = StoreResult<Option<Message>>> + Send;
}

/// Weekly appointment descriptors.
pub trait AppointmentScheduleStore: Send {
    /// All seven descriptors, ordered by day.
    fn get_appointment_schedules(
        &mut self,
        queue: QueueId,
    ) -> impl Future<Output = StoreResult<Vec<AppointmentSchedule>>> + Send;

    /// Descriptor of one weekday.
    fn get_appointment_schedule(
        &mut self,
        queue: QueueId,
        day: DayOfWeek,
    ) -> impl Future<Output = StoreResult<Option<AppointmentSchedule>>> + Send;

    /// Replace the descriptor of `schedule.day`.
    fn update_appointment_schedule(
        &mut self,
        schedule: &AppointmentSchedule,
    ) -> impl Future<Output = StoreResult<()>> + Send;
}

/// The sparse slot table.
pub trait AppointmentStore: Send {
    /// Load a row.
    fn get_appointment(
        &mut self,
        queue: QueueId,
        id: AppointmentId,
    ) -> impl Future<Output = StoreResult<Option<AppointmentSlot>>> + Send;

    /// Rows scheduled in `[from, to)`, by time then id.
    fn appointments_between(
        &mut self,
        queue: QueueId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Vec<AppointmentSlot>>> + Send;

    /// Rows at `timeslot` scheduled in `[from, to)`, by id.
    fn appointments_at(
        &mut self,
        queue: QueueId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        timeslot: usize,
    ) -> impl Future<Output = StoreResult<Vec<AppointmentSlot>>> + Send;

    /// Rows booked by any of `students` scheduled at or after `since`.
    fn appointments_for_students(
        &mut self,
        queue: QueueId,
        students: &[String],
        since: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Vec<AppointmentSlot>>> + Send;

    /// Insert a row held by exactly one party.
    fn insert_appointment(
        &mut self,
        slot: NewAppointmentSlot,
    ) -> impl Future<Output = StoreResult<AppointmentSlot>> + Send;

    /// Book a row that has no student yet.
    fn attach_student(
        &mut self,
        queue: QueueId,
        id: AppointmentId,
        email: &str,
        name: &str,
        details: &AppointmentDetails,
    ) -> impl Future<Output = StoreResult<Option<AppointmentSlot>>> + Send;

    /// Claim a row that has no staff yet.
    fn attach_staff(
        &mut self,
        queue: QueueId,
        id: AppointmentId,
        email: &str,
    ) -> impl Future<Output = StoreResult<Option<AppointmentSlot>>> + Send;

    /// Clear the student and their fields from a row that staff still holds.
    fn detach_student(
        &mut self,
        queue: QueueId,
        id: AppointmentId,
    ) -> impl Future<Output = StoreResult<Option<AppointmentSlot>>> + Send;

    /// Clear staff from a row that a student still holds.
    fn detach_staff(
        &mut self,
        queue: QueueId,
        id: AppointmentId,
    ) -> impl Future<Output = StoreResult<Option<AppointmentSlot>>> + Send;

    /// Delete a row. `false` if it did not exist.
    fn delete_appointment(
        &mut self,
        queue: QueueId,
        id: AppointmentId,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Replace the student fields of a booked row.
    fn update_appointment_details(
        &mut self,
        queue: QueueId,
        id: AppointmentId,
        details: &AppointmentDetails,
    ) -> impl Future<Output = StoreResult<Option<AppointmentSlot>>> + Send;
}

/// Every capability at once; what the HTTP layer asks of a transaction.
pub trait FullStore:
    Transaction
    + QueueStore
    + AdminStore
    + ConfigurationStore
    + RosterStore
    + GroupStore
    + ScheduleStore
    + EntryStore
    + AnnouncementStore
    + MessageStore
    + AppointmentScheduleStore
    + AppointmentStore
{
}

impl<T> FullStore for T where
    T: Transaction
        + QueueStore
        + AdminStore
        + ConfigurationStore
        + RosterStore
        + GroupStore
        + ScheduleStore
        + EntryStore
        + AnnouncementStore
        + MessageStore
        + AppointmentScheduleStore
        + AppointmentStore
{
}
