//! Which events a change produces, and on which topics.
//!
//! Every mutation stages its events through one of these functions so the
//! payload each audience sees is decided in one place:
//!
//! | Audience          | Entries                 | Appointments                  |
//! |-------------------|-------------------------|-------------------------------|
//! | admin             | full rows               | full rows                     |
//! | non-privileged    | anonymized rows         | anonymized booked rows        |
//! | personal (owner)  | full rows               | full rows without staff email |
//!
//! Owners receive `*_UPDATE` for their own row when others receive
//! `*_CREATE`, since they already hold the anonymized copy from the
//! non-privileged topic and need it replaced.

use office_hours_core::QueueError;
use office_hours_core::appointment::AppointmentSlot;
use office_hours_core::entry::{QueueEntry, RemovedQueueEntry};
use office_hours_core::event::{Event, EventName};
use office_hours_core::ids::{AnnouncementId, QueueId};
use office_hours_core::queue::{Announcement, Message};
use office_hours_core::topic::Topic;

use crate::outbox::Outbox;

type FanoutResult = Result<(), QueueError>;

/// A new entry joined the queue.
pub fn entry_created(outbox: &mut Outbox, entry: &QueueEntry) -> FanoutResult {
    let queue = entry.queue;
    outbox.push(Topic::admin(queue), Event::new(EventName::EntryCreate, entry)?);
    outbox.push(
        Topic::non_privileged(queue),
        Event::new(EventName::EntryCreate, &entry.anonymized())?,
    );
    outbox.push(
        Topic::personal(queue, &entry.email),
        Event::new(EventName::EntryUpdate, entry)?,
    );
    Ok(())
}

/// An active entry changed.
pub fn entry_updated(outbox: &mut Outbox, entry: &QueueEntry) -> FanoutResult {
    let queue = entry.queue;
    outbox.push(Topic::admin(queue), Event::new(EventName::EntryUpdate, entry)?);
    outbox.push(
        Topic::non_privileged(queue),
        Event::new(EventName::EntryUpdate, &entry.anonymized())?,
    );
    outbox.push(
        Topic::personal(queue, &entry.email),
        Event::new(EventName::EntryUpdate, entry)?,
    );
    Ok(())
}

/// An entry left the queue.
pub fn entry_removed(outbox: &mut Outbox, removed: &RemovedQueueEntry) -> FanoutResult {
    let entry = removed.entry();
    let queue = entry.queue;
    outbox.push(Topic::admin(queue), Event::new(EventName::EntryRemove, removed)?);
    outbox.push(
        Topic::non_privileged(queue),
        Event::new(EventName::EntryRemove, &entry.anonymized())?,
    );
    outbox.push(
        Topic::personal(queue, &entry.email),
        Event::new(EventName::EntryRemove, removed)?,
    );
    Ok(())
}

/// An entry was pinned. `from_stack` tells whether it was removed before.
pub fn entry_pinned(outbox: &mut Outbox, entry: &QueueEntry, from_stack: bool) -> FanoutResult {
    let queue = entry.queue;
    if from_stack {
        outbox.push(Topic::admin(queue), Event::new(EventName::StackRemove, &entry.id)?);
        entry_created(outbox, entry)?;
    } else {
        entry_updated(outbox, entry)?;
    }
    outbox.push(
        Topic::personal(queue, &entry.email),
        Event::new(EventName::EntryPinned, entry)?,
    );
    Ok(())
}

/// The helped flag of an entry changed.
pub fn helped_changed(outbox: &mut Outbox, entry: &QueueEntry) -> FanoutResult {
    let queue = entry.queue;
    outbox.push(Topic::admin(queue), Event::new(EventName::EntryUpdate, entry)?);
    let name = if entry.helped {
        EventName::EntryUpdate
    } else {
        EventName::NotHelped
    };
    outbox.push(Topic::personal(queue, &entry.email), Event::new(name, entry)?);
    Ok(())
}

/// Every active entry was removed by `remover`.
pub fn queue_cleared(outbox: &mut Outbox, queue: QueueId, remover: &str) -> FanoutResult {
    outbox.push(Topic::admin(queue), Event::new(EventName::QueueClear, remover)?);
    outbox.push(
        Topic::non_privileged(queue),
        Event::new(EventName::QueueClear, &serde_json::Value::Null)?,
    );
    Ok(())
}

/// An announcement was posted.
pub fn announcement_created(outbox: &mut Outbox, announcement: &Announcement) -> FanoutResult {
    outbox.push(
        Topic::generic(announcement.queue),
        Event::new(EventName::AnnouncementCreate, announcement)?,
    );
    Ok(())
}

/// An announcement was taken down.
pub fn announcement_deleted(outbox: &mut Outbox, queue: QueueId, id: AnnouncementId) -> FanoutResult {
    outbox.push(
        Topic::generic(queue),
        Event::new(EventName::AnnouncementDelete, &id)?,
    );
    Ok(())
}

/// Settings or schedules changed; every client refetches.
pub fn refresh(outbox: &mut Outbox, queue: QueueId) {
    outbox.push(Topic::generic(queue), Event::bare(EventName::Refresh));
}

/// Staff sent a message.
pub fn message_created(outbox: &mut Outbox, message: &Message) -> FanoutResult {
    outbox.push(
        Topic::personal(message.queue, &message.receiver),
        Event::new(EventName::MessageCreate, message)?,
    );
    Ok(())
}

/// A student booked `slot`. `attached` tells whether the row already
/// existed as a staff-only claim.
pub fn appointment_booked(outbox: &mut Outbox, slot: &AppointmentSlot, attached: bool) -> FanoutResult {
    let queue = slot.queue;
    let admin_event = if attached {
        EventName::AppointmentUpdate
    } else {
        EventName::AppointmentCreate
    };
    outbox.push(Topic::admin(queue), Event::new(admin_event, slot)?);
    outbox.push(
        Topic::non_privileged(queue),
        Event::new(EventName::AppointmentCreate, &slot.anonymized())?,
    );
    if let Some(student) = &slot.student_email {
        outbox.push(
            Topic::personal(queue, student),
            Event::new(EventName::AppointmentUpdate, &slot.without_staff())?,
        );
    }
    Ok(())
}

/// Staff claimed `slot`. Students see nothing: staff never show in their view.
pub fn appointment_claimed(outbox: &mut Outbox, slot: &AppointmentSlot, attached: bool) -> FanoutResult {
    let name = if attached {
        EventName::AppointmentUpdate
    } else {
        EventName::AppointmentCreate
    };
    outbox.push(Topic::admin(slot.queue), Event::new(name, slot)?);
    Ok(())
}

/// Staff left `previous`; `remaining` is the row if a student still holds it.
pub fn appointment_unclaimed(
    outbox: &mut Outbox,
    previous: &AppointmentSlot,
    remaining: Option<&AppointmentSlot>,
) -> FanoutResult {
    let event = match remaining {
        Some(slot) => Event::new(EventName::AppointmentUpdate, slot)?,
        None => Event::new(EventName::AppointmentRemove, previous)?,
    };
    outbox.push(Topic::admin(previous.queue), event);
    Ok(())
}

/// The student left `previous`; `remaining` is the row if staff still hold it.
pub fn appointment_cancelled(
    outbox: &mut Outbox,
    previous: &AppointmentSlot,
    remaining: Option<&AppointmentSlot>,
) -> FanoutResult {
    let queue = previous.queue;
    let admin_event = match remaining {
        Some(slot) => Event::new(EventName::AppointmentUpdate, slot)?,
        None => Event::new(EventName::AppointmentRemove, previous)?,
    };
    outbox.push(Topic::admin(queue), admin_event);
    outbox.push(
        Topic::non_privileged(queue),
        Event::new(EventName::AppointmentRemove, &previous.anonymized())?,
    );
    if let Some(student) = &previous.student_email {
        outbox.push(
            Topic::personal(queue, student),
            Event::new(EventName::AppointmentRemove, &previous.without_staff())?,
        );
    }
    Ok(())
}

/// The student edited their booked row in place.
pub fn appointment_updated(outbox: &mut Outbox, slot: &AppointmentSlot) -> FanoutResult {
    let queue = slot.queue;
    outbox.push(Topic::admin(queue), Event::new(EventName::AppointmentUpdate, slot)?);
    outbox.push(
        Topic::non_privileged(queue),
        Event::new(EventName::AppointmentUpdate, &slot.anonymized())?,
    );
    if let Some(student) = &slot.student_email {
        outbox.push(
            Topic::personal(queue, student),
            Event::new(EventName::AppointmentUpdate, &slot.without_staff())?,
        );
    }
    Ok(())
}
