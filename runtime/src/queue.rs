//! Wait-list operations.
//!
//! Every operation takes the request's open transaction, its outbox and the
//! [`RequestContext`]. Transactions are bounded only by the store traits the
//! operation touches. Events are staged, never published directly.

use office_hours_core::entry::{
    EntryDetails, EntryView, NewQueueEntry, Priority, QueueEntry, RemovedQueueEntry, priority_for,
};
use office_hours_core::error::AdmissionDenied;
use office_hours_core::ids::{AnnouncementId, EntryId, MessageId};
use office_hours_core::queue::{Announcement, Message, QueueConfiguration};
use office_hours_core::schedule::{DayOfWeek, HalfHour, HalfHourGrid, QueueSchedule};
use office_hours_core::store::{
    AnnouncementStore, ConfigurationStore, EntryStore, GroupStore, MessageStore, RosterStore,
    ScheduleStore,
};
use office_hours_core::{QueueError, RequestContext};
use serde::Serialize;
use tracing::{debug, info};

use crate::fanout;
use crate::outbox::Outbox;

/// Stack length returned when the caller does not ask for one.
pub const DEFAULT_STACK_LIMIT: usize = 50;

/// Upper bound on a requested stack length.
pub const MAX_STACK_LIMIT: usize = 1000;

/// Reject `email` if the queue would not admit them right now.
///
/// Admins are always admitted. Otherwise, in order: the current half hour
/// must be open in today's schedule (a day with no schedule is closed),
/// the requester must be on the roster when unregistered students are
/// excluded, and no teammate may hold an active entry when groups are
/// exclusive.
///
/// # Errors
///
/// Returns [`QueueError::Denied`] with the first rule that failed.
pub async fn check_admission<T>(
    tx: &mut T,
    ctx: &RequestContext,
    email: &str,
    config: &QueueConfiguration,
) -> Result<(), QueueError>
where
    T: ScheduleStore + RosterStore + GroupStore + EntryStore,
{
    if ctx.is_admin() {
        return Ok(());
    }
    let queue = ctx.queue.id;

    let half_hour = ctx.calendar.current_half_hour(ctx.now);
    let open = tx
        .get_schedule(queue, ctx.today())
        .await?
        .and_then(|s| s.schedule.at(half_hour))
        .is_some_and(HalfHour::is_open);
    if !open {
        return Err(QueueError::Denied(AdmissionDenied::QueueClosed));
    }

    if config.prevent_unregistered && !tx.in_roster(queue, email).await? {
        return Err(QueueError::Denied(AdmissionDenied::NotInRoster));
    }

    if config.prevent_groups {
        let teammates = tx.teammates(queue, email).await?;
        if !teammates.is_empty() && tx.any_active_among(queue, &teammates).await? {
            return Err(QueueError::Denied(AdmissionDenied::TeammateInQueue));
        }
    }
    Ok(())
}

/// Priority of a new entry for `email`.
///
/// Lookups run only when a rule needs them: the requester's own history
/// when new students are prioritized, and teammates' history only when the
/// requester has not been helped and the group boost rule is on.
///
/// # Errors
///
/// Propagates storage failures.
pub async fn entry_priority<T>(
    tx: &mut T,
    ctx: &RequestContext,
    email: &str,
    config: &QueueConfiguration,
) -> Result<Priority, QueueError>
where
    T: EntryStore + GroupStore,
{
    if !config.prioritize_new {
        return Ok(priority_for(config, false, false));
    }
    let queue = ctx.queue.id;
    let since = EntryId::floor(ctx.day_bounds(ctx.today()).start);

    let requester_helped = tx.helped_since(queue, &[email.to_owned()], since).await?;
    let teammate_helped = if !requester_helped && config.prevent_groups_boost {
        let teammates = tx.teammates(queue, email).await?;
        !teammates.is_empty() && tx.helped_since(queue, &teammates, since).await?
    } else {
        false
    };
    Ok(priority_for(config, requester_helped, teammate_helped))
}

/// Join the queue as the signed-in caller.
///
/// # Errors
///
/// - [`QueueError::Unauthorized`] for anonymous callers
/// - [`QueueError::Validation`] for bad fields
/// - [`QueueError::Conflict`] if the caller already has an active entry
/// - [`QueueError::Denied`] if an admission rule rejects the caller
pub async fn add_entry<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    details: EntryDetails,
) -> Result<QueueEntry, QueueError>
where
    T: ConfigurationStore + ScheduleStore + RosterStore + GroupStore + EntryStore,
{
    let identity = ctx.require_identity()?;
    let queue = ctx.queue.id;
    let config = tx.get_configuration(queue).await?;
    details.validate(config.enable_location_field)?;

    if !tx.active_entries_for(queue, &identity.email).await?.is_empty() {
        return Err(QueueError::conflict("you already have an entry in this queue"));
    }
    check_admission(tx, ctx, &identity.email, &config).await?;
    let priority = entry_priority(tx, ctx, &identity.email, &config).await?;

    let entry = tx
        .insert_entry(NewQueueEntry {
            id: EntryId::from_uuid(ctx.next_id()),
            queue,
            email: identity.email.clone(),
            name: identity.name.clone(),
            details,
            priority,
            created_at: ctx.now,
        })
        .await?;

    fanout::entry_created(outbox, &entry)?;
    info!(queue = %queue, entry = %entry.id, priority = ?entry.priority, "Entry added");
    Ok(entry)
}

/// Replace the description, location and map position of the caller's entry.
///
/// # Errors
///
/// - [`QueueError::NotFound`] if the entry is unknown or no longer active
/// - [`QueueError::Forbidden`] if the entry belongs to someone else
/// - [`QueueError::Validation`] for bad fields
pub async fn update_entry<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    id: EntryId,
    details: EntryDetails,
) -> Result<QueueEntry, QueueError>
where
    T: ConfigurationStore + EntryStore,
{
    let identity = ctx.require_identity()?;
    let queue = ctx.queue.id;
    let entry = tx
        .get_entry(queue, id)
        .await?
        .filter(|e| e.active)
        .ok_or_else(|| QueueError::not_found("entry", id))?;
    if entry.email != identity.email {
        return Err(QueueError::forbidden("you can only edit your own entry"));
    }

    let config = tx.get_configuration(queue).await?;
    details.validate(config.enable_location_field)?;

    let updated = tx
        .update_entry_details(queue, id, &details)
        .await?
        .ok_or_else(|| QueueError::not_found("entry", id))?;
    fanout::entry_updated(outbox, &updated)?;
    debug!(queue = %queue, entry = %id, "Entry updated");
    Ok(updated)
}

/// Take an entry off the queue.
///
/// Admins may remove any entry, students only their own. Removing an entry
/// that is already off the queue succeeds without changing anything and
/// returns `None`.
///
/// # Errors
///
/// - [`QueueError::NotFound`] if no entry has that id
/// - [`QueueError::Forbidden`] if a student targets someone else's entry
pub async fn remove_entry<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    id: EntryId,
) -> Result<Option<RemovedQueueEntry>, QueueError>
where
    T: EntryStore,
{
    let identity = ctx.require_identity()?;
    let queue = ctx.queue.id;
    let entry = tx
        .get_entry(queue, id)
        .await?
        .ok_or_else(|| QueueError::not_found("entry", id))?;
    if !ctx.is_admin() && entry.email != identity.email {
        return Err(QueueError::forbidden("you can only remove your own entry"));
    }
    if entry.is_removed() {
        debug!(queue = %queue, entry = %id, "Entry already removed");
        return Ok(None);
    }

    let Some(removed) = tx.remove_entry(queue, id, &identity.email, ctx.now).await? else {
        return Ok(None);
    };
    fanout::entry_removed(outbox, &removed)?;
    info!(queue = %queue, entry = %id, "Entry removed");
    Ok(Some(removed))
}

/// Put an entry at the front of the queue, reviving it if it was removed.
///
/// # Errors
///
/// - [`QueueError::Forbidden`] for non-admins
/// - [`QueueError::NotFound`] if no entry has that id
/// - [`QueueError::Conflict`] if reviving it would give its owner a second
///   active entry
pub async fn pin_entry<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    id: EntryId,
) -> Result<QueueEntry, QueueError>
where
    T: EntryStore,
{
    ctx.require_admin()?;
    let queue = ctx.queue.id;
    let entry = tx
        .get_entry(queue, id)
        .await?
        .ok_or_else(|| QueueError::not_found("entry", id))?;

    let from_stack = entry.is_removed();
    if from_stack && !tx.active_entries_for(queue, &entry.email).await?.is_empty() {
        return Err(QueueError::conflict(
            "that student already has another entry in the queue",
        ));
    }

    let pinned = tx
        .pin_entry(queue, id)
        .await?
        .ok_or_else(|| QueueError::not_found("entry", id))?;
    fanout::entry_pinned(outbox, &pinned, from_stack)?;
    info!(queue = %queue, entry = %id, from_stack, "Entry pinned");
    Ok(pinned)
}

/// Set whether an entry counts as helped.
///
/// # Errors
///
/// - [`QueueError::Forbidden`] for non-admins
/// - [`QueueError::NotFound`] if no entry has that id
pub async fn set_helped<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    id: EntryId,
    helped: bool,
) -> Result<QueueEntry, QueueError>
where
    T: EntryStore,
{
    ctx.require_admin()?;
    let queue = ctx.queue.id;
    let entry = tx
        .set_helped(queue, id, helped)
        .await?
        .ok_or_else(|| QueueError::not_found("entry", id))?;
    fanout::helped_changed(outbox, &entry)?;
    debug!(queue = %queue, entry = %id, helped, "Helped flag set");
    Ok(entry)
}

/// Remove every active entry as not helped. Returns how many were removed.
///
/// # Errors
///
/// Returns [`QueueError::Forbidden`] for non-admins.
pub async fn clear_entries<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
) -> Result<u64, QueueError>
where
    T: EntryStore,
{
    let identity = ctx.require_admin()?;
    let queue = ctx.queue.id;
    let cleared = tx.clear_entries(queue, &identity.email, ctx.now).await?;
    fanout::queue_cleared(outbox, queue, &identity.email)?;
    info!(queue = %queue, cleared, "Queue cleared");
    Ok(cleared)
}

/// Recently removed entries, most recent first.
///
/// # Errors
///
/// Returns [`QueueError::Forbidden`] for non-admins.
pub async fn stack<T>(
    tx: &mut T,
    ctx: &RequestContext,
    limit: Option<usize>,
) -> Result<Vec<RemovedQueueEntry>, QueueError>
where
    T: EntryStore,
{
    ctx.require_admin()?;
    let limit = limit.unwrap_or(DEFAULT_STACK_LIMIT).clamp(1, MAX_STACK_LIMIT);
    Ok(tx.stack(ctx.queue.id, limit).await?)
}

/// Everything a client renders when it opens a queue.
#[derive(Clone, Debug, Serialize)]
pub struct QueueSnapshot {
    /// Active entries in serving order, anonymized except the caller's own
    /// unless the caller is an admin.
    pub entries: Vec<EntryView>,
    /// Recently removed entries; admins only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<RemovedQueueEntry>>,
    /// Today's half-hour grid, if one is stored.
    pub schedule: Option<HalfHourGrid>,
    /// Index of the current local half hour.
    pub half_hour: usize,
    /// Whether the current half hour is open.
    pub open: bool,
    /// Announcements, oldest first.
    pub announcements: Vec<Announcement>,
    /// Oldest unread message for the caller; reading it consumes it.
    pub message: Option<Message>,
    /// Whether the caller administers the queue.
    pub admin: bool,
    /// Queue settings.
    #[serde(flatten)]
    pub configuration: QueueConfiguration,
}

/// Assemble the [`QueueSnapshot`] for the caller.
///
/// # Errors
///
/// Propagates storage failures.
pub async fn queue_snapshot<T>(tx: &mut T, ctx: &RequestContext) -> Result<QueueSnapshot, QueueError>
where
    T: EntryStore + ScheduleStore + AnnouncementStore + MessageStore + ConfigurationStore,
{
    let queue = ctx.queue.id;
    let admin = ctx.is_admin();
    let caller = ctx.identity.as_ref().map(|i| i.email.as_str());

    let entries = tx
        .active_entries(queue)
        .await?
        .into_iter()
        .map(|entry| {
            if admin || Some(entry.email.as_str()) == caller {
                EntryView::Full(entry)
            } else {
                EntryView::Anonymous(entry.anonymized())
            }
        })
        .collect();

    let stack = if admin {
        Some(tx.stack(queue, DEFAULT_STACK_LIMIT).await?)
    } else {
        None
    };

    let half_hour = ctx.calendar.current_half_hour(ctx.now);
    let schedule = tx.get_schedule(queue, ctx.today()).await?.map(|s| s.schedule);
    let open = schedule
        .as_ref()
        .and_then(|grid| grid.at(half_hour))
        .is_some_and(HalfHour::is_open);

    let message = match caller {
        Some(email) => tx.take_message(queue, email).await?,
        None => None,
    };

    Ok(QueueSnapshot {
        entries,
        stack,
        schedule,
        half_hour,
        open,
        announcements: tx.list_announcements(queue).await?,
        message,
        admin,
        configuration: tx.get_configuration(queue).await?,
    })
}

/// Post an announcement to everyone watching the queue.
///
/// # Errors
///
/// - [`QueueError::Forbidden`] for non-admins
/// - [`QueueError::Validation`] for empty content
pub async fn add_announcement<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    content: String,
) -> Result<Announcement, QueueError>
where
    T: AnnouncementStore,
{
    ctx.require_admin()?;
    if content.trim().is_empty() {
        return Err(QueueError::validation("announcement content is required"));
    }
    let announcement = Announcement {
        id: AnnouncementId::from_uuid(ctx.next_id()),
        queue: ctx.queue.id,
        content,
        created_at: ctx.now,
    };
    tx.insert_announcement(&announcement).await?;
    fanout::announcement_created(outbox, &announcement)?;
    Ok(announcement)
}

/// Take an announcement down.
///
/// # Errors
///
/// - [`QueueError::Forbidden`] for non-admins
/// - [`QueueError::NotFound`] if it does not exist
pub async fn remove_announcement<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    id: AnnouncementId,
) -> Result<(), QueueError>
where
    T: AnnouncementStore,
{
    ctx.require_admin()?;
    if !tx.delete_announcement(ctx.queue.id, id).await? {
        return Err(QueueError::not_found("announcement", id));
    }
    fanout::announcement_deleted(outbox, ctx.queue.id, id)
}

/// Weekly half-hour grids, one per stored weekday.
///
/// # Errors
///
/// Propagates storage failures.
pub async fn schedules<T>(tx: &mut T, ctx: &RequestContext) -> Result<Vec<QueueSchedule>, QueueError>
where
    T: ScheduleStore,
{
    Ok(tx.get_schedules(ctx.queue.id).await?)
}

/// Replace all seven weekday grids, Sunday first.
///
/// # Errors
///
/// - [`QueueError::Forbidden`] for non-admins
/// - [`QueueError::Validation`] unless exactly seven grids are given
pub async fn replace_schedules<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    grids: Vec<HalfHourGrid>,
) -> Result<Vec<QueueSchedule>, QueueError>
where
    T: ScheduleStore,
{
    ctx.require_admin()?;
    if grids.len() != 7 {
        return Err(QueueError::validation(format!(
            "expected 7 daily schedules, got {}",
            grids.len()
        )));
    }
    let schedules: Vec<QueueSchedule> = DayOfWeek::all()
        .zip(grids)
        .map(|(day, schedule)| QueueSchedule { day, schedule })
        .collect();
    tx.replace_schedules(ctx.queue.id, &schedules).await?;
    fanout::refresh(outbox, ctx.queue.id);
    info!(queue = %ctx.queue.id, "Schedules replaced");
    Ok(schedules)
}

/// Current queue settings.
///
/// # Errors
///
/// Propagates storage failures.
pub async fn configuration<T>(tx: &mut T, ctx: &RequestContext) -> Result<QueueConfiguration, QueueError>
where
    T: ConfigurationStore,
{
    Ok(tx.get_configuration(ctx.queue.id).await?)
}

/// Replace the queue settings.
///
/// # Errors
///
/// Returns [`QueueError::Forbidden`] for non-admins.
pub async fn update_configuration<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    configuration: QueueConfiguration,
) -> Result<QueueConfiguration, QueueError>
where
    T: ConfigurationStore,
{
    ctx.require_admin()?;
    tx.update_configuration(ctx.queue.id, &configuration).await?;
    fanout::refresh(outbox, ctx.queue.id);
    info!(queue = %ctx.queue.id, configuration = ?configuration, "Configuration updated");
    Ok(configuration)
}

/// Send a private message to one student.
///
/// # Errors
///
/// - [`QueueError::Forbidden`] for non-admins
/// - [`QueueError::Validation`] for an empty receiver or content
pub async fn send_message<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    receiver: String,
    content: String,
) -> Result<Message, QueueError>
where
    T: MessageStore,
{
    let identity = ctx.require_admin()?;
    if receiver.trim().is_empty() {
        return Err(QueueError::validation("receiver is required"));
    }
    if content.trim().is_empty() {
        return Err(QueueError::validation("message content is required"));
    }
    let message = Message {
        id: MessageId::from_uuid(ctx.next_id()),
        queue: ctx.queue.id,
        sender: identity.email.clone(),
        receiver,
        content,
        created_at: ctx.now,
    };
    tx.insert_message(&message).await?;
    fanout::message_created(outbox, &message)?;
    Ok(message)
}

/// Rostered emails.
///
/// # Errors
///
/// Returns [`QueueError::Forbidden`] for non-admins.
pub async fn roster<T>(tx: &mut T, ctx: &RequestContext) -> Result<Vec<String>, QueueError>
where
    T: RosterStore,
{
    ctx.require_admin()?;
    Ok(tx.get_roster(ctx.queue.id).await?)
}

/// Student groups.
///
/// # Errors
///
/// Returns [`QueueError::Forbidden`] for non-admins.
pub async fn groups<T>(tx: &mut T, ctx: &RequestContext) -> Result<Vec<Vec<String>>, QueueError>
where
    T: GroupStore,
{
    ctx.require_admin()?;
    Ok(tx.get_groups(ctx.queue.id).await?)
}

/// Replace all groups; the roster becomes the union of their members.
///
/// Emails are trimmed and lowercased, blanks dropped and empty groups
/// skipped.
///
/// # Errors
///
/// Returns [`QueueError::Forbidden`] for non-admins.
pub async fn replace_groups<T>(
    tx: &mut T,
    outbox: &mut Outbox,
    ctx: &RequestContext,
    groups: Vec<Vec<String>>,
) -> Result<Vec<Vec<String>>, QueueError>
where
    T: GroupStore,
{
    ctx.require_admin()?;
    let groups: Vec<Vec<String>> = groups
        .into_iter()
        .map(|group| {
            let mut members: Vec<String> = group
                .into_iter()
                .map(|email| email.trim().to_lowercase())
                .filter(|email| !email.is_empty())
                .collect();
            members.sort();
            members.dedup();
            members
        })
        .filter(|group| !group.is_empty())
        .collect();
    tx.replace_groups(ctx.queue.id, &groups).await?;
    fanout::refresh(outbox, ctx.queue.id);
    info!(queue = %ctx.queue.id, groups = groups.len(), "Groups replaced");
    Ok(groups)
}
