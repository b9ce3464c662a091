//! Queues and their queue-wide settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AnnouncementId, CourseId, MessageId, QueueId};

/// What a queue hands out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// A live first-come wait list.
    Ordered,
    /// A grid of bookable timeslots.
    Appointments,
}

/// A queue. Created and edited outside this service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    /// Queue id.
    pub id: QueueId,
    /// Owning course; admins of the course administer the queue.
    pub course: CourseId,
    /// Queue flavour.
    #[serde(rename = "type")]
    pub kind: QueueKind,
    /// Display name.
    pub name: String,
    /// Where office hours take place.
    pub location: String,
    /// Whether the queue is accepting traffic at all.
    pub active: bool,
}

/// Admission and priority switches of a queue.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfiguration {
    /// Show and require the location field on new entries.
    pub enable_location_field: bool,
    /// Only rostered students may join.
    pub prevent_unregistered: bool,
    /// At most one member of a group may be waiting at a time.
    pub prevent_groups: bool,
    /// A teammate's help today also counts against priority.
    pub prevent_groups_boost: bool,
    /// Students not yet helped today jump ahead of those already helped.
    pub prioritize_new: bool,
}

/// Authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Email address; the identity key everywhere.
    pub email: String,
    /// Display name.
    pub name: String,
}

/// Caller's relation to a queue, fixed for the duration of a request or
/// WebSocket connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Course admin of the queue's course.
    Admin,
    /// Everybody else, signed in or not.
    NonPrivileged,
}

impl Role {
    /// Whether the caller administers the queue.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// A notice shown at the top of a queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Announcement id.
    pub id: AnnouncementId,
    /// Queue it is shown on.
    pub queue: QueueId,
    /// Text.
    pub content: String,
    /// When it was posted.
    pub created_at: DateTime<Utc>,
}

/// A private note from staff to one student, shown once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id.
    pub id: MessageId,
    /// Queue it was sent from.
    pub queue: QueueId,
    /// Staff email.
    pub sender: String,
    /// Student email.
    pub receiver: String,
    /// Text.
    pub content: String,
    /// When it was sent.
    pub created_at: DateTime<Utc>,
}
