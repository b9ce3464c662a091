//! Events pushed to WebSocket clients.
//!
//! On the wire every event is a JSON object `{"e": NAME, "d": payload}`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::QueueError;

/// Every event a client may receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventName {
    /// An entry joined the queue.
    EntryCreate,
    /// An entry changed.
    EntryUpdate,
    /// An entry left the queue.
    EntryRemove,
    /// The receiver's entry was pinned back onto the queue.
    EntryPinned,
    /// An entry left the stack (it was pinned back).
    StackRemove,
    /// The receiver's entry was marked as not helped.
    NotHelped,
    /// Every active entry was removed.
    QueueClear,
    /// An announcement was posted.
    AnnouncementCreate,
    /// An announcement was taken down.
    AnnouncementDelete,
    /// Queue settings changed; clients should refetch.
    Refresh,
    /// Staff sent the receiver a message.
    MessageCreate,
    /// An appointment was booked or claimed.
    AppointmentCreate,
    /// An appointment changed.
    AppointmentUpdate,
    /// An appointment was cancelled or unclaimed.
    AppointmentRemove,
    /// Application-level heartbeat.
    Ping,
}

impl EventName {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EntryCreate => "ENTRY_CREATE",
            Self::EntryUpdate => "ENTRY_UPDATE",
            Self::EntryRemove => "ENTRY_REMOVE",
            Self::EntryPinned => "ENTRY_PINNED",
            Self::StackRemove => "STACK_REMOVE",
            Self::NotHelped => "NOT_HELPED",
            Self::QueueClear => "QUEUE_CLEAR",
            Self::AnnouncementCreate => "ANNOUNCEMENT_CREATE",
            Self::AnnouncementDelete => "ANNOUNCEMENT_DELETE",
            Self::Refresh => "REFRESH",
            Self::MessageCreate => "MESSAGE_CREATE",
            Self::AppointmentCreate => "APPOINTMENT_CREATE",
            Self::AppointmentUpdate => "APPOINTMENT_UPDATE",
            Self::AppointmentRemove => "APPOINTMENT_REMOVE",
            Self::Ping => "PING",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event with its serialized payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name.
    #[serde(rename = "e")]
    pub name: EventName,
    /// Payload, `null` when the event carries none.
    #[serde(rename = "d")]
    pub data: serde_json::Value,
}

impl Event {
    /// Event carrying `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Internal`] if the payload cannot be serialized.
    pub fn new<T: Serialize + ?Sized>(name: EventName, payload: &T) -> Result<Self, QueueError> {
        Ok(Self {
            name,
            data: serde_json::to_value(payload)?,
        })
    }

    /// Event without a payload.
    #[must_use]
    pub const fn bare(name: EventName) -> Self {
        Self {
            name,
            data: serde_json::Value::Null,
        }
    }

    /// The JSON text frame for this event.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; a `Value` payload never fails in practice.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
