//! Strongly typed identifiers.
//!
//! Every persisted row is keyed by a UUIDv7. Version 7 UUIDs start with a
//! big-endian millisecond timestamp, so comparing two ids compares their
//! creation order. The queue relies on this for FIFO ordering within a
//! priority tier and for "created since the start of today" lookups.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error type for id parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind} id: {value}")]
pub struct ParseIdError {
    kind: &'static str,
    value: String,
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// The underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Instant encoded in the id, if it is a version 7 UUID.
            #[must_use]
            pub fn created_at(&self) -> Option<DateTime<Utc>> {
                let (secs, nanos) = self.0.get_timestamp()?.to_unix();
                Utc.timestamp_opt(i64::try_from(secs).ok()?, nanos).single()
            }

            /// Smallest id that could have been generated at `instant`.
            ///
            /// Every id generated at or after `instant` compares greater than
            /// or equal to the returned value.
            #[must_use]
            pub fn floor(instant: DateTime<Utc>) -> Self {
                let millis = u64::try_from(instant.timestamp_millis()).unwrap_or(0);
                Self(uuid::Builder::from_unix_timestamp_millis(millis, &[0; 10]).into_uuid())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|_| ParseIdError {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id!(
    /// Identifier of a queue.
    QueueId,
    "queue"
);
define_id!(
    /// Identifier of the course a queue belongs to.
    CourseId,
    "course"
);
define_id!(
    /// Identifier of a queue entry. Orders entries by creation time.
    EntryId,
    "entry"
);
define_id!(
    /// Identifier of an appointment slot row.
    AppointmentId,
    "appointment"
);
define_id!(
    /// Identifier of an announcement.
    AnnouncementId,
    "announcement"
);
define_id!(
    /// Identifier of a staff-to-student message.
    MessageId,
    "message"
);
