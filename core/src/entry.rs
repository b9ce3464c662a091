//! Live wait-list entries.
//!
//! An entry is created active, may be pinned or have its helped flag
//! corrected, and is never deleted: removal turns it into a
//! [`RemovedQueueEntry`] that stays on the queue's stack.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::QueueError;
use crate::ids::{EntryId, QueueId};
use crate::queue::QueueConfiguration;

/// Longest accepted description or location.
pub const MAX_FIELD_LENGTH: usize = 1000;

/// Priority tier of an entry. Higher tiers are served first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    /// Already helped today.
    #[default]
    Normal,
    /// First visit of the day.
    Boosted,
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Normal => 0,
            Priority::Boosted => 1,
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Boosted),
            other => Err(format!("priority must be 0 or 1, got {other}")),
        }
    }
}

/// Student-editable fields of an entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryDetails {
    /// What the student needs help with.
    pub description: String,
    /// Where the student is sitting.
    #[serde(default)]
    pub location: String,
    /// Horizontal position on the room map, 0 to 1.
    #[serde(default)]
    pub map_x: f32,
    /// Vertical position on the room map, 0 to 1.
    #[serde(default)]
    pub map_y: f32,
}

impl EntryDetails {
    /// Check required fields and lengths.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Validation`] naming the first bad field.
    pub fn validate(&self, require_location: bool) -> Result<(), QueueError> {
        if self.description.trim().is_empty() {
            return Err(QueueError::validation("description is required"));
        }
        if require_location && self.location.trim().is_empty() {
            return Err(QueueError::validation("location is required"));
        }
        if self.description.len() > MAX_FIELD_LENGTH || self.location.len() > MAX_FIELD_LENGTH {
            return Err(QueueError::validation(format!(
                "description and location are limited to {MAX_FIELD_LENGTH} characters"
            )));
        }
        if !(0.0..=1.0).contains(&self.map_x) || !(0.0..=1.0).contains(&self.map_y) {
            return Err(QueueError::validation("map coordinates must be between 0 and 1"));
        }
        Ok(())
    }
}

/// A wait-list entry, active or removed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Time-ordered id.
    pub id: EntryId,
    /// Owning queue.
    pub queue: QueueId,
    /// Requester email.
    pub email: String,
    /// Requester display name.
    pub name: String,
    /// Editable fields.
    #[serde(flatten)]
    pub details: EntryDetails,
    /// Priority tier.
    pub priority: Priority,
    /// Pinned entries sort before everything else.
    pub pinned: bool,
    /// Whether the entry is still waiting.
    pub active: bool,
    /// Whether staff actually helped the student.
    pub helped: bool,
    /// Who removed the entry.
    pub removed_by: Option<String>,
    /// When the entry was removed.
    pub removed_at: Option<DateTime<Utc>>,
    /// Creation instant, recovered from the id.
    #[serde(rename = "id_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Whether the entry has been taken off the queue.
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        !self.active
    }

    /// What non-admins see of someone else's entry.
    #[must_use]
    pub fn anonymized(&self) -> AnonymousEntry {
        AnonymousEntry {
            id: self.id,
            queue: self.queue,
            priority: self.priority,
            pinned: self.pinned,
            created_at: self.created_at,
        }
    }
}

/// A removed entry. Construction checks the removal metadata is present.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RemovedQueueEntry(QueueEntry);

impl RemovedQueueEntry {
    /// The underlying entry.
    #[must_use]
    pub const fn entry(&self) -> &QueueEntry {
        &self.0
    }

    /// Who removed it.
    #[must_use]
    pub fn removed_by(&self) -> &str {
        self.0.removed_by.as_deref().unwrap_or_default()
    }

    /// When it was removed.
    #[must_use]
    pub fn removed_at(&self) -> DateTime<Utc> {
        self.0.removed_at.unwrap_or(self.0.created_at)
    }

    /// Unwrap into the plain entry.
    #[must_use]
    pub fn into_entry(self) -> QueueEntry {
        self.0
    }
}

impl TryFrom<QueueEntry> for RemovedQueueEntry {
    type Error = QueueError;

    fn try_from(entry: QueueEntry) -> Result<Self, Self::Error> {
        if entry.active || entry.removed_by.is_none() || entry.removed_at.is_none() {
            return Err(QueueError::Internal(format!(
                "entry {} is not a removed entry",
                entry.id
            )));
        }
        Ok(Self(entry))
    }
}

/// An entry stripped of everything that identifies the requester.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymousEntry {
    /// Entry id.
    pub id: EntryId,
    /// Owning queue.
    pub queue: QueueId,
    /// Priority tier.
    pub priority: Priority,
    /// Pinned flag.
    pub pinned: bool,
    /// Creation instant.
    #[serde(rename = "id_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// An entry as shown to one viewer: in full or anonymized.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntryView {
    /// Admins, and the entry's owner.
    Full(QueueEntry),
    /// Everybody else.
    Anonymous(AnonymousEntry),
}

/// Values for a new active entry.
#[derive(Clone, Debug, PartialEq)]
pub struct NewQueueEntry {
    /// Pre-generated id.
    pub id: EntryId,
    /// Owning queue.
    pub queue: QueueId,
    /// Requester email.
    pub email: String,
    /// Requester display name.
    pub name: String,
    /// Editable fields.
    pub details: EntryDetails,
    /// Computed priority.
    pub priority: Priority,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

impl NewQueueEntry {
    /// The row as it looks right after insertion.
    #[must_use]
    pub fn into_entry(self) -> QueueEntry {
        QueueEntry {
            id: self.id,
            queue: self.queue,
            email: self.email,
            name: self.name,
            details: self.details,
            priority: self.priority,
            pinned: false,
            active: true,
            helped: false,
            removed_by: None,
            removed_at: None,
            created_at: self.created_at,
        }
    }
}

/// Serving order: pinned first, then higher priority, then oldest.
#[must_use]
pub fn queue_order(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    b.pinned
        .cmp(&a.pinned)
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| a.id.cmp(&b.id))
}

/// Stack order: most recently removed first, ties broken by newest id.
#[must_use]
pub fn stack_order(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    b.removed_at
        .cmp(&a.removed_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// Priority for a new entry.
///
/// `requester_helped_today` and `teammate_helped_today` report whether the
/// requester (or, respectively, one of their teammates) has a helped entry
/// created since local midnight that they did not remove themselves.
#[must_use]
pub const fn priority_for(
    config: &QueueConfiguration,
    requester_helped_today: bool,
    teammate_helped_today: bool,
) -> Priority {
    if !config.prioritize_new || requester_helped_today {
        return Priority::Normal;
    }
    if !config.prevent_groups_boost {
        return Priority::Boosted;
    }
    if teammate_helped_today {
        Priority::Normal
    } else {
        Priority::Boosted
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn entry(n: u128, pinned: bool, priority: Priority) -> QueueEntry {
        NewQueueEntry {
            id: EntryId::from_uuid(Uuid::from_u128(n)),
            queue: QueueId::from_uuid(Uuid::nil()),
            email: format!("student{n}@example.edu"),
            name: format!("Student {n}"),
            details: EntryDetails {
                description: "help".into(),
                ..EntryDetails::default()
            },
            priority,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
        .into_entry()
        .with_pinned(pinned)
    }

    impl QueueEntry {
        fn with_pinned(mut self, pinned: bool) -> Self {
            self.pinned = pinned;
            self
        }
    }

    #[test]
    fn pinned_then_priority_then_insertion_order() {
        let mut entries = vec![
            entry(1, false, Priority::Boosted),
            entry(2, false, Priority::Normal),
            entry(3, true, Priority::Normal),
            entry(4, false, Priority::Boosted),
        ];
        entries.sort_by(queue_order);

        let order: Vec<u128> = entries.iter().map(|e| e.id.as_uuid().as_u128()).collect();
        assert_eq!(order, vec![3, 1, 4, 2]);
    }

    #[test]
    fn priority_rule_table() {
        let mut config = QueueConfiguration::default();
        assert_eq!(priority_for(&config, false, false), Priority::Normal);

        config.prioritize_new = true;
        assert_eq!(priority_for(&config, false, true), Priority::Boosted);
        assert_eq!(priority_for(&config, true, false), Priority::Normal);

        config.prevent_groups_boost = true;
        assert_eq!(priority_for(&config, false, true), Priority::Normal);
        assert_eq!(priority_for(&config, false, false), Priority::Boosted);
    }

    #[test]
    fn removed_entry_requires_metadata() {
        let active = entry(1, false, Priority::Normal);
        assert!(RemovedQueueEntry::try_from(active.clone()).is_err());

        let mut removed = active;
        removed.active = false;
        removed.removed_by = Some("ta@example.edu".into());
        removed.removed_at = Some(Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap());
        let removed = RemovedQueueEntry::try_from(removed).unwrap();
        assert_eq!(removed.removed_by(), "ta@example.edu");
    }

    #[test]
    fn details_validation() {
        let mut details = EntryDetails {
            description: "  ".into(),
            ..EntryDetails::default()
        };
        assert!(details.validate(false).is_err());

        details.description = "segfault in part 2".into();
        assert!(details.validate(false).is_ok());
        assert!(details.validate(true).is_err());

        details.location = "table 4".into();
        details.map_x = 1.5;
        assert!(details.validate(true).is_err());
    }

    #[test]
    fn anonymized_view_serializes_without_identity() {
        let json = serde_json::to_value(entry(7, true, Priority::Boosted).anonymized()).unwrap();
        assert!(json.get("email").is_none());
        assert_eq!(json["priority"], 1);
        assert_eq!(json["pinned"], true);
    }

    proptest! {
        #[test]
        fn sorted_queue_respects_tiers(flags in prop::collection::vec((any::<bool>(), any::<bool>()), 0..40)) {
            let mut entries: Vec<QueueEntry> = flags
                .iter()
                .enumerate()
                .map(|(i, (pinned, boosted))| {
                    let priority = if *boosted { Priority::Boosted } else { Priority::Normal };
                    entry(i as u128 + 1, *pinned, priority)
                })
                .collect();
            entries.sort_by(queue_order);

            for pair in entries.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(a.pinned >= b.pinned);
                if a.pinned == b.pinned {
                    prop_assert!(a.priority >= b.priority);
                    if a.priority == b.priority {
                        prop_assert!(a.id < b.id);
                    }
                }
            }
        }
    }
}
