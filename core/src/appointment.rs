//! Appointment slots and the per-timeslot allocation rules.
//!
//! The slot table is sparse. A row exists only while at least one party
//! holds it, so each row is in one of three states and a timeslot without
//! rows is the fourth:
//!
//! ```text
//!   state          signup        claim         cancel        unclaim
//!   EMPTY          STUDENT_ONLY  STAFF_ONLY    -             -
//!   STUDENT_ONLY   -             BOTH          EMPTY         -
//!   STAFF_ONLY     BOTH          -             -             EMPTY
//!   BOTH           -             -             STAFF_ONLY    STUDENT_ONLY
//! ```
//!
//! [`SlotState::attach`] and [`SlotState::detach`] are total over every
//! state and party. A detach that would leave no party deletes the row, so
//! a row with both identities empty can never be written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entry::MAX_FIELD_LENGTH;
use crate::error::QueueError;
use crate::ids::{AppointmentId, QueueId};

/// One side of an appointment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Party {
    /// The student who booked.
    Student,
    /// The staff member who claimed.
    Staff,
}

impl Party {
    /// The other side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Student => Self::Staff,
            Self::Staff => Self::Student,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Student => "student",
            Self::Staff => "staff",
        })
    }
}

/// Occupancy of a single slot row, with `Empty` standing for "no row".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// No row.
    Empty,
    /// Booked by a student, not yet claimed.
    StudentOnly,
    /// Claimed by staff, not yet booked.
    StaffOnly,
    /// Booked and claimed.
    Both,
}

impl SlotState {
    /// All four states.
    pub const ALL: [Self; 4] = [Self::Empty, Self::StudentOnly, Self::StaffOnly, Self::Both];

    /// State from which identities are present.
    #[must_use]
    pub const fn of(student: bool, staff: bool) -> Self {
        match (student, staff) {
            (false, false) => Self::Empty,
            (true, false) => Self::StudentOnly,
            (false, true) => Self::StaffOnly,
            (true, true) => Self::Both,
        }
    }

    /// Whether `party` holds the slot.
    #[must_use]
    pub const fn has(self, party: Party) -> bool {
        match party {
            Party::Student => matches!(self, Self::StudentOnly | Self::Both),
            Party::Staff => matches!(self, Self::StaffOnly | Self::Both),
        }
    }

    /// State after `party` joins, or `None` if they already hold it.
    #[must_use]
    pub const fn attach(self, party: Party) -> Option<Self> {
        if self.has(party) {
            return None;
        }
        let (student, staff) = (self.has(Party::Student), self.has(Party::Staff));
        Some(match party {
            Party::Student => Self::of(true, staff),
            Party::Staff => Self::of(student, true),
        })
    }

    /// State after `party` leaves, or `None` if they do not hold it.
    ///
    /// `Some(Empty)` means the row must be deleted.
    #[must_use]
    pub const fn detach(self, party: Party) -> Option<Self> {
        if !self.has(party) {
            return None;
        }
        let (student, staff) = (self.has(Party::Student), self.has(Party::Staff));
        Some(match party {
            Party::Student => Self::of(false, staff),
            Party::Staff => Self::of(student, false),
        })
    }
}

/// Student-supplied fields of an appointment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppointmentDetails {
    /// What the student wants to discuss.
    pub description: String,
    /// Where (or how) to meet.
    pub location: String,
    /// Horizontal position on the room map, 0 to 1.
    #[serde(default)]
    pub map_x: f32,
    /// Vertical position on the room map, 0 to 1.
    #[serde(default)]
    pub map_y: f32,
}

impl AppointmentDetails {
    /// Check required fields and lengths.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Validation`] naming the first bad field.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.description.trim().is_empty() {
            return Err(QueueError::validation("description is required"));
        }
        if self.location.trim().is_empty() {
            return Err(QueueError::validation("location is required"));
        }
        if self.description.len() > MAX_FIELD_LENGTH || self.location.len() > MAX_FIELD_LENGTH {
            return Err(QueueError::validation(format!(
                "description and location are limited to {MAX_FIELD_LENGTH} characters"
            )));
        }
        Ok(())
    }
}

/// Body of a reschedule or edit request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppointmentUpdate {
    /// Target timeslot on the appointment's weekday.
    pub timeslot: usize,
    /// Replacement fields.
    #[serde(flatten)]
    pub details: AppointmentDetails,
}

/// A row of the slot table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppointmentSlot {
    /// Row id.
    pub id: AppointmentId,
    /// Owning queue.
    pub queue: QueueId,
    /// Claiming staff member.
    pub staff_email: Option<String>,
    /// Booking student.
    pub student_email: Option<String>,
    /// Wall-clock start.
    pub scheduled_time: DateTime<Utc>,
    /// Index into the day's capacity grid.
    pub timeslot: usize,
    /// Length in minutes.
    pub duration: u32,
    /// Student display name.
    pub name: Option<String>,
    /// Student description.
    pub description: Option<String>,
    /// Meeting location.
    pub location: Option<String>,
    /// Horizontal map position.
    pub map_x: Option<f32>,
    /// Vertical map position.
    pub map_y: Option<f32>,
}

impl AppointmentSlot {
    /// Occupancy of this row.
    #[must_use]
    pub const fn state(&self) -> SlotState {
        SlotState::of(self.student_email.is_some(), self.staff_email.is_some())
    }

    /// Whether `party` holds this row.
    #[must_use]
    pub const fn held_by(&self, party: Party) -> bool {
        self.state().has(party)
    }

    /// When the appointment ends.
    #[must_use]
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_time + chrono::TimeDelta::minutes(i64::from(self.duration))
    }

    /// What non-admins see of someone else's appointment.
    #[must_use]
    pub fn anonymized(&self) -> AnonymousAppointment {
        AnonymousAppointment {
            id: self.id,
            queue: self.queue,
            scheduled_time: self.scheduled_time,
            timeslot: self.timeslot,
            duration: self.duration,
        }
    }

    /// The student's own view: everything except who claimed it.
    #[must_use]
    pub fn without_staff(&self) -> Self {
        Self {
            staff_email: None,
            ..self.clone()
        }
    }

    /// Copy with the student and their fields removed.
    #[must_use]
    pub fn without_student(&self) -> Self {
        Self {
            student_email: None,
            name: None,
            description: None,
            location: None,
            map_x: None,
            map_y: None,
            ..self.clone()
        }
    }
}

/// An appointment stripped of both identities and all descriptive fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymousAppointment {
    /// Row id.
    pub id: AppointmentId,
    /// Owning queue.
    pub queue: QueueId,
    /// Wall-clock start.
    pub scheduled_time: DateTime<Utc>,
    /// Timeslot index.
    pub timeslot: usize,
    /// Length in minutes.
    pub duration: u32,
}

/// An appointment as shown to one viewer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AppointmentView {
    /// Admins, and the student who booked it.
    Full(AppointmentSlot),
    /// Everybody else.
    Anonymous(AnonymousAppointment),
}

/// Values for a freshly inserted row. Exactly one party is set.
#[derive(Clone, Debug, PartialEq)]
pub struct NewAppointmentSlot {
    /// Pre-generated id.
    pub id: AppointmentId,
    /// Owning queue.
    pub queue: QueueId,
    /// Wall-clock start.
    pub scheduled_time: DateTime<Utc>,
    /// Timeslot index.
    pub timeslot: usize,
    /// Length in minutes.
    pub duration: u32,
    /// Who opens the row.
    pub holder: SlotHolder,
}

/// The single party that opens a new row.
#[derive(Clone, Debug, PartialEq)]
pub enum SlotHolder {
    /// A student signup with their fields.
    Student {
        /// Student email.
        email: String,
        /// Student display name.
        name: String,
        /// Student fields.
        details: AppointmentDetails,
    },
    /// A staff claim.
    Staff {
        /// Staff email.
        email: String,
    },
}

impl NewAppointmentSlot {
    /// The row as it looks right after insertion.
    #[must_use]
    pub fn into_slot(self) -> AppointmentSlot {
        let mut slot = AppointmentSlot {
            id: self.id,
            queue: self.queue,
            staff_email: None,
            student_email: None,
            scheduled_time: self.scheduled_time,
            timeslot: self.timeslot,
            duration: self.duration,
            name: None,
            description: None,
            location: None,
            map_x: None,
            map_y: None,
        };
        match self.holder {
            SlotHolder::Student {
                email,
                name,
                details,
            } => {
                slot.student_email = Some(email);
                slot.name = Some(name);
                slot.description = Some(details.description);
                slot.location = Some(details.location);
                slot.map_x = Some(details.map_x);
                slot.map_y = Some(details.map_y);
            }
            SlotHolder::Staff { email } => slot.staff_email = Some(email),
        }
        slot
    }
}

/// Where a party joining a timeslot will land.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Allocation {
    /// Join an existing row held only by the other party.
    Attach(AppointmentId),
    /// Open a new row.
    Insert,
}

/// A timeslot has no room left for another holder of one party.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapacityExhausted {
    /// Side that was turned away.
    pub party: Party,
    /// Capacity digit of the timeslot.
    pub capacity: u8,
    /// Rows already held by that side.
    pub occupied: usize,
}

impl fmt::Display for CapacityExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timeslot is full: {} of {} {} places taken",
            self.occupied, self.capacity, self.party
        )
    }
}

impl From<CapacityExhausted> for QueueError {
    fn from(err: CapacityExhausted) -> Self {
        Self::Conflict(err.to_string())
    }
}

/// Rows at a timeslot already held by `party`.
#[must_use]
pub fn occupied(rows: &[AppointmentSlot], party: Party) -> usize {
    rows.iter().filter(|row| row.held_by(party)).count()
}

/// Capacity left for `party` at a timeslot: `capacity − occupied`.
#[must_use]
pub fn open_capacity(rows: &[AppointmentSlot], party: Party, capacity: u8) -> i64 {
    i64::from(capacity) - i64::try_from(occupied(rows, party)).unwrap_or(i64::MAX)
}

/// Decide where `party` lands among the `rows` of one timeslot.
///
/// The capacity check counts rows already held by `party`. When there is
/// room, a row held only by the other party is preferred over a new row.
///
/// # Errors
///
/// Returns [`CapacityExhausted`] when no place is left for `party`.
pub fn plan_attach(
    rows: &[AppointmentSlot],
    party: Party,
    capacity: u8,
) -> Result<Allocation, CapacityExhausted> {
    if open_capacity(rows, party, capacity) < 1 {
        return Err(CapacityExhausted {
            party,
            capacity,
            occupied: occupied(rows, party),
        });
    }
    Ok(rows
        .iter()
        .find(|row| row.state().attach(party).is_some())
        .map_or(Allocation::Insert, |row| Allocation::Attach(row.id)))
}

/// What removing one party from a row does to the row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Release {
    /// The party was the only holder; delete the row.
    Delete,
    /// The other party stays; clear only this party's fields.
    Detach,
    /// The party does not hold the row; nothing to do.
    AlreadyAbsent,
}

/// Decide how `party` leaves `slot`.
#[must_use]
pub const fn plan_release(slot: &AppointmentSlot, party: Party) -> Release {
    match slot.state().detach(party) {
        None => Release::AlreadyAbsent,
        Some(SlotState::Empty) => Release::Delete,
        Some(_) => Release::Detach,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn row(n: u128, student: bool, staff: bool) -> AppointmentSlot {
        AppointmentSlot {
            id: AppointmentId::from_uuid(Uuid::from_u128(n)),
            queue: QueueId::from_uuid(Uuid::nil()),
            staff_email: staff.then(|| format!("ta{n}@example.edu")),
            student_email: student.then(|| format!("student{n}@example.edu")),
            scheduled_time: Utc.with_ymd_and_hms(2026, 1, 1, 15, 0, 0).unwrap(),
            timeslot: 3,
            duration: 15,
            name: student.then(|| "Student".to_string()),
            description: student.then(|| "question".to_string()),
            location: student.then(|| "zoom".to_string()),
            map_x: None,
            map_y: None,
        }
    }

    #[test]
    fn transitions_are_total_and_never_orphan() {
        for state in SlotState::ALL {
            for party in [Party::Student, Party::Staff] {
                match state.attach(party) {
                    Some(next) => {
                        assert!(!state.has(party));
                        assert!(next.has(party));
                        assert_eq!(next.has(party.opposite()), state.has(party.opposite()));
                    }
                    None => assert!(state.has(party)),
                }
                match state.detach(party) {
                    Some(next) => {
                        assert!(state.has(party));
                        assert!(!next.has(party));
                        assert_eq!(next.has(party.opposite()), state.has(party.opposite()));
                    }
                    None => assert!(!state.has(party)),
                }
            }
        }
    }

    #[test]
    fn signup_prefers_a_staff_only_row() {
        let rows = vec![row(1, true, false), row(2, false, true)];
        assert_eq!(
            plan_attach(&rows, Party::Student, 2),
            Ok(Allocation::Attach(rows[1].id))
        );
    }

    #[test]
    fn claim_prefers_a_student_only_row() {
        let rows = vec![row(1, false, true), row(2, true, false)];
        assert_eq!(
            plan_attach(&rows, Party::Staff, 3),
            Ok(Allocation::Attach(rows[1].id))
        );
    }

    #[test]
    fn full_timeslot_is_rejected() {
        let rows = vec![row(1, true, true), row(2, true, false)];
        let err = plan_attach(&rows, Party::Student, 2).unwrap_err();
        assert_eq!(err.occupied, 2);
        assert_eq!(plan_attach(&rows, Party::Staff, 2), Ok(Allocation::Attach(rows[1].id)));
    }

    #[test]
    fn zero_capacity_admits_nobody() {
        assert!(plan_attach(&[], Party::Student, 0).is_err());
        assert!(plan_attach(&[], Party::Staff, 0).is_err());
    }

    #[test]
    fn release_plans() {
        assert_eq!(plan_release(&row(1, true, false), Party::Student), Release::Delete);
        assert_eq!(plan_release(&row(1, true, true), Party::Student), Release::Detach);
        assert_eq!(plan_release(&row(1, false, true), Party::Student), Release::AlreadyAbsent);
        assert_eq!(plan_release(&row(1, false, true), Party::Staff), Release::Delete);
        assert_eq!(plan_release(&row(1, true, true), Party::Staff), Release::Detach);
    }

    #[test]
    fn without_student_clears_descriptive_fields() {
        let slot = row(1, true, true).without_student();
        assert_eq!(slot.state(), SlotState::StaffOnly);
        assert!(slot.name.is_none() && slot.description.is_none() && slot.location.is_none());
    }

    #[derive(Clone, Debug)]
    enum Op {
        Signup,
        Claim,
        Cancel(usize),
        Unclaim(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Signup),
            Just(Op::Claim),
            (0usize..8).prop_map(Op::Cancel),
            (0usize..8).prop_map(Op::Unclaim),
        ]
    }

    fn apply_attach(rows: &mut Vec<AppointmentSlot>, next_id: &mut u128, party: Party, capacity: u8) {
        match plan_attach(rows, party, capacity) {
            Ok(Allocation::Attach(id)) => {
                let target = rows.iter_mut().find(|r| r.id == id).unwrap();
                match party {
                    Party::Student => target.student_email = Some(format!("s{next_id}")),
                    Party::Staff => target.staff_email = Some(format!("t{next_id}")),
                }
            }
            Ok(Allocation::Insert) => rows.push(row(*next_id, party == Party::Student, party == Party::Staff)),
            Err(_) => {}
        }
        *next_id += 1;
    }

    fn apply_release(rows: &mut Vec<AppointmentSlot>, index: usize, party: Party) {
        if rows.is_empty() {
            return;
        }
        let index = index % rows.len();
        match plan_release(&rows[index], party) {
            Release::Delete => {
                rows.remove(index);
            }
            Release::Detach => {
                rows[index] = match party {
                    Party::Student => rows[index].without_student(),
                    Party::Staff => rows[index].without_staff(),
                };
            }
            Release::AlreadyAbsent => {}
        }
    }

    proptest! {
        #[test]
        fn random_operations_respect_capacity(capacity in 0u8..=9, ops in prop::collection::vec(op(), 0..60)) {
            let mut rows = Vec::new();
            let mut next_id = 1;
            for op in ops {
                match op {
                    Op::Signup => apply_attach(&mut rows, &mut next_id, Party::Student, capacity),
                    Op::Claim => apply_attach(&mut rows, &mut next_id, Party::Staff, capacity),
                    Op::Cancel(i) => apply_release(&mut rows, i, Party::Student),
                    Op::Unclaim(i) => apply_release(&mut rows, i, Party::Staff),
                }
                prop_assert!(occupied(&rows, Party::Student) <= usize::from(capacity));
                prop_assert!(occupied(&rows, Party::Staff) <= usize::from(capacity));
                prop_assert!(rows.iter().all(|r| r.state() != SlotState::Empty));
            }
        }
    }
}
