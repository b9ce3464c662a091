//! Per-weekday schedules and local calendar arithmetic.
//!
//! A queue has two kinds of weekly schedule:
//!
//! - an open/closed grid of 48 half hours per weekday (`'o'`, `'c'`, `'p'`)
//! - an appointment grid per weekday: a slot duration plus one capacity
//!   digit per timeslot
//!
//! All wall-clock math goes through [`Calendar`], which resolves local dates
//! and times in the configured IANA timezone field by field. Instants are
//! never produced by adding fixed offsets to an epoch, so a timeslot keeps
//! its local time across daylight-saving transitions.

use chrono::{
    DateTime, Datelike, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta,
    TimeZone, Timelike, Utc, Weekday,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::ids::QueueId;

/// Number of half hours in a day.
pub const HALF_HOURS_PER_DAY: usize = 48;

/// Minutes in a day, the upper bound for `timeslots * duration`.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Errors from parsing schedule values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Weekday index outside 0..=6.
    #[error("day must be between 0 (Sunday) and 6 (Saturday), got {0}")]
    InvalidDay(u8),
    /// Open/closed grid of the wrong length.
    #[error("schedule must have exactly {HALF_HOURS_PER_DAY} half hours, got {0}")]
    WrongLength(usize),
    /// Character other than `o`, `c` or `p` in an open/closed grid.
    #[error("schedule may only contain 'o', 'c' or 'p', found {0:?}")]
    InvalidHalfHour(char),
    /// Character other than an ASCII digit in a capacity grid.
    #[error("capacity grid may only contain digits, found {0:?}")]
    InvalidCapacity(char),
}

/// Day of the week, numbered from Sunday = 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DayOfWeek(u8);

impl DayOfWeek {
    /// Parse a Sunday-based index.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::InvalidDay`] for values above 6.
    pub const fn new(index: u8) -> Result<Self, ScheduleError> {
        if index < 7 {
            Ok(Self(index))
        } else {
            Err(ScheduleError::InvalidDay(index))
        }
    }

    /// Sunday-based index.
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// All seven days starting with Sunday.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..7).map(Self)
    }
}

impl TryFrom<u8> for DayOfWeek {
    type Error = ScheduleError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DayOfWeek> for u8 {
    fn from(day: DayOfWeek) -> Self {
        day.0
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        // num_days_from_sunday is always < 7
        Self(u8::try_from(day.num_days_from_sunday()).unwrap_or(0))
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open interval `[start, end)` covering one local calendar day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DayBounds {
    /// Local midnight at the start of the day.
    pub start: DateTime<Utc>,
    /// Local midnight at the start of the following day.
    pub end: DateTime<Utc>,
}

impl DayBounds {
    /// Whether `instant` falls inside the day.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Local calendar of a deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Calendar {
    tz: Tz,
}

impl Calendar {
    /// Calendar in the given timezone.
    #[must_use]
    pub const fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// The configured timezone.
    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.tz
    }

    /// Local weekday of `instant`.
    #[must_use]
    pub fn weekday(&self, instant: DateTime<Utc>) -> DayOfWeek {
        instant.with_timezone(&self.tz).weekday().into()
    }

    /// Index (0 to 47) of the local half hour containing `now`.
    #[must_use]
    pub fn current_half_hour(&self, now: DateTime<Utc>) -> usize {
        let local = now.with_timezone(&self.tz);
        ((local.hour() * 60 + local.minute()) / 30) as usize
    }

    /// Bounds of the next-or-current occurrence of `day`.
    ///
    /// When `day` is today the bounds cover today, even if part of it has
    /// passed. Days earlier in the week resolve to next week.
    #[must_use]
    pub fn day_bounds(&self, now: DateTime<Utc>, day: DayOfWeek) -> DayBounds {
        let date = self.occurrence(now, day);
        let next = date.succ_opt().unwrap_or(date);
        DayBounds {
            start: self.local_midnight(date),
            end: self.local_midnight(next),
        }
    }

    /// Wall-clock start of `timeslot` on the next-or-current `day`.
    ///
    /// The local time is `timeslot * duration` minutes after local midnight,
    /// regardless of any offset change earlier that day.
    #[must_use]
    pub fn timeslot_start(
        &self,
        now: DateTime<Utc>,
        day: DayOfWeek,
        timeslot: usize,
        duration_minutes: u32,
    ) -> DateTime<Utc> {
        let date = self.occurrence(now, day);
        let minutes = i64::try_from(timeslot)
            .unwrap_or(i64::MAX)
            .saturating_mul(i64::from(duration_minutes));
        let naive = date
            .and_time(NaiveTime::MIN)
            .checked_add_signed(TimeDelta::try_minutes(minutes).unwrap_or(TimeDelta::MAX))
            .unwrap_or(NaiveDateTime::MAX);
        self.resolve(naive)
    }

    fn occurrence(&self, now: DateTime<Utc>, day: DayOfWeek) -> NaiveDate {
        let today = now.with_timezone(&self.tz).date_naive();
        let current = today.weekday().num_days_from_sunday();
        let ahead = (7 + u32::from(day.index()) - current) % 7;
        today
            .checked_add_days(Days::new(u64::from(ahead)))
            .unwrap_or(today)
    }

    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        self.resolve(date.and_time(NaiveTime::MIN))
    }

    /// Map a local wall-clock time to an instant.
    ///
    /// Ambiguous times (the repeated hour when clocks fall back) take the
    /// earlier instant. Times inside a spring-forward gap move to the first
    /// valid half hour after the gap.
    fn resolve(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        let mut candidate = naive;
        for _ in 0..8 {
            match self.tz.from_local_datetime(&candidate) {
                LocalResult::Single(t) => return t.with_timezone(&Utc),
                LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
                LocalResult::None => match candidate.checked_add_signed(TimeDelta::minutes(30)) {
                    Some(next) => candidate = next,
                    None => break,
                },
            }
        }
        Utc.from_utc_datetime(&naive)
    }
}

/// State of one half hour in the open/closed grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HalfHour {
    /// Anyone may join.
    Open,
    /// Nobody but admins may join.
    Closed,
    /// Open, and shown to students as a prioritized window.
    Prioritized,
}

impl HalfHour {
    const fn from_char(c: char) -> Option<Self> {
        match c {
            'o' => Some(Self::Open),
            'c' => Some(Self::Closed),
            'p' => Some(Self::Prioritized),
            _ => None,
        }
    }

    /// Whether students can join during this half hour.
    #[must_use]
    pub const fn is_open(self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// A validated 48-character open/closed/prioritized grid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HalfHourGrid(String);

impl HalfHourGrid {
    /// Grid with every half hour in the same state.
    #[must_use]
    pub fn uniform(state: HalfHour) -> Self {
        let c = match state {
            HalfHour::Open => 'o',
            HalfHour::Closed => 'c',
            HalfHour::Prioritized => 'p',
        };
        Self(std::iter::repeat_n(c, HALF_HOURS_PER_DAY).collect())
    }

    /// State of the half hour at `index`, or `None` past the end.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<HalfHour> {
        self.0
            .as_bytes()
            .get(index)
            .and_then(|b| HalfHour::from_char(char::from(*b)))
    }

    /// The raw grid.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for HalfHourGrid {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let len = value.chars().count();
        if len != HALF_HOURS_PER_DAY {
            return Err(ScheduleError::WrongLength(len));
        }
        if let Some(bad) = value.chars().find(|c| HalfHour::from_char(*c).is_none()) {
            return Err(ScheduleError::InvalidHalfHour(bad));
        }
        Ok(Self(value))
    }
}

impl From<HalfHourGrid> for String {
    fn from(grid: HalfHourGrid) -> Self {
        grid.0
    }
}

/// Open/closed grid of one weekday of a queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSchedule {
    /// Weekday the grid applies to.
    pub day: DayOfWeek,
    /// The 48 half hours.
    pub schedule: HalfHourGrid,
}

/// A validated capacity grid: one ASCII digit per timeslot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CapacityGrid(String);

impl CapacityGrid {
    /// Concurrent capacity at `timeslot`, or `None` past the end.
    #[must_use]
    pub fn capacity_at(&self, timeslot: usize) -> Option<u8> {
        self.0.as_bytes().get(timeslot).map(|b| b - b'0')
    }

    /// Number of timeslots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the grid has no timeslots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(timeslot, capacity)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.0.bytes().map(|b| b - b'0').enumerate()
    }

    /// The raw grid.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CapacityGrid {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if let Some(bad) = value.chars().find(|c| !c.is_ascii_digit()) {
            return Err(ScheduleError::InvalidCapacity(bad));
        }
        Ok(Self(value))
    }
}

impl TryFrom<&str> for CapacityGrid {
    type Error = ScheduleError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

impl From<CapacityGrid> for String {
    fn from(grid: CapacityGrid) -> Self {
        grid.0
    }
}

/// Appointment descriptor of one weekday of a queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentSchedule {
    /// Queue the schedule belongs to.
    pub queue: QueueId,
    /// Weekday the schedule applies to.
    pub day: DayOfWeek,
    /// Length of each timeslot in minutes.
    pub duration: u32,
    /// Minutes of buffer shown between consecutive appointments.
    pub padding: u32,
    /// Capacity per timeslot.
    pub schedule: CapacityGrid,
}

impl AppointmentSchedule {
    /// Capacity at `timeslot`, or `None` when the index is out of range.
    #[must_use]
    pub fn capacity_at(&self, timeslot: usize) -> Option<u8> {
        self.schedule.capacity_at(timeslot)
    }

    /// Number of timeslots in the day.
    #[must_use]
    pub fn timeslots(&self) -> usize {
        self.schedule.len()
    }

    /// Appointment length as a `TimeDelta`.
    #[must_use]
    pub fn slot_length(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.duration))
    }
}
