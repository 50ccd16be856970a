//! Weekly schedule matching.
//!
//! A [`ScheduleMatcher`] holds an ordered list of [`ScheduleEntry`] values
//! loaded once at startup. Every tick the controller hands it the current
//! estimate and grade. It reports at most one entry whose occurrence has just
//! come into its match window. Each weekly occurrence fires once, no matter
//! how many ticks fall inside the window.

use core::fmt;

use heapless::Vec;

use crate::clock::ConfidenceGrade;
use crate::time::{
    LocalZone, SECONDS_PER_DAY, SECONDS_PER_HOUR, SECONDS_PER_MINUTE, Weekday, WallTime,
    week_offset, week_position,
};

pub mod weekly;

pub use weekly::DEFAULT_SCHEDULE;

/// Upper bound on the number of entries a device carries.
pub const MAX_SCHEDULE_ENTRIES: usize = 10;

/// Default half-width of the match window in seconds.
pub const DEFAULT_TOLERANCE_SECS: u16 = 2;

/// One recurring weekly ring time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ScheduleEntry {
    pub day: Weekday,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl ScheduleEntry {
    /// Creates an entry without range checks; [`ScheduleMatcher::new`] validates.
    #[must_use]
    pub const fn new(day: Weekday, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            day,
            hour,
            minute,
            second,
        }
    }

    /// Returns `true` when every field is in range.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.hour < 24 && self.minute < 60 && self.second < 60
    }

    /// Seconds since Sunday midnight.
    #[must_use]
    pub fn week_second(&self) -> i64 {
        i64::from(self.day.index()) * SECONDS_PER_DAY
            + i64::from(self.hour) * SECONDS_PER_HOUR
            + i64::from(self.minute) * SECONDS_PER_MINUTE
            + i64::from(self.second)
    }

    #[must_use]
    pub const fn wall_time(&self) -> WallTime {
        WallTime {
            day: self.day,
            hour: self.hour,
            minute: self.minute,
            second: self.second,
        }
    }

    /// Identity of the occurrence whose window contains `local_secs`.
    ///
    /// The identity is the local epoch second at which that occurrence is due,
    /// so two visits to the same window agree and next week's differs.
    #[must_use]
    pub fn occurrence(&self, local_secs: i64, window: MatchWindow) -> Option<i64> {
        let offset = week_offset(week_position(local_secs), self.week_second());
        (offset.unsigned_abs() <= u64::from(window.tolerance_secs))
            .then(|| local_secs.saturating_sub(offset))
    }
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.wall_time().fmt(f)
    }
}

/// Tolerance used when comparing the estimate against an entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MatchWindow {
    /// Half-width in seconds; zero requires an exact second match.
    pub tolerance_secs: u16,
}

impl MatchWindow {
    pub const EXACT: Self = Self::new(0);

    #[must_use]
    pub const fn new(tolerance_secs: u16) -> Self {
        Self { tolerance_secs }
    }
}

impl Default for MatchWindow {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_SECS)
    }
}

/// Lowest clock grade at which scheduled rings are allowed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum RingPolicy {
    /// Ring only while the clock is trusted.
    TrustedOnly,
    /// Ring while trusted or degraded.
    #[default]
    RefuseUntrusted,
    /// Ring regardless of clock confidence.
    Always,
}

impl RingPolicy {
    #[must_use]
    pub const fn permits(self, grade: ConfidenceGrade) -> bool {
        match self {
            RingPolicy::TrustedOnly => matches!(grade, ConfidenceGrade::Trusted),
            RingPolicy::RefuseUntrusted => !matches!(grade, ConfidenceGrade::Untrusted),
            RingPolicy::Always => true,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            RingPolicy::TrustedOnly => "trusted-only",
            RingPolicy::RefuseUntrusted => "refuse-untrusted",
            RingPolicy::Always => "always",
        }
    }
}

/// Errors raised while loading a schedule.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScheduleError {
    /// Entry at `index` has an hour, minute, or second out of range.
    InvalidEntry { index: usize },
    /// Entries at `first` and `second` name the same weekly time.
    DuplicateEntry { first: usize, second: usize },
    /// More than [`MAX_SCHEDULE_ENTRIES`] entries were supplied.
    TooManyEntries { supplied: usize },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::InvalidEntry { index } => {
                write!(f, "schedule entry {index} is out of range")
            }
            ScheduleError::DuplicateEntry { first, second } => {
                write!(f, "schedule entries {first} and {second} are identical")
            }
            ScheduleError::TooManyEntries { supplied } => write!(
                f,
                "{supplied} schedule entries exceed the limit of {MAX_SCHEDULE_ENTRIES}"
            ),
        }
    }
}

/// Detailed result of one evaluation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MatchOutcome {
    /// Nothing is due.
    Idle,
    /// The entry's occurrence just entered its window and should ring.
    Fire(ScheduleEntry),
    /// The entry is due but the clock grade is below the ring policy.
    Withheld(ScheduleEntry),
}

#[derive(Copy, Clone, Debug)]
struct EntrySlot {
    entry: ScheduleEntry,
    fired: Option<i64>,
    withheld: Option<i64>,
}

/// Edge-triggered matcher over a fixed weekly schedule.
#[derive(Clone, Debug)]
pub struct ScheduleMatcher<const CAPACITY: usize = MAX_SCHEDULE_ENTRIES> {
    slots: Vec<EntrySlot, CAPACITY>,
    window: MatchWindow,
    policy: RingPolicy,
    zone: LocalZone,
}

impl<const CAPACITY: usize> ScheduleMatcher<CAPACITY> {
    /// Loads and validates a schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError`] for out-of-range fields, identical entries, or
    /// more entries than the matcher can hold.
    pub fn new(
        entries: &[ScheduleEntry],
        window: MatchWindow,
        policy: RingPolicy,
        zone: LocalZone,
    ) -> Result<Self, ScheduleError> {
        let mut slots = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            if !entry.is_valid() {
                return Err(ScheduleError::InvalidEntry { index });
            }

            if let Some(first) = entries[..index].iter().position(|other| other == entry) {
                return Err(ScheduleError::DuplicateEntry {
                    first,
                    second: index,
                });
            }

            slots
                .push(EntrySlot {
                    entry: *entry,
                    fired: None,
                    withheld: None,
                })
                .map_err(|_| ScheduleError::TooManyEntries {
                    supplied: entries.len(),
                })?;
        }

        Ok(Self {
            slots,
            window,
            policy,
            zone,
        })
    }

    /// Returns the entry to ring for estimate `unix_secs`, if any.
    pub fn evaluate(&mut self, unix_secs: u64, grade: ConfidenceGrade) -> Option<ScheduleEntry> {
        match self.evaluate_detailed(unix_secs, grade) {
            MatchOutcome::Fire(entry) => Some(entry),
            MatchOutcome::Idle | MatchOutcome::Withheld(_) => None,
        }
    }

    /// Evaluates the schedule and reports why nothing fired.
    ///
    /// Entries are scanned in list order and the first one with an unfired
    /// occurrence in its window wins. Later entries stay unmarked, so they may
    /// still fire on a following tick if their window remains open. A withheld
    /// occurrence is reported once.
    pub fn evaluate_detailed(&mut self, unix_secs: u64, grade: ConfidenceGrade) -> MatchOutcome {
        let local = self.zone.local_seconds(unix_secs);
        let permitted = self.policy.permits(grade);

        for slot in &mut self.slots {
            let Some(occurrence) = slot.entry.occurrence(local, self.window) else {
                continue;
            };

            if slot.fired == Some(occurrence) {
                continue;
            }

            if permitted {
                slot.fired = Some(occurrence);
                return MatchOutcome::Fire(slot.entry);
            }

            if slot.withheld != Some(occurrence) {
                slot.withheld = Some(occurrence);
                return MatchOutcome::Withheld(slot.entry);
            }
        }

        MatchOutcome::Idle
    }

    /// Loaded entries in list order.
    pub fn entries(&self) -> impl Iterator<Item = &ScheduleEntry> + '_ {
        self.slots.iter().map(|slot| &slot.entry)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub const fn window(&self) -> MatchWindow {
        self.window
    }

    #[must_use]
    pub const fn policy(&self) -> RingPolicy {
        self.policy
    }

    #[must_use]
    pub const fn zone(&self) -> LocalZone {
        self.zone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Sunday 2024-01-07 00:00:00 UTC.
    const SUNDAY_MIDNIGHT: u64 = 1_704_585_600;

    fn at(day_offset: u64, hour: u64, minute: u64, second: u64) -> u64 {
        SUNDAY_MIDNIGHT + day_offset * 86_400 + hour * 3_600 + minute * 60 + second
    }

    fn matcher(entries: &[ScheduleEntry], tolerance: u16) -> ScheduleMatcher {
        ScheduleMatcher::new(
            entries,
            MatchWindow::new(tolerance),
            RingPolicy::RefuseUntrusted,
            LocalZone::UTC,
        )
        .expect("schedule should load")
    }

    const NINE: ScheduleEntry = ScheduleEntry::new(Weekday::Sunday, 9, 0, 0);

    #[test]
    fn fires_once_within_window() {
        let mut matcher = matcher(&[NINE], 2);
        let mut fired = 0;
        for second in 0..10 {
            let now = at(0, 8, 59, 55) + second;
            if matcher.evaluate(now, ConfidenceGrade::Trusted).is_some() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn fires_again_next_week() {
        let mut matcher = matcher(&[NINE], 0);
        assert_eq!(
            matcher.evaluate(at(0, 9, 0, 0), ConfidenceGrade::Trusted),
            Some(NINE)
        );
        assert_eq!(
            matcher.evaluate(at(7, 9, 0, 0), ConfidenceGrade::Trusted),
            Some(NINE)
        );
    }

    #[test]
    fn backward_jump_into_fired_window_is_suppressed() {
        let mut matcher = matcher(&[NINE], 2);
        assert!(
            matcher
                .evaluate(at(0, 8, 59, 58), ConfidenceGrade::Trusted)
                .is_some()
        );
        assert!(
            matcher
                .evaluate(at(0, 9, 0, 2), ConfidenceGrade::Trusted)
                .is_none()
        );
        assert!(
            matcher
                .evaluate(at(0, 8, 59, 59), ConfidenceGrade::Trusted)
                .is_none()
        );
    }

    #[test]
    fn wrong_day_does_not_match() {
        let mut matcher = matcher(&[NINE], 2);
        assert!(
            matcher
                .evaluate(at(1, 9, 0, 0), ConfidenceGrade::Trusted)
                .is_none()
        );
    }

    #[test]
    fn window_straddles_week_boundary() {
        let late_saturday = ScheduleEntry::new(Weekday::Saturday, 23, 59, 59);
        let mut matcher = matcher(&[late_saturday], 2);
        // One second after Sunday midnight is within two seconds of the entry.
        assert_eq!(
            matcher.evaluate(at(7, 0, 0, 1), ConfidenceGrade::Trusted),
            Some(late_saturday)
        );
    }

    #[test]
    fn untrusted_grade_withholds_once() {
        let mut matcher = matcher(&[NINE], 2);
        assert_eq!(
            matcher.evaluate_detailed(at(0, 9, 0, 0), ConfidenceGrade::Untrusted),
            MatchOutcome::Withheld(NINE)
        );
        assert_eq!(
            matcher.evaluate_detailed(at(0, 9, 0, 1), ConfidenceGrade::Untrusted),
            MatchOutcome::Idle
        );
    }

    #[test]
    fn recovered_grade_may_fire_withheld_occurrence() {
        let mut matcher = matcher(&[NINE], 2);
        assert!(
            matcher
                .evaluate(at(0, 9, 0, 0), ConfidenceGrade::Untrusted)
                .is_none()
        );
        assert_eq!(
            matcher.evaluate(at(0, 9, 0, 1), ConfidenceGrade::Degraded),
            Some(NINE)
        );
    }

    #[test]
    fn trusted_only_policy_withholds_degraded() {
        let mut matcher = ScheduleMatcher::<4>::new(
            &[NINE],
            MatchWindow::EXACT,
            RingPolicy::TrustedOnly,
            LocalZone::UTC,
        )
        .expect("schedule should load");
        assert_eq!(
            matcher.evaluate_detailed(at(0, 9, 0, 0), ConfidenceGrade::Degraded),
            MatchOutcome::Withheld(NINE)
        );
    }

    #[test]
    fn overlapping_entries_fire_in_list_order() {
        let first = ScheduleEntry::new(Weekday::Sunday, 9, 0, 1);
        let second = ScheduleEntry::new(Weekday::Sunday, 9, 0, 0);
        let mut matcher = matcher(&[first, second], 2);

        assert_eq!(
            matcher.evaluate(at(0, 9, 0, 0), ConfidenceGrade::Trusted),
            Some(first)
        );
        assert_eq!(
            matcher.evaluate(at(0, 9, 0, 0), ConfidenceGrade::Trusted),
            Some(second)
        );
        assert_eq!(
            matcher.evaluate(at(0, 9, 0, 0), ConfidenceGrade::Trusted),
            None
        );
    }

    #[test]
    fn rejects_duplicate_entries() {
        let result = ScheduleMatcher::<4>::new(
            &[NINE, ScheduleEntry::new(Weekday::Monday, 9, 0, 0), NINE],
            MatchWindow::default(),
            RingPolicy::default(),
            LocalZone::UTC,
        );
        assert_eq!(
            result.err(),
            Some(ScheduleError::DuplicateEntry {
                first: 0,
                second: 2
            })
        );
    }

    #[test]
    fn rejects_out_of_range_entry() {
        let result = ScheduleMatcher::<4>::new(
            &[ScheduleEntry::new(Weekday::Friday, 24, 0, 0)],
            MatchWindow::default(),
            RingPolicy::default(),
            LocalZone::UTC,
        );
        assert_eq!(result.err(), Some(ScheduleError::InvalidEntry { index: 0 }));
    }

    #[test]
    fn rejects_too_many_entries() {
        let entries = [
            ScheduleEntry::new(Weekday::Monday, 1, 0, 0),
            ScheduleEntry::new(Weekday::Monday, 2, 0, 0),
            ScheduleEntry::new(Weekday::Monday, 3, 0, 0),
        ];
        let result =
            ScheduleMatcher::<2>::new(&entries, MatchWindow::default(), RingPolicy::default(), LocalZone::UTC);
        assert_eq!(
            result.err(),
            Some(ScheduleError::TooManyEntries { supplied: 3 })
        );
    }
}
