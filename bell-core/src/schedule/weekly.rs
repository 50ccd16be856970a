//! Default weekly schedule shared by firmware and host targets.
//!
//! Three Sunday services and one evening service each get a ring. The late
//! Sunday morning service also gets a second call ten minutes in.

use crate::time::Weekday;

use super::ScheduleEntry;

/// Sunday morning service.
pub const SUNDAY_MORNING: ScheduleEntry = ScheduleEntry::new(Weekday::Sunday, 9, 0, 0);
/// Sunday late-morning service.
pub const SUNDAY_LATE_MORNING: ScheduleEntry = ScheduleEntry::new(Weekday::Sunday, 11, 0, 0);
/// Second call for the late-morning service.
pub const SUNDAY_LATE_MORNING_CALL: ScheduleEntry = ScheduleEntry::new(Weekday::Sunday, 11, 10, 0);
/// Sunday evening service.
pub const SUNDAY_EVENING: ScheduleEntry = ScheduleEntry::new(Weekday::Sunday, 18, 30, 0);
/// Wednesday evening service.
pub const WEDNESDAY_EVENING: ScheduleEntry = ScheduleEntry::new(Weekday::Wednesday, 19, 30, 0);

/// Entries loaded when no other schedule is configured.
pub const DEFAULT_SCHEDULE: [ScheduleEntry; 5] = [
    SUNDAY_MORNING,
    SUNDAY_LATE_MORNING,
    SUNDAY_LATE_MORNING_CALL,
    SUNDAY_EVENING,
    WEDNESDAY_EVENING,
];
