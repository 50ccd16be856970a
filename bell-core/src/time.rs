//! Instants, weekdays, and local wall-clock arithmetic.
//!
//! Wall-clock values travel through the controller as Unix seconds. They are
//! only converted to a local weekday and time of day when the schedule is
//! consulted or a status line is rendered, via [`LocalZone`].

use core::{fmt, ops::Add, time::Duration};

pub const SECONDS_PER_MINUTE: i64 = 60;
pub const SECONDS_PER_HOUR: i64 = 3_600;
pub const SECONDS_PER_DAY: i64 = 86_400;
pub const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;

// 1970-01-01 was a Thursday, four days after the preceding Sunday.
const EPOCH_WEEK_SHIFT: i64 = 4 * SECONDS_PER_DAY;

/// Trait implemented by the monotonic instant types used by each target.
///
/// The firmware wraps `embassy_time::Instant`, the emulator uses a simulated
/// microsecond counter, and tests use plain integer wrappers.
pub trait LocalInstant: Copy + Ord + Add<Duration, Output = Self> {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Day of the week, numbered from Sunday.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Weekday {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Sunday,
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
    ];

    /// Index in `0..=6`, Sunday first.
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Weekday::Sunday => 0,
            Weekday::Monday => 1,
            Weekday::Tuesday => 2,
            Weekday::Wednesday => 3,
            Weekday::Thursday => 4,
            Weekday::Friday => 5,
            Weekday::Saturday => 6,
        }
    }

    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Weekday::Sunday),
            1 => Some(Weekday::Monday),
            2 => Some(Weekday::Tuesday),
            3 => Some(Weekday::Wednesday),
            4 => Some(Weekday::Thursday),
            5 => Some(Weekday::Friday),
            6 => Some(Weekday::Saturday),
            _ => None,
        }
    }

    /// Three-letter label used in status output.
    #[must_use]
    pub const fn short_name(self) -> &'static str {
        match self {
            Weekday::Sunday => "Sun",
            Weekday::Monday => "Mon",
            Weekday::Tuesday => "Tue",
            Weekday::Wednesday => "Wed",
            Weekday::Thursday => "Thu",
            Weekday::Friday => "Fri",
            Weekday::Saturday => "Sat",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Offset applied when turning Unix seconds into local wall-clock seconds.
///
/// `lead_secs` runs the local clock ahead of true local time so that a ring
/// scheduled for `09:00:00` starts that many seconds early.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LocalZone {
    pub utc_offset_secs: i32,
    pub lead_secs: u16,
}

impl LocalZone {
    /// Plain UTC with no lead.
    pub const UTC: Self = Self::new(0, 0);
    /// UTC-3 with a five second lead.
    pub const SAO_PAULO: Self = Self::new(-10_800, 5);

    #[must_use]
    pub const fn new(utc_offset_secs: i32, lead_secs: u16) -> Self {
        Self {
            utc_offset_secs,
            lead_secs,
        }
    }

    /// Converts Unix seconds into local epoch seconds.
    #[must_use]
    pub fn local_seconds(self, unix_secs: u64) -> i64 {
        i64::try_from(unix_secs)
            .unwrap_or(i64::MAX)
            .saturating_add(i64::from(self.utc_offset_secs))
            .saturating_add(i64::from(self.lead_secs))
    }

    /// Breaks Unix seconds down into a local weekday and time of day.
    #[must_use]
    pub fn wall_time(self, unix_secs: u64) -> WallTime {
        WallTime::from_local_seconds(self.local_seconds(unix_secs))
    }
}

impl Default for LocalZone {
    fn default() -> Self {
        Self::SAO_PAULO
    }
}

/// Local weekday and time of day.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WallTime {
    pub day: Weekday,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl WallTime {
    #[must_use]
    pub fn from_local_seconds(local_secs: i64) -> Self {
        let position = week_position(local_secs);
        let second_of_day = position % SECONDS_PER_DAY;

        Self {
            day: Weekday::from_index(narrow(position / SECONDS_PER_DAY))
                .unwrap_or(Weekday::Sunday),
            hour: narrow(second_of_day / SECONDS_PER_HOUR),
            minute: narrow(second_of_day % SECONDS_PER_HOUR / SECONDS_PER_MINUTE),
            second: narrow(second_of_day % SECONDS_PER_MINUTE),
        }
    }

    /// Seconds since Sunday midnight.
    #[must_use]
    pub fn week_second(self) -> i64 {
        i64::from(self.day.index()) * SECONDS_PER_DAY
            + i64::from(self.hour) * SECONDS_PER_HOUR
            + i64::from(self.minute) * SECONDS_PER_MINUTE
            + i64::from(self.second)
    }
}

impl fmt::Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}:{:02}",
            self.day, self.hour, self.minute, self.second
        )
    }
}

/// Position of a local epoch second within its week, counted from Sunday midnight.
#[must_use]
pub fn week_position(local_secs: i64) -> i64 {
    (local_secs.rem_euclid(SECONDS_PER_WEEK) + EPOCH_WEEK_SHIFT) % SECONDS_PER_WEEK
}

/// Signed distance from `target` to `position` around the week, in `(-W/2, W/2]`.
///
/// Both arguments are week positions. The result wraps at Saturday midnight, so
/// a window straddling the end of the week compares correctly.
#[must_use]
pub fn week_offset(position: i64, target: i64) -> i64 {
    let half = SECONDS_PER_WEEK / 2;
    let diff = (position - target).rem_euclid(SECONDS_PER_WEEK);
    if diff > half {
        diff - SECONDS_PER_WEEK
    } else {
        diff
    }
}

fn narrow(value: i64) -> u8 {
    u8::try_from(value).unwrap_or(u8::MAX)
}
