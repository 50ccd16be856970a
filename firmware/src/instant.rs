#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Embassy instant adapter for the shared controller logic.

use core::ops::Add;
use core::time::Duration;

use bell_core::time::LocalInstant;
use embassy_time::{Duration as EmbassyDuration, Instant};

/// Monotonic instant backed by the Embassy time driver.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[cfg(target_os = "none")]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub const fn from_micros(micros: u64) -> Self {
        Self(Instant::from_micros(micros))
    }

    pub fn as_micros(self) -> u64 {
        self.0.as_micros()
    }

    pub fn into_embassy(self) -> Instant {
        self.0
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl Add<Duration> for FirmwareInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(
            self.0
                .checked_add(to_embassy(rhs))
                .unwrap_or(Instant::MAX),
        )
    }
}

impl LocalInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_duration_since(earlier.0).as_micros())
    }
}

/// Converts a core duration, saturating at the Embassy range.
pub fn to_embassy(duration: Duration) -> EmbassyDuration {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    EmbassyDuration::from_micros(micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_saturates_at_the_end_of_time() {
        let late = FirmwareInstant::from(Instant::MAX);
        assert_eq!(late + Duration::from_secs(1), late);
    }

    #[test]
    fn duration_since_never_goes_negative() {
        let early = FirmwareInstant::from_micros(1_000);
        let later = early + Duration::from_millis(250);
        assert_eq!(
            later.saturating_duration_since(early),
            Duration::from_millis(250)
        );
        assert_eq!(early.saturating_duration_since(later), Duration::ZERO);
    }
}
