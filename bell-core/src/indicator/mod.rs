//! Status LED cadence driven by clock confidence.

use core::time::Duration;

use crate::actuator::OutputLine;
use crate::clock::ConfidenceGrade;

/// Half-period of the degraded blink.
pub const SLOW_BLINK_TOGGLE: Duration = Duration::from_millis(500);
/// Half-period of the untrusted blink.
pub const FAST_BLINK_TOGGLE: Duration = Duration::from_millis(250);

/// LED cadence shown for a confidence grade.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlinkPattern {
    SolidOn,
    SlowBlink,
    FastBlink,
}

impl BlinkPattern {
    /// Interval between toggles, or `None` for a steady light.
    #[must_use]
    pub const fn toggle_every(self) -> Option<Duration> {
        match self {
            BlinkPattern::SolidOn => None,
            BlinkPattern::SlowBlink => Some(SLOW_BLINK_TOGGLE),
            BlinkPattern::FastBlink => Some(FAST_BLINK_TOGGLE),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            BlinkPattern::SolidOn => "solid",
            BlinkPattern::SlowBlink => "slow-blink",
            BlinkPattern::FastBlink => "fast-blink",
        }
    }
}

/// Maps a confidence grade to its LED cadence.
#[must_use]
pub const fn blink_pattern(grade: ConfidenceGrade) -> BlinkPattern {
    match grade {
        ConfidenceGrade::Trusted => BlinkPattern::SolidOn,
        ConfidenceGrade::Degraded => BlinkPattern::SlowBlink,
        ConfidenceGrade::Untrusted => BlinkPattern::FastBlink,
    }
}

/// Drives the status LED from elapsed tick time.
pub struct StatusIndicator<L> {
    line: L,
    pattern: Option<BlinkPattern>,
    accumulated: Duration,
    level: bool,
}

impl<L: OutputLine> StatusIndicator<L> {
    /// Wraps the LED line; nothing is driven until the first update.
    pub const fn new(line: L) -> Self {
        Self {
            line,
            pattern: None,
            accumulated: Duration::ZERO,
            level: false,
        }
    }

    /// Advances the cadence by `elapsed` and returns the resulting LED level.
    ///
    /// A pattern change restarts the cycle with the LED lit.
    pub fn update(&mut self, grade: ConfidenceGrade, elapsed: Duration) -> bool {
        let pattern = blink_pattern(grade);

        if self.pattern != Some(pattern) {
            let first = self.pattern.is_none();
            self.pattern = Some(pattern);
            self.accumulated = Duration::ZERO;
            self.set_level(true, first);
            return self.level;
        }

        let Some(toggle_every) = pattern.toggle_every() else {
            return self.level;
        };

        self.accumulated += elapsed;
        let mut level = self.level;
        while self.accumulated >= toggle_every {
            self.accumulated -= toggle_every;
            level = !level;
        }
        self.set_level(level, false);
        self.level
    }

    fn set_level(&mut self, level: bool, force: bool) {
        if force || level != self.level {
            self.level = level;
            self.line.drive(level);
        }
    }

    #[must_use]
    pub const fn level(&self) -> bool {
        self.level
    }

    #[must_use]
    pub const fn pattern(&self) -> Option<BlinkPattern> {
        self.pattern
    }

    pub fn line(&self) -> &L {
        &self.line
    }
}
