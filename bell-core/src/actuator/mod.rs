//! Time-bounded relay actuation.
//!
//! The [`Actuator`] is a two-state machine, `Idle` and `Active`. A ring starts
//! only from idle, lasts a fixed duration, and is released by [`Actuator::poll`]
//! once that duration has elapsed. Requests made while a ring is in progress
//! neither restart nor extend it.

use core::time::Duration;

use crate::schedule::ScheduleEntry;
use crate::time::LocalInstant;

/// Default time the relay stays energised per ring.
pub const DEFAULT_RING_DURATION: Duration = Duration::from_secs(5);

/// Abstraction over a single boolean output line.
pub trait OutputLine {
    /// Drives the line to its active (`true`) or inactive (`false`) level.
    fn drive(&mut self, level: bool);
}

impl<T> OutputLine for &mut T
where
    T: OutputLine + ?Sized,
{
    fn drive(&mut self, level: bool) {
        (**self).drive(level);
    }
}

/// Output line that performs no hardware interaction.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopLine;

impl NoopLine {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl OutputLine for NoopLine {
    fn drive(&mut self, _: bool) {}
}

/// What asked for a ring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RingSource {
    Schedule(ScheduleEntry),
    Manual,
}

/// Actuator lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActuatorState<I> {
    Idle,
    Active { since: I, source: RingSource },
}

impl<I> ActuatorState<I> {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, ActuatorState::Active { .. })
    }
}

/// Result of an activation request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Activation {
    Started,
    /// A ring was already in progress; the request was dropped.
    IgnoredActive,
}

/// Details of a completed ring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Release {
    pub source: RingSource,
    pub held_for: Duration,
}

/// Relay driver enforcing a fixed ring duration.
pub struct Actuator<I, L> {
    line: L,
    duration: Duration,
    state: ActuatorState<I>,
}

impl<I, L> Actuator<I, L>
where
    I: LocalInstant,
    L: OutputLine,
{
    /// Wraps the relay line and forces it inactive before anything else runs.
    pub fn new(mut line: L, duration: Duration) -> Self {
        line.drive(false);
        Self {
            line,
            duration,
            state: ActuatorState::Idle,
        }
    }

    /// Starts a ring if idle.
    pub fn activate(&mut self, now: I, source: RingSource) -> Activation {
        if self.state.is_active() {
            return Activation::IgnoredActive;
        }

        self.line.drive(true);
        self.state = ActuatorState::Active { since: now, source };
        Activation::Started
    }

    /// Releases the relay once the ring duration has elapsed.
    pub fn poll(&mut self, now: I) -> Option<Release> {
        let ActuatorState::Active { since, source } = self.state else {
            return None;
        };

        let held_for = now.saturating_duration_since(since);
        if held_for < self.duration {
            return None;
        }

        self.line.drive(false);
        self.state = ActuatorState::Idle;
        Some(Release { source, held_for })
    }

    /// Time left in the current ring, or `None` when idle.
    #[must_use]
    pub fn remaining(&self, now: I) -> Option<Duration> {
        match self.state {
            ActuatorState::Idle => None,
            ActuatorState::Active { since, .. } => Some(
                self.duration
                    .saturating_sub(now.saturating_duration_since(since)),
            ),
        }
    }

    #[must_use]
    pub const fn state(&self) -> &ActuatorState<I> {
        &self.state
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.state.is_active()
    }

    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    pub fn line(&self) -> &L {
        &self.line
    }
}
