//! Tick loop tying the tracker, matcher, actuator and indicator together.
//!
//! [`BellController`] is the single writer of controller state. Platforms call
//! [`BellController::tick`] on a fixed cadence when the time provider can be
//! queried synchronously, or split the work into [`BellController::sync_due`]
//! and [`BellController::step`] when the fetch has to be awaited between the
//! two.

use core::{fmt, time::Duration};

use crate::actuator::{
    Activation, Actuator, ActuatorState, DEFAULT_RING_DURATION, OutputLine, Release, RingSource,
};
use crate::clock::{
    ClockConfidenceTracker, ConfidenceGrade, ConnectivityProbe, GradeChange,
    MAX_PRECISION_LOSS_BUDGET, SyncOutcome, SyncPolicy, TimeProvider,
};
use crate::indicator::StatusIndicator;
use crate::repl::status::{ClockStatus, RelayStatus, StatusSnapshot};
use crate::schedule::{
    MAX_SCHEDULE_ENTRIES, MatchOutcome, MatchWindow, RingPolicy, ScheduleEntry, ScheduleError,
    ScheduleMatcher,
};
use crate::telemetry::TelemetryRecorder;
use crate::time::{LocalInstant, LocalZone};

/// Default spacing between ticks.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(50);

/// Complete controller configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BellConfig {
    pub tick_period: Duration,
    pub sync: SyncPolicy,
    pub window: MatchWindow,
    pub ring_policy: RingPolicy,
    pub ring_duration: Duration,
    pub zone: LocalZone,
}

impl BellConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            sync: SyncPolicy::new(
                crate::clock::DEFAULT_SYNC_INTERVAL,
                crate::clock::DEFAULT_SYNC_TIMEOUT,
                crate::clock::DEFAULT_PRECISION_LOSS_BUDGET,
            ),
            window: MatchWindow::new(crate::schedule::DEFAULT_TOLERANCE_SECS),
            ring_policy: RingPolicy::RefuseUntrusted,
            ring_duration: DEFAULT_RING_DURATION,
            zone: LocalZone::SAO_PAULO,
        }
    }

    /// Longest tick period that cannot step over a one-second occurrence.
    #[must_use]
    pub fn max_tick_period(&self) -> Duration {
        Duration::from_secs(2 * u64::from(self.window.tolerance_secs) + 1)
    }

    /// Checks the configuration for values the tick loop cannot honour.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period.is_zero() {
            return Err(ConfigError::ZeroTickPeriod);
        }
        if self.ring_duration.is_zero() {
            return Err(ConfigError::ZeroRingDuration);
        }
        if self.sync.interval.is_zero() {
            return Err(ConfigError::ZeroSyncInterval);
        }
        if self.sync.timeout.is_zero() {
            return Err(ConfigError::ZeroSyncTimeout);
        }
        let budget = self.sync.precision_loss_budget;
        if !(1..=MAX_PRECISION_LOSS_BUDGET).contains(&budget) {
            return Err(ConfigError::PrecisionLossBudgetOutOfRange { budget });
        }

        let limit = self.max_tick_period();
        if self.tick_period > limit {
            return Err(ConfigError::TickExceedsWindow {
                tick_period: self.tick_period,
                limit,
            });
        }

        Ok(())
    }
}

impl Default for BellConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration rejected by [`BellConfig::validate`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    ZeroTickPeriod,
    ZeroRingDuration,
    ZeroSyncInterval,
    ZeroSyncTimeout,
    /// The budget must leave room for at least one degraded failure and
    /// still be reachable by the saturating failure counter.
    PrecisionLossBudgetOutOfRange { budget: u8 },
    /// Ticks are too far apart for the match window.
    TickExceedsWindow {
        tick_period: Duration,
        limit: Duration,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroTickPeriod => f.write_str("tick period must be non-zero"),
            ConfigError::ZeroRingDuration => f.write_str("ring duration must be non-zero"),
            ConfigError::ZeroSyncInterval => f.write_str("sync interval must be non-zero"),
            ConfigError::ZeroSyncTimeout => f.write_str("sync timeout must be non-zero"),
            ConfigError::PrecisionLossBudgetOutOfRange { budget } => write!(
                f,
                "precision loss budget {budget} is outside 1..={MAX_PRECISION_LOSS_BUDGET}"
            ),
            ConfigError::TickExceedsWindow { tick_period, limit } => write!(
                f,
                "tick period {}ms exceeds {}ms allowed by the match window",
                tick_period.as_millis(),
                limit.as_millis()
            ),
        }
    }
}

/// Construction failure for [`BellController`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BellError {
    Config(ConfigError),
    Schedule(ScheduleError),
}

impl From<ConfigError> for BellError {
    fn from(error: ConfigError) -> Self {
        BellError::Config(error)
    }
}

impl From<ScheduleError> for BellError {
    fn from(error: ScheduleError) -> Self {
        BellError::Schedule(error)
    }
}

impl fmt::Display for BellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BellError::Config(error) => write!(f, "invalid config: {error}"),
            BellError::Schedule(error) => write!(f, "invalid schedule: {error}"),
        }
    }
}

/// Everything one tick did, for logging and tests.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TickReport {
    /// Unix seconds the matcher evaluated.
    pub estimate_secs: u64,
    pub grade: ConfidenceGrade,
    pub sync: Option<SyncOutcome>,
    pub grade_change: Option<GradeChange>,
    pub matched: MatchOutcome,
    pub activation: Option<Activation>,
    pub release: Option<Release>,
    pub led: bool,
}

/// Weekly bell controller.
pub struct BellController<I, R, L, const ENTRIES: usize = MAX_SCHEDULE_ENTRIES>
where
    I: LocalInstant,
{
    config: BellConfig,
    tracker: ClockConfidenceTracker<I>,
    matcher: ScheduleMatcher<ENTRIES>,
    actuator: Actuator<I, R>,
    indicator: StatusIndicator<L>,
    telemetry: TelemetryRecorder<I>,
    last_step: I,
}

impl<I, R, L, const ENTRIES: usize> BellController<I, R, L, ENTRIES>
where
    I: LocalInstant,
    R: OutputLine,
    L: OutputLine,
{
    /// Builds a controller around the relay and LED lines.
    ///
    /// The relay is driven inactive before the configuration is checked, so it
    /// is never left energised by a rejected start.
    ///
    /// # Errors
    ///
    /// Returns [`BellError`] when the configuration or schedule is invalid.
    pub fn new(
        config: BellConfig,
        schedule: &[ScheduleEntry],
        relay: R,
        led: L,
        now: I,
    ) -> Result<Self, BellError> {
        let actuator = Actuator::new(relay, config.ring_duration);
        config.validate()?;
        let matcher =
            ScheduleMatcher::new(schedule, config.window, config.ring_policy, config.zone)?;

        Ok(Self {
            config,
            tracker: ClockConfidenceTracker::new(config.sync, now),
            matcher,
            actuator,
            indicator: StatusIndicator::new(led),
            telemetry: TelemetryRecorder::new(),
            last_step: now,
        })
    }

    /// Runs one tick, querying `provider` inline when a sync is due.
    pub fn tick<P, C>(&mut self, now: I, provider: &mut P, probe: &C) -> TickReport
    where
        P: TimeProvider + ?Sized,
        C: ConnectivityProbe + ?Sized,
    {
        let sync = self
            .sync_due(now)
            .then(|| self.tracker.attempt(provider, probe));
        self.step(now, sync)
    }

    /// Returns `true` when the next step should carry a sync outcome.
    ///
    /// A due sync waits while the relay is energised. The fetch can suspend
    /// the tick loop for the whole sync timeout, and the relay is only
    /// released by a step.
    #[must_use]
    pub fn sync_due(&self, now: I) -> bool {
        !self.actuator.is_active() && self.tracker.sync_due(now)
    }

    /// Runs one tick with a sync outcome obtained by the caller.
    ///
    /// The outcome is applied before the schedule is evaluated, so a
    /// correction takes effect on the same tick.
    pub fn step(&mut self, now: I, sync: Option<SyncOutcome>) -> TickReport {
        let elapsed = now.saturating_duration_since(self.last_step);
        if now > self.last_step {
            self.last_step = now;
        }
        self.tracker.advance(now);

        let grade_change = sync.and_then(|outcome| self.apply_sync(outcome, now));

        let grade = self.tracker.current_grade();
        let estimate_secs = self.tracker.current_secs();
        let matched = self.matcher.evaluate_detailed(estimate_secs, grade);

        let activation = match matched {
            MatchOutcome::Fire(entry) => Some(self.start_ring(now, RingSource::Schedule(entry))),
            MatchOutcome::Withheld(entry) => {
                self.telemetry.record_ring_withheld(entry, grade, now);
                None
            }
            MatchOutcome::Idle => None,
        };

        let release = self.actuator.poll(now);
        if let Some(release) = release {
            self.telemetry
                .record_ring_released(release.source, release.held_for, grade, now);
        }

        let led = self.indicator.update(grade, elapsed);

        TickReport {
            estimate_secs,
            grade,
            sync,
            grade_change,
            matched,
            activation,
            release,
            led,
        }
    }

    fn apply_sync(&mut self, outcome: SyncOutcome, now: I) -> Option<GradeChange> {
        let before = self.tracker.current_secs();
        let change = self.tracker.apply_outcome(outcome, now);

        match outcome {
            SyncOutcome::Success(unix_secs) => {
                self.telemetry
                    .record_sync_success(unix_secs, signed_delta(unix_secs, before), now);
            }
            SyncOutcome::Failure(reason) => {
                self.telemetry.record_sync_failure(
                    reason,
                    self.tracker.current_secs(),
                    self.tracker.consecutive_failures(),
                    now,
                );
            }
        }

        if let Some(change) = change {
            self.telemetry
                .record_grade_change(change.from, change.to, now);
        }

        change
    }

    fn start_ring(&mut self, now: I, source: RingSource) -> Activation {
        let grade = self.tracker.current_grade();
        let activation = self.actuator.activate(now, source);
        match activation {
            Activation::Started => self.telemetry.record_ring_started(source, grade, now),
            Activation::IgnoredActive => self.telemetry.record_ring_ignored(source, grade, now),
        };
        activation
    }

    /// Starts a manual ring regardless of clock confidence.
    ///
    /// The relay is released by a later tick once the ring duration elapses.
    pub fn request_ring(&mut self, now: I) -> Activation {
        self.start_ring(now, RingSource::Manual)
    }

    /// Makes the next tick attempt a sync.
    pub fn request_sync(&mut self) {
        self.tracker.request_sync();
    }

    /// Captures clock, relay and LED state for the console.
    #[must_use]
    pub fn snapshot(&self, now: I) -> StatusSnapshot {
        let at = now.max(self.tracker.last_tick());
        let estimate_secs = self.tracker.current_estimate().seconds_at(at);

        let relay = match *self.actuator.state() {
            ActuatorState::Idle => RelayStatus::IDLE,
            ActuatorState::Active { source, .. } => RelayStatus {
                active: true,
                trigger: Some(source.into()),
                remaining: self.actuator.remaining(at),
            },
        };

        StatusSnapshot {
            clock: ClockStatus {
                grade: self.tracker.current_grade(),
                estimate_secs,
                wall_time: self.config.zone.wall_time(estimate_secs),
                ever_synced: self.tracker.ever_synced(),
                consecutive_failures: self.tracker.consecutive_failures(),
                since_last_sync: self
                    .tracker
                    .last_success()
                    .map(|synced| at.saturating_duration_since(synced)),
            },
            relay,
            led_on: self.indicator.level(),
            ring_policy: self.config.ring_policy,
            link_up: None,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &BellConfig {
        &self.config
    }

    pub fn schedule(&self) -> impl Iterator<Item = &ScheduleEntry> + '_ {
        self.matcher.entries()
    }

    #[must_use]
    pub const fn tracker(&self) -> &ClockConfidenceTracker<I> {
        &self.tracker
    }

    #[must_use]
    pub const fn actuator(&self) -> &Actuator<I, R> {
        &self.actuator
    }

    #[must_use]
    pub const fn indicator(&self) -> &StatusIndicator<L> {
        &self.indicator
    }

    #[must_use]
    pub const fn telemetry(&self) -> &TelemetryRecorder<I> {
        &self.telemetry
    }
}

/// `after - before` as a signed value, saturating at the `i64` range.
fn signed_delta(after: u64, before: u64) -> i64 {
    if after >= before {
        i64::try_from(after - before).unwrap_or(i64::MAX)
    } else {
        i64::try_from(before - after).map_or(i64::MIN, |delta| -delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::NoopLine;
    use crate::clock::{AlwaysUp, SyncFailure};
    use crate::schedule::DEFAULT_SCHEDULE;
    use crate::telemetry::TelemetryEventKind;
    use crate::time::Weekday;
    use core::ops::Add;

    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    struct MockInstant(u64);

    impl MockInstant {
        fn secs(value: u64) -> Self {
            Self(value * 1_000)
        }
    }

    impl Add<Duration> for MockInstant {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self::Output {
            Self(self.0 + u64::try_from(rhs.as_millis()).expect("duration fits"))
        }
    }

    impl LocalInstant for MockInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_millis(self.0.saturating_sub(earlier.0))
        }
    }

    #[derive(Default)]
    struct RecordingLine {
        level: bool,
        writes: usize,
    }

    impl OutputLine for RecordingLine {
        fn drive(&mut self, level: bool) {
            self.level = level;
            self.writes += 1;
        }
    }

    struct Scripted(Result<u64, SyncFailure>);

    impl TimeProvider for Scripted {
        fn fetch(&mut self, _timeout: Duration) -> Result<u64, SyncFailure> {
            self.0
        }
    }

    // Sunday 08:59:55 in UTC-3, which reads 09:00:00 with the five second lead.
    const SUNDAY_NINE: u64 = 1_704_628_795;

    type Controller = BellController<MockInstant, RecordingLine, NoopLine>;

    fn controller(config: BellConfig) -> Controller {
        BellController::new(
            config,
            &DEFAULT_SCHEDULE,
            RecordingLine::default(),
            NoopLine::new(),
            MockInstant::secs(0),
        )
        .expect("valid controller")
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(BellConfig::default().validate(), Ok(()));
        assert_eq!(
            BellConfig::default().max_tick_period(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn rejects_invalid_config_after_forcing_relay_low() {
        let mut config = BellConfig::new();
        config.sync.precision_loss_budget = 0;
        let mut relay = RecordingLine {
            level: true,
            writes: 0,
        };

        let result = BellController::<MockInstant, _, NoopLine>::new(
            config,
            &DEFAULT_SCHEDULE,
            &mut relay,
            NoopLine::new(),
            MockInstant::secs(0),
        );
        assert!(matches!(
            result,
            Err(BellError::Config(
                ConfigError::PrecisionLossBudgetOutOfRange { budget: 0 }
            ))
        ));
        assert!(!relay.level);
        assert_eq!(relay.writes, 1);
    }

    #[test]
    fn rejects_tick_longer_than_window() {
        let config = BellConfig {
            tick_period: Duration::from_secs(6),
            ..BellConfig::new()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::TickExceedsWindow {
                tick_period: Duration::from_secs(6),
                limit: Duration::from_secs(5),
            })
        );
    }

    #[test]
    fn rejects_budget_the_failure_counter_cannot_exceed() {
        let mut config = BellConfig::new();
        config.sync.precision_loss_budget = u8::MAX;
        assert_eq!(
            config.validate(),
            Err(ConfigError::PrecisionLossBudgetOutOfRange { budget: u8::MAX })
        );

        config.sync.precision_loss_budget = MAX_PRECISION_LOSS_BUDGET;
        assert_eq!(config.validate(), Ok(()));
        let mut tracker = ClockConfidenceTracker::new(config.sync, MockInstant::secs(0));
        tracker.apply_outcome(SyncOutcome::Success(1_000), MockInstant::secs(0));
        for _ in 0..MAX_PRECISION_LOSS_BUDGET {
            tracker.apply_outcome(
                SyncOutcome::Failure(SyncFailure::ConnectFailed),
                MockInstant::secs(0),
            );
        }
        assert_eq!(tracker.current_grade(), ConfidenceGrade::Degraded);
        tracker.apply_outcome(
            SyncOutcome::Failure(SyncFailure::ConnectFailed),
            MockInstant::secs(0),
        );
        assert_eq!(tracker.current_grade(), ConfidenceGrade::Untrusted);
    }

    #[test]
    fn rejects_duplicate_schedule() {
        let entry = ScheduleEntry::new(Weekday::Monday, 7, 0, 0);
        let result = BellController::<MockInstant, _, _>::new(
            BellConfig::new(),
            &[entry, entry],
            NoopLine::new(),
            NoopLine::new(),
            MockInstant::secs(0),
        );
        assert!(matches!(
            result,
            Err(BellError::Schedule(ScheduleError::DuplicateEntry {
                first: 0,
                second: 1
            }))
        ));
    }

    #[test]
    fn synced_tick_rings_and_releases() {
        let mut controller = controller(BellConfig::new());
        let mut provider = Scripted(Ok(SUNDAY_NINE));

        let report = controller.tick(MockInstant::secs(0), &mut provider, &AlwaysUp);
        assert_eq!(report.sync, Some(SyncOutcome::Success(SUNDAY_NINE)));
        assert_eq!(report.grade, ConfidenceGrade::Trusted);
        assert_eq!(report.activation, Some(Activation::Started));
        assert!(controller.actuator().line().level);

        for second in 1..5 {
            let report = controller.tick(MockInstant::secs(second), &mut provider, &AlwaysUp);
            assert_eq!(report.sync, None);
            assert_eq!(report.activation, None);
            assert_eq!(report.release, None);
        }

        let report = controller.tick(MockInstant::secs(5), &mut provider, &AlwaysUp);
        assert_eq!(
            report.release.map(|release| release.held_for),
            Some(Duration::from_secs(5))
        );
        assert!(!controller.actuator().line().level);

        let kinds: heapless::Vec<TelemetryEventKind, 8> = controller
            .telemetry()
            .oldest_first()
            .map(|record| record.event)
            .collect();
        assert_eq!(
            kinds.as_slice(),
            &[
                TelemetryEventKind::SyncSucceeded,
                TelemetryEventKind::GradeChanged,
                TelemetryEventKind::RingStarted(crate::telemetry::RingTrigger::Schedule),
                TelemetryEventKind::RingReleased,
            ]
        );
    }

    #[test]
    fn untrusted_clock_withholds_scheduled_ring() {
        let mut controller = controller(BellConfig::new());
        controller.tracker.apply_outcome(
            SyncOutcome::Success(SUNDAY_NINE - 100),
            MockInstant::secs(0),
        );
        for _ in 0..8 {
            controller.tracker.apply_outcome(
                SyncOutcome::Failure(SyncFailure::Timeout),
                MockInstant::secs(0),
            );
        }
        assert_eq!(
            controller.tracker().current_grade(),
            ConfidenceGrade::Untrusted
        );

        let report = controller.step(MockInstant::secs(100), None);
        assert_eq!(
            report.matched,
            MatchOutcome::Withheld(ScheduleEntry::new(Weekday::Sunday, 9, 0, 0))
        );
        assert!(!controller.actuator().is_active());
        assert_eq!(
            controller.telemetry().latest().map(|record| record.event),
            Some(TelemetryEventKind::RingWithheld)
        );
    }

    #[test]
    fn manual_ring_ignores_grade_and_busy_relay() {
        let mut controller = controller(BellConfig::new());
        assert_eq!(
            controller.request_ring(MockInstant::secs(1)),
            Activation::Started
        );
        assert_eq!(
            controller.request_ring(MockInstant::secs(2)),
            Activation::IgnoredActive
        );

        let snapshot = controller.snapshot(MockInstant::secs(3));
        assert!(snapshot.relay.active);
        assert_eq!(snapshot.relay.remaining, Some(Duration::from_secs(3)));
        assert_eq!(snapshot.clock.grade, ConfidenceGrade::Untrusted);
    }

    #[test]
    fn sync_correction_is_signed() {
        let mut controller = controller(BellConfig::new());
        controller.step(MockInstant::secs(0), Some(SyncOutcome::Success(1_000)));
        controller.step(MockInstant::secs(10), Some(SyncOutcome::Success(1_004)));

        let record = controller.telemetry().latest().copied().expect("record");
        match record.details {
            crate::telemetry::TelemetryPayload::Sync(details) => {
                assert_eq!(details.correction_secs, Some(-6));
            }
            other => panic!("expected sync payload, got {other:?}"),
        }
    }

    #[test]
    fn requested_sync_runs_on_next_tick() {
        let mut controller = controller(BellConfig::new());
        let mut provider = Scripted(Ok(10));
        controller.tick(MockInstant::secs(0), &mut provider, &AlwaysUp);
        assert!(!controller.sync_due(MockInstant::secs(1)));

        controller.request_sync();
        let report = controller.tick(MockInstant::secs(1), &mut provider, &AlwaysUp);
        assert_eq!(report.sync, Some(SyncOutcome::Success(10)));
    }

    #[test]
    fn due_sync_waits_for_relay_release() {
        let mut controller = controller(BellConfig::new());
        controller.step(MockInstant::secs(0), Some(SyncOutcome::Success(1_000)));
        assert_eq!(
            controller.request_ring(MockInstant::secs(1)),
            Activation::Started
        );

        controller.request_sync();
        assert!(!controller.sync_due(MockInstant::secs(4)));

        let mut provider = Scripted(Err(SyncFailure::Timeout));
        let report = controller.tick(MockInstant::secs(4), &mut provider, &AlwaysUp);
        assert_eq!(report.sync, None);
        assert!(controller.actuator().is_active());

        let report = controller.tick(MockInstant::secs(6), &mut provider, &AlwaysUp);
        assert_eq!(report.sync, None);
        assert_eq!(
            report.release.map(|release| release.held_for),
            Some(Duration::from_secs(5))
        );

        assert!(controller.sync_due(MockInstant::secs(6)));
        let report = controller.tick(MockInstant::secs(7), &mut provider, &AlwaysUp);
        assert_eq!(report.sync, Some(SyncOutcome::Failure(SyncFailure::Timeout)));
    }

    #[test]
    fn signed_delta_saturates() {
        assert_eq!(signed_delta(5, 3), 2);
        assert_eq!(signed_delta(3, 5), -2);
        assert_eq!(signed_delta(u64::MAX, 0), i64::MAX);
        assert_eq!(signed_delta(0, u64::MAX), i64::MIN);
    }
}
