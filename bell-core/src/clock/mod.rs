//! Clock confidence tracking.
//!
//! [`ClockConfidenceTracker`] owns the controller's estimate of the current
//! Unix time. Between syncs the estimate advances on the local monotonic clock.
//! Sync attempts go through a [`TimeProvider`]. Each failed attempt lowers the
//! [`ConfidenceGrade`] one step toward untrusted, and any success restores it.
//! Sync failures never escape the tracker. They are only visible through the
//! grade and the failure counter.

use core::{fmt, time::Duration};

use crate::time::LocalInstant;

/// Default spacing between sync attempts (48 minutes).
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(2_880);
/// Default bound on a single sync round trip.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of failures tolerated in [`ConfidenceGrade::Degraded`].
pub const DEFAULT_PRECISION_LOSS_BUDGET: u8 = 7;
/// Largest usable budget. The failure counter saturates at `u8::MAX`, so a
/// budget that high would never reach untrusted.
pub const MAX_PRECISION_LOSS_BUDGET: u8 = u8::MAX - 1;

/// Trust level attached to the current time estimate.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum ConfidenceGrade {
    Trusted,
    Degraded,
    Untrusted,
}

impl ConfidenceGrade {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ConfidenceGrade::Trusted => "trusted",
            ConfidenceGrade::Degraded => "degraded",
            ConfidenceGrade::Untrusted => "untrusted",
        }
    }

    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            ConfidenceGrade::Trusted => 0,
            ConfidenceGrade::Degraded => 1,
            ConfidenceGrade::Untrusted => 2,
        }
    }

    #[must_use]
    pub const fn from_raw(code: u8) -> Option<Self> {
        match code {
            0 => Some(ConfidenceGrade::Trusted),
            1 => Some(ConfidenceGrade::Degraded),
            2 => Some(ConfidenceGrade::Untrusted),
            _ => None,
        }
    }

    /// Grade for a tracker with the given failure history.
    ///
    /// A tracker that has never synced is untrusted. After a success the grade
    /// stays degraded for `budget` consecutive failures before it drops to
    /// untrusted.
    #[must_use]
    pub const fn for_failures(ever_synced: bool, failures: u8, budget: u8) -> Self {
        if !ever_synced {
            ConfidenceGrade::Untrusted
        } else if failures == 0 {
            ConfidenceGrade::Trusted
        } else if failures <= budget {
            ConfidenceGrade::Degraded
        } else {
            ConfidenceGrade::Untrusted
        }
    }
}

impl fmt::Display for ConfidenceGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Diagnostic reason attached to a failed sync attempt.
///
/// The grading rule treats every variant identically.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncFailure {
    /// The connectivity probe reported the link down; no fetch was attempted.
    NoConnectivity,
    /// The time server could not be reached.
    ConnectFailed,
    /// The provider did not answer within the sync timeout.
    Timeout,
    /// A response arrived but carried no usable timestamp.
    MalformedResponse,
}

impl SyncFailure {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            SyncFailure::NoConnectivity => "no-connectivity",
            SyncFailure::ConnectFailed => "connect-failed",
            SyncFailure::Timeout => "timeout",
            SyncFailure::MalformedResponse => "malformed-response",
        }
    }

    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            SyncFailure::NoConnectivity => 0,
            SyncFailure::ConnectFailed => 1,
            SyncFailure::Timeout => 2,
            SyncFailure::MalformedResponse => 3,
        }
    }

    #[must_use]
    pub const fn from_raw(code: u8) -> Option<Self> {
        match code {
            0 => Some(SyncFailure::NoConnectivity),
            1 => Some(SyncFailure::ConnectFailed),
            2 => Some(SyncFailure::Timeout),
            3 => Some(SyncFailure::MalformedResponse),
            _ => None,
        }
    }
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one sync attempt, in Unix seconds on success.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncOutcome {
    Success(u64),
    Failure(SyncFailure),
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, SyncOutcome::Success(_))
    }
}

impl From<Result<u64, SyncFailure>> for SyncOutcome {
    fn from(value: Result<u64, SyncFailure>) -> Self {
        match value {
            Ok(unix_secs) => SyncOutcome::Success(unix_secs),
            Err(reason) => SyncOutcome::Failure(reason),
        }
    }
}

/// Source of absolute time consulted on the sync cadence.
pub trait TimeProvider {
    /// Fetches the current Unix time in seconds.
    ///
    /// Implementations must return within `timeout` and report
    /// [`SyncFailure::Timeout`] when the source stays silent.
    ///
    /// # Errors
    ///
    /// Returns the [`SyncFailure`] describing why no timestamp was obtained.
    fn fetch(&mut self, timeout: Duration) -> Result<u64, SyncFailure>;
}

impl<T> TimeProvider for &mut T
where
    T: TimeProvider + ?Sized,
{
    fn fetch(&mut self, timeout: Duration) -> Result<u64, SyncFailure> {
        (**self).fetch(timeout)
    }
}

/// Cheap link check consulted before a fetch is attempted.
pub trait ConnectivityProbe {
    /// Returns `true` when the network link looks usable.
    fn is_up(&self) -> bool;
}

/// Probe for platforms without a link indicator.
#[derive(Copy, Clone, Debug, Default)]
pub struct AlwaysUp;

impl ConnectivityProbe for AlwaysUp {
    fn is_up(&self) -> bool {
        true
    }
}

/// Sync cadence and grading parameters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SyncPolicy {
    pub interval: Duration,
    pub timeout: Duration,
    /// Failures tolerated while degraded, from 1 to [`MAX_PRECISION_LOSS_BUDGET`].
    pub precision_loss_budget: u8,
    /// Attempt the first sync on the first tick instead of one interval in.
    pub sync_on_start: bool,
}

impl SyncPolicy {
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration, precision_loss_budget: u8) -> Self {
        Self {
            interval,
            timeout,
            precision_loss_budget,
            sync_on_start: true,
        }
    }

    #[must_use]
    pub const fn with_sync_on_start(mut self, sync_on_start: bool) -> Self {
        self.sync_on_start = sync_on_start;
        self
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_SYNC_INTERVAL,
            DEFAULT_SYNC_TIMEOUT,
            DEFAULT_PRECISION_LOSS_BUDGET,
        )
    }
}

/// Absolute time anchored to a local monotonic instant.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimeEstimate<I> {
    /// Unix seconds at `anchored_at`.
    pub anchor_secs: u64,
    pub anchored_at: I,
}

impl<I: LocalInstant> TimeEstimate<I> {
    #[must_use]
    pub const fn new(anchor_secs: u64, anchored_at: I) -> Self {
        Self {
            anchor_secs,
            anchored_at,
        }
    }

    /// Unix seconds at local instant `now`.
    #[must_use]
    pub fn seconds_at(&self, now: I) -> u64 {
        self.anchor_secs
            .saturating_add(now.saturating_duration_since(self.anchored_at).as_secs())
    }
}

/// Grade transition reported by [`ClockConfidenceTracker::apply_outcome`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GradeChange {
    pub from: ConfidenceGrade,
    pub to: ConfidenceGrade,
}

/// Keeps the time estimate alive and graded across sync attempts.
#[derive(Clone, Debug)]
pub struct ClockConfidenceTracker<I> {
    policy: SyncPolicy,
    estimate: TimeEstimate<I>,
    grade: ConfidenceGrade,
    consecutive_failures: u8,
    ever_synced: bool,
    created_at: I,
    last_tick: I,
    last_attempt: Option<I>,
    last_success: Option<I>,
    sync_requested: bool,
}

impl<I: LocalInstant> ClockConfidenceTracker<I> {
    /// Creates an untrusted tracker whose estimate reads zero at `now`.
    #[must_use]
    pub fn new(policy: SyncPolicy, now: I) -> Self {
        Self {
            policy,
            estimate: TimeEstimate::new(0, now),
            grade: ConfidenceGrade::Untrusted,
            consecutive_failures: 0,
            ever_synced: false,
            created_at: now,
            last_tick: now,
            last_attempt: None,
            last_success: None,
            sync_requested: false,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Moves the tracker's notion of "now" forward.
    ///
    /// The estimate keeps advancing regardless of sync results. Instants older
    /// than the last tick are ignored, so the reading never runs backwards
    /// between syncs.
    pub fn advance(&mut self, now: I) {
        if now > self.last_tick {
            self.last_tick = now;
        }
    }

    /// Returns `true` when a sync attempt should run at `now`.
    #[must_use]
    pub fn sync_due(&self, now: I) -> bool {
        if self.sync_requested {
            return true;
        }

        match self.last_attempt {
            Some(at) => now.saturating_duration_since(at) >= self.policy.interval,
            None if self.policy.sync_on_start => true,
            None => now.saturating_duration_since(self.created_at) >= self.policy.interval,
        }
    }

    /// Forces the next [`Self::sync_due`] check to succeed.
    pub fn request_sync(&mut self) {
        self.sync_requested = true;
    }

    /// Runs one sync attempt and applies its outcome.
    pub fn try_sync<P, C>(&mut self, provider: &mut P, probe: &C, now: I) -> SyncOutcome
    where
        P: TimeProvider + ?Sized,
        C: ConnectivityProbe + ?Sized,
    {
        let outcome = self.attempt(provider, probe);
        self.apply_outcome(outcome, now);
        outcome
    }

    /// Queries the provider without touching tracker state.
    ///
    /// When the probe reports the link down the provider is not called and the
    /// attempt fails with [`SyncFailure::NoConnectivity`].
    pub fn attempt<P, C>(&self, provider: &mut P, probe: &C) -> SyncOutcome
    where
        P: TimeProvider + ?Sized,
        C: ConnectivityProbe + ?Sized,
    {
        if probe.is_up() {
            SyncOutcome::from(provider.fetch(self.policy.timeout))
        } else {
            SyncOutcome::Failure(SyncFailure::NoConnectivity)
        }
    }

    /// Applies a sync outcome that completed at `now`.
    ///
    /// The estimate, failure counter and grade are updated together. A failure
    /// leaves the estimate on its previous anchor.
    pub fn apply_outcome(&mut self, outcome: SyncOutcome, now: I) -> Option<GradeChange> {
        let previous = self.grade;
        self.advance(now);
        self.last_attempt = Some(now);
        self.sync_requested = false;

        match outcome {
            SyncOutcome::Success(unix_secs) => {
                self.estimate = TimeEstimate::new(unix_secs, now);
                self.consecutive_failures = 0;
                self.ever_synced = true;
                self.last_success = Some(now);
            }
            SyncOutcome::Failure(_) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            }
        }

        self.grade = ConfidenceGrade::for_failures(
            self.ever_synced,
            self.consecutive_failures,
            self.policy.precision_loss_budget,
        );

        (self.grade != previous).then_some(GradeChange {
            from: previous,
            to: self.grade,
        })
    }

    #[must_use]
    pub const fn current_grade(&self) -> ConfidenceGrade {
        self.grade
    }

    #[must_use]
    pub const fn current_estimate(&self) -> TimeEstimate<I> {
        self.estimate
    }

    /// Unix seconds as of the last tick.
    #[must_use]
    pub fn current_secs(&self) -> u64 {
        self.estimate.seconds_at(self.last_tick)
    }

    #[must_use]
    pub const fn consecutive_failures(&self) -> u8 {
        self.consecutive_failures
    }

    #[must_use]
    pub const fn ever_synced(&self) -> bool {
        self.ever_synced
    }

    /// Local instant of the most recent successful sync.
    #[must_use]
    pub const fn last_success(&self) -> Option<I> {
        self.last_success
    }

    #[must_use]
    pub const fn last_tick(&self) -> I {
        self.last_tick
    }
}
