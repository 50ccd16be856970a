#![allow(dead_code)]

use core::ops::Add;
use core::time::Duration;

use bell_core::actuator::OutputLine;
use bell_core::clock::{SyncFailure, TimeProvider};
use bell_core::time::LocalInstant;
use heapless::Vec as HeaplessVec;

/// Millisecond instant driven by the test.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MockInstant(pub u64);

impl MockInstant {
    pub fn secs(value: u64) -> Self {
        Self(value * 1_000)
    }

    pub fn millis(value: u64) -> Self {
        Self(value)
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

/// Output line that remembers every level it was driven to.
pub struct RecordingLine {
    pub level: bool,
    pub history: HeaplessVec<bool, 64>,
}

impl RecordingLine {
    /// Starts in `level`, standing in for whatever the pin held before boot.
    pub fn starting(level: bool) -> Self {
        Self {
            level,
            history: HeaplessVec::new(),
        }
    }
}

impl OutputLine for RecordingLine {
    fn drive(&mut self, level: bool) {
        self.level = level;
        let _ = self.history.push(level);
    }
}

/// Provider answering every fetch with the same result.
pub struct ScriptedProvider {
    pub result: Result<u64, SyncFailure>,
    pub calls: usize,
}

impl ScriptedProvider {
    pub fn new(result: Result<u64, SyncFailure>) -> Self {
        Self { result, calls: 0 }
    }
}

impl TimeProvider for ScriptedProvider {
    fn fetch(&mut self, _timeout: Duration) -> Result<u64, SyncFailure> {
        self.calls += 1;
        self.result
    }
}

/// Unix seconds reading Sunday 09:00:00 on the default zone (UTC-3, five second lead).
pub const SUNDAY_NINE: u64 = 1_704_628_795;
