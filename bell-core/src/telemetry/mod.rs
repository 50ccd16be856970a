//! Telemetry event catalog and payload structures shared by firmware and host targets.
//!
//! The controller records every sync attempt, grade transition, and relay
//! action into a bounded ring. Event kinds serialize to compact numeric codes
//! for transport over diagnostics channels. Payloads carry the extra metadata
//! the REPL and transcript tooling print while remaining `no_std` compatible.

use core::{fmt, time::Duration};

use heapless::HistoryBuf;

use crate::actuator::RingSource;
use crate::clock::{ConfidenceGrade, SyncFailure};
use crate::schedule::ScheduleEntry;
use crate::time::LocalInstant;

/// Identifier used when tracking emitted telemetry events.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Coarse origin of a ring request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RingTrigger {
    Schedule,
    Manual,
}

impl RingTrigger {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            RingTrigger::Schedule => "schedule",
            RingTrigger::Manual => "manual",
        }
    }
}

impl From<RingSource> for RingTrigger {
    fn from(source: RingSource) -> Self {
        match source {
            RingSource::Schedule(_) => RingTrigger::Schedule,
            RingSource::Manual => RingTrigger::Manual,
        }
    }
}

/// Discriminated telemetry events shared across all controller targets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    SyncSucceeded,
    SyncFailed(SyncFailure),
    GradeChanged,
    RingStarted(RingTrigger),
    RingReleased,
    RingIgnored(RingTrigger),
    RingWithheld,
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::SyncSucceeded => f.write_str("sync-succeeded"),
            TelemetryEventKind::SyncFailed(reason) => write!(f, "sync-failed {reason}"),
            TelemetryEventKind::GradeChanged => f.write_str("grade-changed"),
            TelemetryEventKind::RingStarted(trigger) => {
                write!(f, "ring-started {}", trigger.label())
            }
            TelemetryEventKind::RingReleased => f.write_str("ring-released"),
            TelemetryEventKind::RingIgnored(trigger) => {
                write!(f, "ring-ignored {}", trigger.label())
            }
            TelemetryEventKind::RingWithheld => f.write_str("ring-withheld"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    const SYNC_SUCCEEDED_CODE: u16 = 0x0000;
    const SYNC_FAILED_BASE: u16 = 0x0001;
    const GRADE_CHANGED_CODE: u16 = 0x0008;
    const RING_STARTED_BASE: u16 = 0x0010;
    const RING_RELEASED_CODE: u16 = 0x0012;
    const RING_IGNORED_BASE: u16 = 0x0014;
    const RING_WITHHELD_CODE: u16 = 0x0016;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::SyncSucceeded => Self::SYNC_SUCCEEDED_CODE,
            TelemetryEventKind::SyncFailed(reason) => {
                Self::SYNC_FAILED_BASE + failure_index(reason)
            }
            TelemetryEventKind::GradeChanged => Self::GRADE_CHANGED_CODE,
            TelemetryEventKind::RingStarted(trigger) => {
                Self::RING_STARTED_BASE + trigger_index(trigger)
            }
            TelemetryEventKind::RingReleased => Self::RING_RELEASED_CODE,
            TelemetryEventKind::RingIgnored(trigger) => {
                Self::RING_IGNORED_BASE + trigger_index(trigger)
            }
            TelemetryEventKind::RingWithheld => Self::RING_WITHHELD_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant into a telemetry event, falling back to [`TelemetryEventKind::Custom`].
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        match code {
            Self::SYNC_SUCCEEDED_CODE => TelemetryEventKind::SyncSucceeded,
            Self::GRADE_CHANGED_CODE => TelemetryEventKind::GradeChanged,
            Self::RING_RELEASED_CODE => TelemetryEventKind::RingReleased,
            Self::RING_WITHHELD_CODE => TelemetryEventKind::RingWithheld,
            value if (Self::SYNC_FAILED_BASE..Self::GRADE_CHANGED_CODE).contains(&value) => {
                u8::try_from(value - Self::SYNC_FAILED_BASE)
                    .ok()
                    .and_then(SyncFailure::from_raw)
                    .map_or(TelemetryEventKind::Custom(value), |reason| {
                        TelemetryEventKind::SyncFailed(reason)
                    })
            }
            value if (Self::RING_STARTED_BASE..Self::RING_RELEASED_CODE).contains(&value) => {
                trigger_from_index(value - Self::RING_STARTED_BASE)
                    .map_or(TelemetryEventKind::Custom(value), |trigger| {
                        TelemetryEventKind::RingStarted(trigger)
                    })
            }
            value if (Self::RING_IGNORED_BASE..Self::RING_WITHHELD_CODE).contains(&value) => {
                trigger_from_index(value - Self::RING_IGNORED_BASE)
                    .map_or(TelemetryEventKind::Custom(value), |trigger| {
                        TelemetryEventKind::RingIgnored(trigger)
                    })
            }
            other => TelemetryEventKind::Custom(other),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    /// Details describing a sync attempt.
    Sync(SyncTelemetry),
    /// Grade transition.
    Grade(GradeTelemetry),
    /// Relay activity.
    Ring(RingTelemetry),
}

/// Sync attempt payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SyncTelemetry {
    /// Unix seconds after the attempt.
    pub estimate_secs: u64,
    /// Seconds the estimate moved on success; positive when it jumped forward.
    pub correction_secs: Option<i64>,
    pub consecutive_failures: u8,
}

/// Grade transition payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GradeTelemetry {
    pub from: ConfidenceGrade,
    pub to: ConfidenceGrade,
}

/// Relay activity payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RingTelemetry {
    pub entry: Option<ScheduleEntry>,
    pub held_for: Option<Duration>,
    pub grade: ConfidenceGrade,
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<I>
where
    I: Copy,
{
    pub id: EventId,
    pub timestamp: I,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<I, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<I>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<I, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    I: Copy,
{
    ring: TelemetryRing<I, CAPACITY>,
    next_event_id: EventId,
}

impl<I, const CAPACITY: usize> TelemetryRecorder<I, CAPACITY>
where
    I: LocalInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &TelemetryRecord<I>> + '_ {
        self.ring.oldest_ordered()
    }

    /// Returns records with an id at or after `first`, oldest first.
    ///
    /// Lets a log drain pick up where it stopped without owning the ring.
    pub fn since(&self, first: EventId) -> impl Iterator<Item = &TelemetryRecord<I>> + '_ {
        self.ring
            .oldest_ordered()
            .filter(move |record| record.id >= first)
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<I>> {
        self.ring.recent()
    }

    /// Id the next record will receive.
    pub const fn next_id(&self) -> EventId {
        self.next_event_id
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records a successful sync.
    pub fn record_sync_success(
        &mut self,
        estimate_secs: u64,
        correction_secs: i64,
        timestamp: I,
    ) -> EventId {
        self.record(
            TelemetryEventKind::SyncSucceeded,
            TelemetryPayload::Sync(SyncTelemetry {
                estimate_secs,
                correction_secs: Some(correction_secs),
                consecutive_failures: 0,
            }),
            timestamp,
        )
    }

    /// Records a failed sync with the running failure count.
    pub fn record_sync_failure(
        &mut self,
        reason: SyncFailure,
        estimate_secs: u64,
        consecutive_failures: u8,
        timestamp: I,
    ) -> EventId {
        self.record(
            TelemetryEventKind::SyncFailed(reason),
            TelemetryPayload::Sync(SyncTelemetry {
                estimate_secs,
                correction_secs: None,
                consecutive_failures,
            }),
            timestamp,
        )
    }

    /// Records a confidence grade transition.
    pub fn record_grade_change(
        &mut self,
        from: ConfidenceGrade,
        to: ConfidenceGrade,
        timestamp: I,
    ) -> EventId {
        self.record(
            TelemetryEventKind::GradeChanged,
            TelemetryPayload::Grade(GradeTelemetry { from, to }),
            timestamp,
        )
    }

    /// Records the start of a ring.
    pub fn record_ring_started(
        &mut self,
        source: RingSource,
        grade: ConfidenceGrade,
        timestamp: I,
    ) -> EventId {
        self.record(
            TelemetryEventKind::RingStarted(source.into()),
            TelemetryPayload::Ring(RingTelemetry {
                entry: scheduled_entry(source),
                held_for: None,
                grade,
            }),
            timestamp,
        )
    }

    /// Records the relay release and how long it was held.
    pub fn record_ring_released(
        &mut self,
        source: RingSource,
        held_for: Duration,
        grade: ConfidenceGrade,
        timestamp: I,
    ) -> EventId {
        self.record(
            TelemetryEventKind::RingReleased,
            TelemetryPayload::Ring(RingTelemetry {
                entry: scheduled_entry(source),
                held_for: Some(held_for),
                grade,
            }),
            timestamp,
        )
    }

    /// Records a ring request dropped because a ring was in progress.
    pub fn record_ring_ignored(
        &mut self,
        source: RingSource,
        grade: ConfidenceGrade,
        timestamp: I,
    ) -> EventId {
        self.record(
            TelemetryEventKind::RingIgnored(source.into()),
            TelemetryPayload::Ring(RingTelemetry {
                entry: scheduled_entry(source),
                held_for: None,
                grade,
            }),
            timestamp,
        )
    }

    /// Records a scheduled ring refused by the ring policy.
    pub fn record_ring_withheld(
        &mut self,
        entry: ScheduleEntry,
        grade: ConfidenceGrade,
        timestamp: I,
    ) -> EventId {
        self.record(
            TelemetryEventKind::RingWithheld,
            TelemetryPayload::Ring(RingTelemetry {
                entry: Some(entry),
                held_for: None,
                grade,
            }),
            timestamp,
        )
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: I,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

impl<I, const CAPACITY: usize> Default for TelemetryRecorder<I, CAPACITY>
where
    I: LocalInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

const fn scheduled_entry(source: RingSource) -> Option<ScheduleEntry> {
    match source {
        RingSource::Schedule(entry) => Some(entry),
        RingSource::Manual => None,
    }
}

const fn failure_index(reason: SyncFailure) -> u16 {
    match reason {
        SyncFailure::NoConnectivity => 0,
        SyncFailure::ConnectFailed => 1,
        SyncFailure::Timeout => 2,
        SyncFailure::MalformedResponse => 3,
    }
}

const fn trigger_index(trigger: RingTrigger) -> u16 {
    match trigger {
        RingTrigger::Schedule => 0,
        RingTrigger::Manual => 1,
    }
}

fn trigger_from_index(index: u16) -> Option<RingTrigger> {
    match index {
        0 => Some(RingTrigger::Schedule),
        1 => Some(RingTrigger::Manual),
        _ => None,
    }
}
