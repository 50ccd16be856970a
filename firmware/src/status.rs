#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The tick task publishes the controller's state after every tick and the
//! console task rebuilds a [`StatusSnapshot`] from these atomics without
//! touching the controller itself.

use core::time::Duration;

use bell_core::clock::ConfidenceGrade;
use bell_core::repl::status::{ClockStatus, RelayStatus, StatusSnapshot};
use bell_core::schedule::RingPolicy;
use bell_core::telemetry::RingTrigger;
use bell_core::time::{LocalInstant, LocalZone};
use portable_atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use crate::instant::FirmwareInstant;

const NO_TRIGGER: u8 = 0;
const SCHEDULE_TRIGGER: u8 = 1;
const MANUAL_TRIGGER: u8 = 2;

/// Set once the tick task has published at least one snapshot.
static PUBLISHED: AtomicBool = AtomicBool::new(false);
/// Instant (µs) of the last publish.
static PUBLISHED_MICROS: AtomicU64 = AtomicU64::new(0);
static GRADE: AtomicU8 = AtomicU8::new(0);
static FAILURES: AtomicU8 = AtomicU8::new(0);
static EVER_SYNCED: AtomicBool = AtomicBool::new(false);
/// Unix seconds the controller believed at the last publish.
static ESTIMATE_SECS: AtomicU64 = AtomicU64::new(0);
/// Instant (µs, +1) of the last successful sync.
static LAST_SYNC_MICROS: AtomicU64 = AtomicU64::new(0);
static RELAY_TRIGGER: AtomicU8 = AtomicU8::new(NO_TRIGGER);
/// Instant (µs) the active ring releases.
static RELAY_RELEASE_MICROS: AtomicU64 = AtomicU64::new(0);
static LED_ON: AtomicBool = AtomicBool::new(false);
static LINK_UP: AtomicBool = AtomicBool::new(false);

fn encode_micros(micros: u64) -> u64 {
    micros.saturating_add(1)
}

fn decode_micros(raw: u64) -> Option<u64> {
    raw.checked_sub(1)
}

fn micros_since(now: FirmwareInstant, micros: u64) -> Duration {
    now.saturating_duration_since(FirmwareInstant::from_micros(micros))
}

fn encode_trigger(trigger: Option<RingTrigger>) -> u8 {
    match trigger {
        None => NO_TRIGGER,
        Some(RingTrigger::Schedule) => SCHEDULE_TRIGGER,
        Some(RingTrigger::Manual) => MANUAL_TRIGGER,
    }
}

fn decode_trigger(raw: u8) -> Option<RingTrigger> {
    match raw {
        SCHEDULE_TRIGGER => Some(RingTrigger::Schedule),
        MANUAL_TRIGGER => Some(RingTrigger::Manual),
        _ => None,
    }
}

/// Stores the snapshot the tick task captured at `at`.
pub fn publish(snapshot: &StatusSnapshot, at: FirmwareInstant) {
    let at_micros = at.as_micros();
    let clock = &snapshot.clock;

    GRADE.store(clock.grade.to_raw(), Ordering::Relaxed);
    FAILURES.store(clock.consecutive_failures, Ordering::Relaxed);
    EVER_SYNCED.store(clock.ever_synced, Ordering::Relaxed);
    ESTIMATE_SECS.store(clock.estimate_secs, Ordering::Relaxed);

    let last_sync = clock.since_last_sync.map_or(0, |since| {
        let since = u64::try_from(since.as_micros()).unwrap_or(u64::MAX);
        encode_micros(at_micros.saturating_sub(since))
    });
    LAST_SYNC_MICROS.store(last_sync, Ordering::Relaxed);

    let trigger = if snapshot.relay.active {
        snapshot.relay.trigger
    } else {
        None
    };
    RELAY_TRIGGER.store(encode_trigger(trigger), Ordering::Relaxed);
    let release = snapshot.relay.remaining.map_or(at_micros, |remaining| {
        let remaining = u64::try_from(remaining.as_micros()).unwrap_or(u64::MAX);
        at_micros.saturating_add(remaining)
    });
    RELAY_RELEASE_MICROS.store(release, Ordering::Relaxed);

    LED_ON.store(snapshot.led_on, Ordering::Relaxed);
    PUBLISHED_MICROS.store(at_micros, Ordering::Relaxed);
    PUBLISHED.store(true, Ordering::Release);
}

/// Updates the cached link-ready level.
pub fn set_link_up(up: bool) {
    LINK_UP.store(up, Ordering::Relaxed);
}

/// Rebuilds a [`StatusSnapshot`] as of `now`, or `None` before the first tick.
pub fn snapshot(now: FirmwareInstant, zone: LocalZone, policy: RingPolicy) -> Option<StatusSnapshot> {
    if !PUBLISHED.load(Ordering::Acquire) {
        return None;
    }

    let published = PUBLISHED_MICROS.load(Ordering::Relaxed);
    let estimate_secs = ESTIMATE_SECS
        .load(Ordering::Relaxed)
        .saturating_add(micros_since(now, published).as_secs());
    let grade = ConfidenceGrade::from_raw(GRADE.load(Ordering::Relaxed))
        .unwrap_or(ConfidenceGrade::Untrusted);

    let clock = ClockStatus {
        grade,
        estimate_secs,
        wall_time: zone.wall_time(estimate_secs),
        ever_synced: EVER_SYNCED.load(Ordering::Relaxed),
        consecutive_failures: FAILURES.load(Ordering::Relaxed),
        since_last_sync: decode_micros(LAST_SYNC_MICROS.load(Ordering::Relaxed))
            .map(|micros| micros_since(now, micros)),
    };

    let relay = match decode_trigger(RELAY_TRIGGER.load(Ordering::Relaxed)) {
        None => RelayStatus::IDLE,
        Some(trigger) => {
            let release = FirmwareInstant::from_micros(RELAY_RELEASE_MICROS.load(Ordering::Relaxed));
            RelayStatus {
                active: true,
                trigger: Some(trigger),
                remaining: Some(release.saturating_duration_since(now)),
            }
        }
    };

    Some(StatusSnapshot {
        clock,
        relay,
        led_on: LED_ON.load(Ordering::Relaxed),
        ring_policy: policy,
        link_up: Some(LINK_UP.load(Ordering::Relaxed)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bell_core::time::WallTime;

    #[test]
    fn publish_then_snapshot_ages_the_readings() {
        let at = FirmwareInstant::from_micros(10_000_000);
        let zone = LocalZone::UTC;
        let published = StatusSnapshot {
            clock: ClockStatus {
                grade: ConfidenceGrade::Degraded,
                estimate_secs: 1_000,
                wall_time: zone.wall_time(1_000),
                ever_synced: true,
                consecutive_failures: 2,
                since_last_sync: Some(Duration::from_secs(4)),
            },
            relay: RelayStatus {
                active: true,
                trigger: Some(RingTrigger::Manual),
                remaining: Some(Duration::from_secs(3)),
            },
            led_on: true,
            ring_policy: RingPolicy::RefuseUntrusted,
            link_up: None,
        };

        assert!(snapshot(at, zone, RingPolicy::Always).is_none());

        publish(&published, at);
        set_link_up(true);

        let later = at + Duration::from_secs(2);
        let seen = snapshot(later, zone, RingPolicy::Always).expect("published");
        assert_eq!(seen.clock.grade, ConfidenceGrade::Degraded);
        assert_eq!(seen.clock.estimate_secs, 1_002);
        assert_eq!(seen.clock.wall_time, WallTime::from_local_seconds(1_002));
        assert_eq!(seen.clock.since_last_sync, Some(Duration::from_secs(6)));
        assert_eq!(seen.relay.trigger, Some(RingTrigger::Manual));
        assert_eq!(seen.relay.remaining, Some(Duration::from_secs(1)));
        assert_eq!(seen.ring_policy, RingPolicy::Always);
        assert_eq!(seen.link_up, Some(true));
    }

    #[test]
    fn trigger_codes_round_trip() {
        for trigger in [None, Some(RingTrigger::Schedule), Some(RingTrigger::Manual)] {
            assert_eq!(decode_trigger(encode_trigger(trigger)), trigger);
        }
    }
}
