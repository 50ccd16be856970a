//! Shared status surface for the console.
//!
//! Each platform fills in a [`StatusSnapshot`] for the `status` command and
//! [`StatusFormatter`] keeps the textual rendering consistent across
//! front-ends.

use core::fmt;
use core::time::Duration;

use crate::clock::ConfidenceGrade;
use crate::indicator::{BlinkPattern, blink_pattern};
use crate::lines::{LineId, line_by_id};
use crate::schedule::RingPolicy;
use crate::telemetry::RingTrigger;
use crate::time::WallTime;

/// Clock section of a status snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockStatus {
    pub grade: ConfidenceGrade,
    pub estimate_secs: u64,
    pub wall_time: WallTime,
    pub ever_synced: bool,
    pub consecutive_failures: u8,
    /// Time since the last successful sync.
    pub since_last_sync: Option<Duration>,
}

/// Relay section of a status snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayStatus {
    pub active: bool,
    pub trigger: Option<RingTrigger>,
    pub remaining: Option<Duration>,
}

impl RelayStatus {
    pub const IDLE: Self = Self {
        active: false,
        trigger: None,
        remaining: None,
    };
}

/// Snapshot of reusable status information surfaced by the REPL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub clock: ClockStatus,
    pub relay: RelayStatus,
    pub led_on: bool,
    pub ring_policy: RingPolicy,
    /// Network link hint, when the platform has one.
    pub link_up: Option<bool>,
}

impl StatusSnapshot {
    #[must_use]
    pub const fn pattern(&self) -> BlinkPattern {
        blink_pattern(self.clock.grade)
    }
}

/// Helper that renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    /// Creates a new formatter for the provided snapshot.
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes the clock line (e.g. `clock grade=trusted time=Sun 09:00:00 failures=0 last-sync=+12.0s`).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_clock_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let clock = &self.snapshot.clock;
        write!(writer, "clock grade={} time=", clock.grade)?;
        if clock.ever_synced {
            write!(writer, "{}", clock.wall_time)?;
        } else {
            writer.write_str("unsynced")?;
        }
        write!(writer, " failures={} last-sync=", clock.consecutive_failures)?;
        write_duration(writer, clock.since_last_sync)?;

        writer.write_str(" link=")?;
        writer.write_str(match self.snapshot.link_up {
            Some(true) => "up",
            Some(false) => "down",
            None => "unknown",
        })
    }

    /// Writes the relay line (e.g. `relay RELAY(PA4)=ringing source=schedule left=+3.2s policy=refuse-untrusted`).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_relay_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let line = line_by_id(LineId::Relay);
        let relay = &self.snapshot.relay;
        write!(writer, "relay {}({})=", line.name, line.mcu_pin)?;
        writer.write_str(if relay.active { "ringing" } else { "idle" })?;

        if let Some(trigger) = relay.trigger {
            write!(writer, " source={}", trigger.label())?;
        }
        if relay.active {
            writer.write_str(" left=")?;
            write_duration(writer, relay.remaining)?;
        }

        write!(writer, " policy={}", self.snapshot.ring_policy.label())
    }

    /// Writes the LED line (e.g. `led LED(PA5)=on pattern=solid`).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_led_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let line = line_by_id(LineId::StatusLed);
        write!(
            writer,
            "led {}({})={} pattern={}",
            line.name,
            line.mcu_pin,
            if self.snapshot.led_on { "on" } else { "off" },
            self.snapshot.pattern().label()
        )
    }
}

fn write_duration<W: fmt::Write>(writer: &mut W, duration: Option<Duration>) -> fmt::Result {
    match duration {
        None => writer.write_str("n/a"),
        Some(value) if value >= Duration::from_secs(1) => {
            let millis = value.as_millis();
            let seconds = millis / 1_000;
            let tenths = (millis % 1_000) / 100;
            write!(writer, "+{seconds}.{tenths}s")
        }
        Some(value) => write!(writer, "+{}ms", value.as_millis()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{LocalZone, Weekday};
    use heapless::String;

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            clock: ClockStatus {
                grade: ConfidenceGrade::Degraded,
                estimate_secs: 1_704_628_795,
                wall_time: LocalZone::SAO_PAULO.wall_time(1_704_628_795),
                ever_synced: true,
                consecutive_failures: 2,
                since_last_sync: Some(Duration::from_millis(5_760_400)),
            },
            relay: RelayStatus {
                active: true,
                trigger: Some(RingTrigger::Schedule),
                remaining: Some(Duration::from_millis(3_250)),
            },
            led_on: false,
            ring_policy: RingPolicy::RefuseUntrusted,
            link_up: Some(false),
        }
    }

    #[test]
    fn renders_clock_line() {
        let snapshot = snapshot();
        assert_eq!(snapshot.clock.wall_time.day, Weekday::Sunday);

        let mut line = String::<128>::new();
        StatusFormatter::new(&snapshot)
            .write_clock_line(&mut line)
            .expect("line fits");
        assert_eq!(
            line.as_str(),
            "clock grade=degraded time=Sun 09:00:00 failures=2 last-sync=+5760.4s link=down"
        );
    }

    #[test]
    fn renders_relay_and_led_lines() {
        let snapshot = snapshot();
        let formatter = StatusFormatter::new(&snapshot);

        let mut relay = String::<128>::new();
        formatter.write_relay_line(&mut relay).expect("line fits");
        assert_eq!(
            relay.as_str(),
            "relay RELAY(PA4)=ringing source=schedule left=+3.2s policy=refuse-untrusted"
        );

        let mut led = String::<64>::new();
        formatter.write_led_line(&mut led).expect("line fits");
        assert_eq!(led.as_str(), "led LED(PA5)=off pattern=slow-blink");
    }

    #[test]
    fn unsynced_clock_hides_wall_time() {
        let mut snapshot = snapshot();
        snapshot.clock.ever_synced = false;
        snapshot.clock.since_last_sync = None;
        snapshot.link_up = None;

        let mut line = String::<128>::new();
        StatusFormatter::new(&snapshot)
            .write_clock_line(&mut line)
            .expect("line fits");
        assert_eq!(
            line.as_str(),
            "clock grade=degraded time=unsynced failures=2 last-sync=n/a link=unknown"
        );
    }
}
