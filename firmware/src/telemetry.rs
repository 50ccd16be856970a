//! Log helpers for controller telemetry.
//!
//! The tick task drains new records from the controller's ring after every
//! tick and mirrors them to defmt on the target or stdout on the host.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::{self, Write as _};

use bell_core::telemetry::{EventId, TelemetryPayload, TelemetryRecord, TelemetryRecorder};
use heapless::String;

use crate::instant::FirmwareInstant;

/// Longest rendered record.
const LINE_CAPACITY: usize = 128;

/// Forwards records newer than the last drained id to the log.
#[derive(Debug, Default)]
pub struct TelemetryDrain {
    next: EventId,
}

impl TelemetryDrain {
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Logs every record at or after the cursor and advances it.
    ///
    /// Records overwritten in the ring before they were drained are lost.
    pub fn drain(&mut self, telemetry: &TelemetryRecorder<FirmwareInstant>) -> usize {
        let mut logged = 0;
        for record in telemetry.since(self.next) {
            log_record(record);
            logged += 1;
        }
        self.next = telemetry.next_id();
        logged
    }
}

/// Renders a record as `#<id> <event> <details>`.
pub fn describe(record: &TelemetryRecord<FirmwareInstant>) -> String<LINE_CAPACITY> {
    let mut line = String::new();
    // A full buffer only truncates the line.
    let _ = write_record(&mut line, record);
    line
}

fn write_record<W: fmt::Write>(out: &mut W, record: &TelemetryRecord<FirmwareInstant>) -> fmt::Result {
    write!(out, "#{} {}", record.id, record.event)?;
    match record.details {
        TelemetryPayload::None => Ok(()),
        TelemetryPayload::Sync(sync) => {
            write!(
                out,
                " estimate={} failures={}",
                sync.estimate_secs, sync.consecutive_failures
            )?;
            match sync.correction_secs {
                Some(correction) => write!(out, " correction={correction:+}s"),
                None => Ok(()),
            }
        }
        TelemetryPayload::Grade(grade) => write!(out, " {} -> {}", grade.from, grade.to),
        TelemetryPayload::Ring(ring) => {
            write!(out, " grade={}", ring.grade)?;
            if let Some(entry) = ring.entry {
                write!(out, " entry={entry}")?;
            }
            match ring.held_for {
                Some(held) => write!(out, " held={}ms", held.as_millis()),
                None => Ok(()),
            }
        }
    }
}

fn log_record(record: &TelemetryRecord<FirmwareInstant>) {
    let line = describe(record);
    emit_log(line.as_str(), record.timestamp.as_micros());
}

#[cfg(target_os = "none")]
fn emit_log(line: &str, timestamp_us: u64) {
    defmt::info!("telemetry {} t={}us", line, timestamp_us);
}

#[cfg(not(target_os = "none"))]
fn emit_log(line: &str, timestamp_us: u64) {
    println!("telemetry {line} t={timestamp_us}us");
}
