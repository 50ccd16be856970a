#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Operator console for the USB CDC port.
//!
//! Bytes from the host are assembled into lines, parsed with the shared
//! grammar and executed against [`FirmwareConsole`], which forwards work to
//! the tick task instead of touching the controller.

use core::fmt::{self, Write as _};
use core::str;

use bell_core::repl::commands::{
    CommandExecutor, ConsoleError, ConsoleTarget, RingAck, ScheduleListing, SyncAck,
};
use bell_core::repl::status::StatusSnapshot;
use bell_core::schedule::{RingPolicy, ScheduleEntry};
use bell_core::time::LocalZone;
#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use heapless::{String, Vec};

use crate::control::{ControlRequest, ControlSender};
use crate::instant::FirmwareInstant;
use crate::status;

/// Maximum number of bytes accepted on a single console line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;

/// Payload size of a console frame, one USB packet.
pub const CONSOLE_FRAME_SIZE: usize = 64;

/// Depth of each console frame queue.
pub const CONSOLE_QUEUE_DEPTH: usize = 8;

/// Room for the longest reply (`help` or `status`).
pub const MAX_REPLY_LEN: usize = 512;

pub const PROMPT: &str = "> ";

#[cfg(target_os = "none")]
type ConsoleMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type ConsoleMutex = NoopRawMutex;

/// Chunk of console bytes moved between the USB and console tasks.
pub type ConsoleFrame = Vec<u8, CONSOLE_FRAME_SIZE>;

pub type ConsoleQueue = Channel<ConsoleMutex, ConsoleFrame, CONSOLE_QUEUE_DEPTH>;

/// Console reply buffer.
pub type Reply = String<MAX_REPLY_LEN>;

/// Errors raised while assembling a line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineError {
    /// Input exceeded [`MAX_LINE_LEN`]; the partial line was dropped.
    Overflow,
    /// The line was not valid UTF-8.
    InvalidUtf8,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineError::Overflow => write!(f, "line longer than {MAX_LINE_LEN} bytes"),
            LineError::InvalidUtf8 => f.write_str("line is not valid UTF-8"),
        }
    }
}

/// Collects bytes until a line terminator arrives.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: Vec<u8, MAX_LINE_LEN>,
    overflowed: bool,
}

impl LineAssembler {
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            overflowed: false,
        }
    }

    /// Feeds one byte. Returns `true` when a line is complete.
    ///
    /// Bytes after an overflow are discarded until the next terminator, which
    /// then reports [`LineError::Overflow`] from [`LineAssembler::take_line`].
    pub fn push(&mut self, byte: u8) -> bool {
        match byte {
            b'\r' | b'\n' => return self.overflowed || !self.buffer.is_empty(),
            0x08 | 0x7f => {
                self.buffer.pop();
            }
            value => {
                if self.buffer.push(value).is_err() {
                    self.overflowed = true;
                }
            }
        }
        false
    }

    /// Returns the completed line and resets for the next one.
    pub fn take_line(&mut self) -> Result<String<MAX_LINE_LEN>, LineError> {
        let overflowed = core::mem::take(&mut self.overflowed);
        let bytes = core::mem::take(&mut self.buffer);
        if overflowed {
            return Err(LineError::Overflow);
        }
        String::from_utf8(bytes).map_err(|_| LineError::InvalidUtf8)
    }
}

/// Console target that forwards requests to the tick task.
pub struct FirmwareConsole<'a> {
    requests: ControlSender<'a>,
    schedule: &'a [ScheduleEntry],
    zone: LocalZone,
    policy: RingPolicy,
}

impl<'a> FirmwareConsole<'a> {
    pub fn new(
        requests: ControlSender<'a>,
        schedule: &'a [ScheduleEntry],
        zone: LocalZone,
        policy: RingPolicy,
    ) -> Self {
        Self {
            requests,
            schedule,
            zone,
            policy,
        }
    }

    fn enqueue(&self, request: ControlRequest) -> Result<(), ConsoleError> {
        match self.requests.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ConsoleError::Busy),
        }
    }
}

impl ConsoleTarget for FirmwareConsole<'_> {
    type Instant = FirmwareInstant;

    fn ring(&mut self, _now: FirmwareInstant) -> Result<RingAck, ConsoleError> {
        self.enqueue(ControlRequest::Ring)?;
        Ok(RingAck::Queued)
    }

    fn sync(&mut self) -> Result<SyncAck, ConsoleError> {
        self.enqueue(ControlRequest::Sync)?;
        Ok(SyncAck::Queued)
    }

    fn status(&mut self, now: FirmwareInstant) -> Result<StatusSnapshot, ConsoleError> {
        status::snapshot(now, self.zone, self.policy).ok_or(ConsoleError::Unavailable)
    }

    fn schedule(&self) -> ScheduleListing {
        let mut listing = ScheduleListing::new();
        for entry in self.schedule {
            if listing.push(*entry).is_err() {
                break;
            }
        }
        listing
    }
}

/// Line-oriented console session bound to the CDC port.
pub struct ConsoleSession<'a> {
    assembler: LineAssembler,
    executor: CommandExecutor<FirmwareConsole<'a>>,
}

impl<'a> ConsoleSession<'a> {
    pub fn new(console: FirmwareConsole<'a>) -> Self {
        Self {
            assembler: LineAssembler::new(),
            executor: CommandExecutor::new(console),
        }
    }

    /// Feeds received bytes and appends any replies to `reply`.
    ///
    /// A reply that does not fit is cut short; the next prompt is still
    /// written when there is room.
    pub fn ingest(&mut self, bytes: &[u8], now: FirmwareInstant, reply: &mut Reply) {
        for &byte in bytes {
            if self.assembler.push(byte) {
                let line = self.assembler.take_line();
                // A full buffer only truncates the reply.
                let _ = self.respond(line.as_deref().map_err(|err| *err), now, reply);
            }
        }
    }

    fn respond(
        &mut self,
        line: Result<&str, LineError>,
        now: FirmwareInstant,
        reply: &mut Reply,
    ) -> fmt::Result {
        reply.write_str("\r\n")?;
        match line {
            Ok(line) => match self.executor.execute(line, now) {
                Ok(outcome) => {
                    let mut text = Reply::new();
                    let written = outcome.write_reply(&mut text);
                    write_crlf(reply, &text)?;
                    written?;
                }
                Err(err) => write!(reply, "ERR {err}\r\n")?,
            },
            Err(err) => write!(reply, "ERR {err}\r\n")?,
        }
        reply.write_str(PROMPT)
    }
}

fn write_crlf(out: &mut Reply, text: &str) -> fmt::Result {
    for line in text.lines() {
        out.write_str(line)?;
        out.write_str("\r\n")?;
    }
    Ok(())
}
