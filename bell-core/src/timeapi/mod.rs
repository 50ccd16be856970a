//! HTTP time service client helpers.
//!
//! The network stack lives outside the core. This module only renders the
//! request and pulls the `"unixtime"` field out of the reply, so the firmware
//! and emulator providers share one parser.
//!
//! [`UnixTimeScanner`] consumes the reply a byte at a time and keeps no copy of
//! it. Bytes before the first `HTTP/` status line are discarded, so the tail of
//! an abandoned earlier reply can never be read as the current time.

use core::fmt;

use crate::clock::SyncFailure;

const STATUS_MARKER: &[u8] = b"HTTP/";
const UNIX_TIME_KEY: &[u8] = b"\"unixtime\"";
const STATUS_DIGITS: u8 = 3;

/// Server, port and resource queried for the current time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimeApiEndpoint {
    pub host: &'static str,
    pub port: u16,
    pub path: &'static str,
}

/// Public worldtimeapi.org endpoint for the deployment's zone.
pub const WORLD_TIME_API: TimeApiEndpoint = TimeApiEndpoint {
    host: "worldtimeapi.org",
    port: 80,
    path: "/api/timezone/America/Sao_Paulo",
};

impl Default for TimeApiEndpoint {
    fn default() -> Self {
        WORLD_TIME_API
    }
}

/// Reasons a reply could not be turned into a timestamp.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimeApiError {
    /// No well-formed status line was received.
    MissingStatus,
    /// The server answered with a non-2xx status.
    HttpStatus(u16),
    /// No complete `"unixtime"` field followed the status line.
    MissingUnixTime,
}

impl fmt::Display for TimeApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeApiError::MissingStatus => f.write_str("response carries no HTTP status line"),
            TimeApiError::HttpStatus(code) => write!(f, "time server returned HTTP {code}"),
            TimeApiError::MissingUnixTime => f.write_str("response carries no unixtime field"),
        }
    }
}

impl From<TimeApiError> for SyncFailure {
    fn from(_: TimeApiError) -> Self {
        SyncFailure::MalformedResponse
    }
}

/// Renders the GET request for `endpoint`.
///
/// # Errors
///
/// Propagates failures from the underlying writer, typically a full buffer.
pub fn write_request<W: fmt::Write>(out: &mut W, endpoint: &TimeApiEndpoint) -> fmt::Result {
    write!(out, "GET {} HTTP/1.1\r\n", endpoint.path)?;
    write!(out, "Host: {}\r\n", endpoint.host)?;
    out.write_str("Connection: close\r\n\r\n")
}

/// Extracts Unix seconds from a complete reply.
///
/// # Errors
///
/// Returns [`TimeApiError`] when the status line is missing or not 2xx, or
/// when the field is absent or cut off.
pub fn parse_unix_time(response: &str) -> Result<u64, TimeApiError> {
    let mut scanner = UnixTimeScanner::new();
    scanner
        .feed(response.as_bytes())
        .unwrap_or_else(|| scanner.finish())
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase {
    /// Discarding bytes until a status line starts.
    Status,
    /// Skipping the protocol version after `HTTP/`.
    Version,
    Code,
    /// Looking for the key anywhere after the status line.
    Key,
    Separator { colon: bool },
    Value,
    Settled(Result<u64, TimeApiError>),
}

/// Incremental `"unixtime"` extractor.
#[derive(Clone, Debug)]
pub struct UnixTimeScanner {
    phase: Phase,
    matched: usize,
    digits: u8,
    number: u64,
}

impl Default for UnixTimeScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl UnixTimeScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: Phase::Status,
            matched: 0,
            digits: 0,
            number: 0,
        }
    }

    /// `true` until the start of a status line has been seen.
    #[must_use]
    pub fn awaiting_status(&self) -> bool {
        self.phase == Phase::Status
    }

    /// Feeds a chunk, returning the result once the bytes so far settle it.
    pub fn feed(&mut self, bytes: &[u8]) -> Option<Result<u64, TimeApiError>> {
        bytes.iter().find_map(|&byte| self.push(byte))
    }

    /// Feeds one byte. Once settled, the same result is returned for every
    /// later byte.
    pub fn push(&mut self, byte: u8) -> Option<Result<u64, TimeApiError>> {
        self.phase = match self.phase {
            Phase::Settled(result) => return Some(result),
            Phase::Status => {
                if match_marker(&mut self.matched, STATUS_MARKER, byte) {
                    Phase::Version
                } else {
                    Phase::Status
                }
            }
            Phase::Version => match byte {
                b' ' => {
                    self.digits = 0;
                    self.number = 0;
                    Phase::Code
                }
                b'\r' | b'\n' => Phase::Settled(Err(TimeApiError::MissingStatus)),
                _ => Phase::Version,
            },
            Phase::Code => self.status_code(byte),
            Phase::Key => {
                if match_marker(&mut self.matched, UNIX_TIME_KEY, byte) {
                    Phase::Separator { colon: false }
                } else {
                    Phase::Key
                }
            }
            Phase::Separator { colon } => match byte {
                b' ' | b'\t' | b'\r' | b'\n' => Phase::Separator { colon },
                b':' if !colon => Phase::Separator { colon: true },
                b'0'..=b'9' if colon => {
                    self.number = u64::from(byte - b'0');
                    Phase::Value
                }
                _ => Phase::Settled(Err(TimeApiError::MissingUnixTime)),
            },
            Phase::Value => match byte {
                b'0'..=b'9' => self
                    .number
                    .checked_mul(10)
                    .and_then(|value| value.checked_add(u64::from(byte - b'0')))
                    .map_or(Phase::Settled(Err(TimeApiError::MissingUnixTime)), |value| {
                        self.number = value;
                        Phase::Value
                    }),
                b',' | b'}' | b' ' | b'\t' | b'\r' | b'\n' => Phase::Settled(Ok(self.number)),
                _ => Phase::Settled(Err(TimeApiError::MissingUnixTime)),
            },
        };

        match self.phase {
            Phase::Settled(result) => Some(result),
            _ => None,
        }
    }

    /// Result for a reply that ended, or stopped arriving, at this point.
    ///
    /// A reply cut off mid-number is reported as missing rather than as a
    /// short value.
    #[must_use]
    pub fn finish(&self) -> Result<u64, TimeApiError> {
        match self.phase {
            Phase::Settled(result) => result,
            Phase::Status | Phase::Version | Phase::Code => Err(TimeApiError::MissingStatus),
            Phase::Key | Phase::Separator { .. } | Phase::Value => {
                Err(TimeApiError::MissingUnixTime)
            }
        }
    }

    fn status_code(&mut self, byte: u8) -> Phase {
        if byte.is_ascii_digit() && self.digits < STATUS_DIGITS {
            self.number = self.number * 10 + u64::from(byte - b'0');
            self.digits += 1;
            return Phase::Code;
        }
        if self.digits < STATUS_DIGITS {
            return Phase::Settled(Err(TimeApiError::MissingStatus));
        }

        let code = u16::try_from(self.number).unwrap_or(u16::MAX);
        if (200..300).contains(&code) {
            self.matched = 0;
            Phase::Key
        } else {
            Phase::Settled(Err(TimeApiError::HttpStatus(code)))
        }
    }
}

/// Advances a running match of `marker`, returning `true` when it completes.
///
/// No partial match of either marker ends in a longer prefix of it, so
/// restarting on the first byte finds every occurrence.
fn match_marker(matched: &mut usize, marker: &[u8], byte: u8) -> bool {
    *matched = if byte == marker[*matched] {
        *matched + 1
    } else {
        usize::from(byte == marker[0])
    };
    if *matched == marker.len() {
        *matched = 0;
        true
    } else {
        false
    }
}
