//! WiFi coprocessor link used as the time provider.
//!
//! The coprocessor owns the network connection. The firmware writes a plain
//! HTTP request over the UART and reads back whatever the server answered, or
//! an `ERROR` line when the coprocessor could not connect.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use bell_core::clock::SyncFailure;
use bell_core::timeapi::UnixTimeScanner;

const ERROR_MARKER: &[u8] = b"ERROR";

/// Judges one coprocessor reply as its bytes arrive.
///
/// An `ERROR` line before any status line means the coprocessor could not
/// connect. Everything else goes to the time API scanner, which needs no
/// buffer however long the headers are.
pub struct ReplyReader {
    scanner: UnixTimeScanner,
    error_matched: usize,
    received: bool,
}

impl ReplyReader {
    pub const fn new() -> Self {
        Self {
            scanner: UnixTimeScanner::new(),
            error_matched: 0,
            received: false,
        }
    }

    /// Returns the outcome once the bytes so far settle it.
    pub fn feed(&mut self, bytes: &[u8]) -> Option<Result<u64, SyncFailure>> {
        for &byte in bytes {
            self.received = true;
            if self.scanner.awaiting_status() && self.error_line(byte) {
                return Some(Err(SyncFailure::ConnectFailed));
            }
            if let Some(result) = self.scanner.push(byte) {
                return Some(result.map_err(SyncFailure::from));
            }
        }
        None
    }

    /// Outcome for a reply that stopped arriving. Silence is a timeout.
    pub fn finish(&self) -> Result<u64, SyncFailure> {
        if self.received {
            self.scanner.finish().map_err(SyncFailure::from)
        } else {
            Err(SyncFailure::Timeout)
        }
    }

    fn error_line(&mut self, byte: u8) -> bool {
        self.error_matched = if byte == ERROR_MARKER[self.error_matched] {
            self.error_matched + 1
        } else {
            usize::from(byte == ERROR_MARKER[0])
        };
        if self.error_matched == ERROR_MARKER.len() {
            self.error_matched = 0;
            return true;
        }
        false
    }
}

#[cfg(target_os = "none")]
pub use hardware::{Coprocessor, LinkReady};

#[cfg(target_os = "none")]
mod hardware {
    use core::time::Duration;

    use bell_core::clock::{ConnectivityProbe, SyncFailure};
    use bell_core::timeapi::{self, TimeApiEndpoint};
    use embassy_stm32::gpio::Input;
    use embassy_stm32::usart::{BufferedUartRx, BufferedUartTx};
    use embassy_time::{Instant, with_deadline, with_timeout};
    use embedded_io_async::{Read, Write};
    use heapless::String;

    use super::ReplyReader;
    use crate::instant::to_embassy;

    const CHUNK_LEN: usize = 64;
    /// Line silence that marks the end of leftover bytes.
    const STALE_QUIET: Duration = Duration::from_millis(20);

    /// Link-ready line driven by the coprocessor.
    pub struct LinkReady<'d> {
        pin: Input<'d>,
    }

    impl<'d> LinkReady<'d> {
        pub fn new(pin: Input<'d>) -> Self {
            Self { pin }
        }
    }

    impl ConnectivityProbe for LinkReady<'_> {
        fn is_up(&self) -> bool {
            self.pin.is_high()
        }
    }

    /// UART halves connected to the coprocessor.
    pub struct Coprocessor<'d> {
        tx: BufferedUartTx<'d>,
        rx: BufferedUartRx<'d>,
        endpoint: TimeApiEndpoint,
    }

    impl<'d> Coprocessor<'d> {
        pub fn new(tx: BufferedUartTx<'d>, rx: BufferedUartRx<'d>, endpoint: TimeApiEndpoint) -> Self {
            Self { tx, rx, endpoint }
        }

        /// Queries the time server, giving up at `timeout`.
        pub async fn fetch(&mut self, timeout: Duration) -> Result<u64, SyncFailure> {
            let deadline = Instant::now() + to_embassy(timeout);

            let mut request = String::<160>::new();
            timeapi::write_request(&mut request, &self.endpoint)
                .map_err(|_| SyncFailure::ConnectFailed)?;

            self.discard_stale(deadline).await;

            match with_deadline(deadline, self.send(request.as_bytes())).await {
                Ok(Ok(())) => {}
                Ok(Err(())) => return Err(SyncFailure::ConnectFailed),
                Err(_) => return Err(SyncFailure::Timeout),
            }

            let mut reader = ReplyReader::new();
            let mut chunk = [0u8; CHUNK_LEN];
            loop {
                match with_deadline(deadline, self.rx.read(&mut chunk)).await {
                    Ok(Ok(count)) => {
                        if let Some(outcome) = reader.feed(&chunk[..count]) {
                            return outcome;
                        }
                    }
                    Ok(Err(_)) => {
                        defmt::warn!("coprocessor: UART read error");
                        return Err(SyncFailure::ConnectFailed);
                    }
                    Err(_) => return reader.finish(),
                }
            }
        }

        /// Drops whatever an abandoned earlier reply left in the receive
        /// buffer, up to `deadline`.
        async fn discard_stale(&mut self, deadline: Instant) {
            let mut scratch = [0u8; CHUNK_LEN];
            let mut dropped = 0usize;
            while Instant::now() < deadline {
                match with_timeout(to_embassy(STALE_QUIET), self.rx.read(&mut scratch)).await {
                    Ok(Ok(count)) => dropped += count,
                    Ok(Err(_)) | Err(_) => break,
                }
            }
            if dropped > 0 {
                defmt::warn!("coprocessor: discarded {} stale bytes", dropped);
            }
        }

        async fn send(&mut self, bytes: &[u8]) -> Result<(), ()> {
            if self.tx.write_all(bytes).await.is_err() {
                defmt::warn!("coprocessor: UART write error");
                return Err(());
            }
            self.tx.flush().await.map_err(|_| {
                defmt::warn!("coprocessor: UART flush error");
            })
        }
    }
}
