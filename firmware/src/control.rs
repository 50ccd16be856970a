#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Requests from the console task to the tick task.
//!
//! Only the tick task owns the controller. Everything else asks through this
//! bounded queue and sees the results in the published status.

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};

/// Depth of the request queue shared by the console and the tick task.
pub const CONTROL_QUEUE_DEPTH: usize = 4;

#[cfg(target_os = "none")]
type ControlMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type ControlMutex = NoopRawMutex;

/// Work the console can hand to the tick task.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControlRequest {
    /// Energise the relay now, regardless of clock grade.
    Ring,
    /// Query the time server on the next tick.
    Sync,
}

pub type ControlQueue = Channel<ControlMutex, ControlRequest, CONTROL_QUEUE_DEPTH>;

pub type ControlSender<'a> = Sender<'a, ControlMutex, ControlRequest, CONTROL_QUEUE_DEPTH>;

pub type ControlReceiver<'a> = Receiver<'a, ControlMutex, ControlRequest, CONTROL_QUEUE_DEPTH>;
