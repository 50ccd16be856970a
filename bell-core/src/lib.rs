#![no_std]

// Shared logic for the weekly bell controller.
//
// The crate avoids the Rust standard library so the same clock grading,
// schedule matching and actuation rules run on the MCU firmware and in the
// host emulator. Hardware and network access only enter through the traits in
// `actuator` and `clock`.

pub mod actuator;
pub mod clock;
pub mod controller;
pub mod indicator;
pub mod lines;
pub mod repl;
pub mod schedule;
pub mod telemetry;
pub mod time;
pub mod timeapi;
