//! GPIO adapters for the controller's output lines.

use bell_core::actuator::OutputLine;
use bell_core::lines::{LineId, LinePolarity, line_by_id};
use embassy_stm32::gpio::{Level, Output};

/// Push-pull output honouring the line's polarity from the board table.
pub struct GpioLine<'d> {
    pin: Output<'d>,
    polarity: LinePolarity,
}

impl<'d> GpioLine<'d> {
    /// Wraps `pin`, which must already be at its inactive level.
    pub fn new(id: LineId, pin: Output<'d>) -> Self {
        Self {
            pin,
            polarity: line_by_id(id).polarity,
        }
    }
}

impl OutputLine for GpioLine<'_> {
    fn drive(&mut self, level: bool) {
        self.pin.set_level(Level::from(self.polarity.pin_level(level)));
    }
}

/// Level that leaves `id` inactive at reset.
pub fn inactive_level(id: LineId) -> Level {
    Level::from(line_by_id(id).polarity.pin_level(false))
}
