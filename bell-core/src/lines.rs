//! Board wiring for the controller's output lines.
//!
//! The firmware configures its GPIO from this table and the REPL status output
//! labels lines with the same names, so the two cannot drift apart.

/// Identifier for the driven output lines.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineId {
    Relay,
    StatusLed,
}

impl LineId {
    /// Deterministic index for lookups into [`ALL_LINES`].
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            LineId::Relay => 0,
            LineId::StatusLed => 1,
        }
    }
}

/// Electrical level that energises the load.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinePolarity {
    ActiveHigh,
    ActiveLow,
}

impl LinePolarity {
    /// Pin level that realises the logical `active` state.
    #[must_use]
    pub const fn pin_level(self, active: bool) -> bool {
        match self {
            LinePolarity::ActiveHigh => active,
            LinePolarity::ActiveLow => !active,
        }
    }
}

/// Metadata describing how an output line is routed on the board.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LineInfo {
    pub id: LineId,
    pub name: &'static str,
    pub mcu_pin: &'static str,
    pub polarity: LinePolarity,
    pub description: &'static str,
}

impl LineInfo {
    #[must_use]
    pub const fn new(
        id: LineId,
        name: &'static str,
        mcu_pin: &'static str,
        polarity: LinePolarity,
        description: &'static str,
    ) -> Self {
        Self {
            id,
            name,
            mcu_pin,
            polarity,
            description,
        }
    }
}

/// Compile-time catalog of every driven line.
pub const ALL_LINES: [LineInfo; 2] = [
    LineInfo::new(
        LineId::Relay,
        "RELAY",
        "PA4",
        LinePolarity::ActiveHigh,
        "bell relay coil driver",
    ),
    LineInfo::new(
        LineId::StatusLed,
        "LED",
        "PA5",
        LinePolarity::ActiveHigh,
        "clock confidence indicator",
    ),
];

/// Retrieve line metadata by identifier.
#[must_use]
pub const fn line_by_id(id: LineId) -> LineInfo {
    ALL_LINES[id.as_index()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_indices_match_ids() {
        for (index, line) in ALL_LINES.iter().enumerate() {
            assert_eq!(line.id.as_index(), index);
        }
        assert_eq!(line_by_id(LineId::Relay).name, "RELAY");
    }

    #[test]
    fn polarity_maps_logical_level() {
        assert!(LinePolarity::ActiveHigh.pin_level(true));
        assert!(LinePolarity::ActiveLow.pin_level(false));
        assert!(!LinePolarity::ActiveLow.pin_level(true));
    }
}
