//! Replication cursor: tracks the current position in the record stream.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::PulseNumber;

/// A position in the export stream: `(pulse, record number)`, totally ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub pulse: PulseNumber,
    pub record_number: u32,
}

impl Position {
    pub const ZERO: Position = Position { pulse: 0, record_number: 0 };

    pub const fn new(pulse: PulseNumber, record_number: u32) -> Self {
        Self { pulse, record_number }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.pulse, self.record_number)
    }
}

/// The replicator's resumable position in the export stream.
///
/// The source is always asked for records strictly after `position`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    position: Position,
}

impl Cursor {
    pub fn new(position: Position) -> Self {
        Self { position }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn pulse(&self) -> PulseNumber {
        self.position.pulse
    }

    /// Advance to a delivered record. Positions never move backwards here.
    pub fn advance(&mut self, position: Position) {
        if position > self.position {
            self.position = position;
        }
    }

    /// Jump to the start of another pulse (stream relocation).
    pub fn relocate(&mut self, pulse: PulseNumber) {
        self.position = Position::new(pulse, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_advance_is_monotonic() {
        let mut cursor = Cursor::new(Position::new(65537, 10));
        cursor.advance(Position::new(65537, 11));
        assert_eq!(cursor.position(), Position::new(65537, 11));
        cursor.advance(Position::new(65537, 3));
        assert_eq!(cursor.position(), Position::new(65537, 11));
        cursor.advance(Position::new(65547, 1));
        assert_eq!(cursor.pulse(), 65547);
    }

    #[test]
    fn cursor_relocate_resets_record_number() {
        let mut cursor = Cursor::new(Position::new(65537, 10));
        cursor.relocate(65600);
        assert_eq!(cursor.position(), Position::new(65600, 0));
    }

    #[test]
    fn positions_order_by_pulse_then_record() {
        assert!(Position::new(65537, 99) < Position::new(65538, 0));
        assert!(Position::new(65538, 1) < Position::new(65538, 2));
        assert_eq!(Position::default(), Position::ZERO);
    }
}
