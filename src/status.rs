//! Operator status and command bits
//!
//! The meaning of the individual bits was worked out on a LineaMatic P
//! operator. Other operators may use more of the unknown bits.

use core::ops::{BitOr, BitOrAssign};

/// Status byte broadcast by the Master
///
/// ```text
/// +------- (0x80) Unknown
///  +------ (0x40) Motor running: 1 == running, 0 == stopped
///   +----- (0x20) Motor direction: 1 == closing, 0 == opening
///    +---- (0x10) Unknown
///     +--- (0x08) Unknown
///      +-- (0x04) Unknown
///       +- (0x02) Fully closed
///        + (0x01) Fully open
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MasterStatus(pub u8);

impl MasterStatus {
    const FULLY_OPEN: u8 = 0x01;
    const FULLY_CLOSED: u8 = 0x02;
    const CLOSING: u8 = 0x20;
    const RUNNING: u8 = 0x40;

    /// The raw status byte
    #[inline]
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Is the motor running?
    pub fn is_running(&self) -> bool {
        self.0 & Self::RUNNING != 0
    }

    /// The direction the motor is (or was last) running in
    pub fn direction(&self) -> Direction {
        if self.0 & Self::CLOSING != 0 {
            Direction::Closing
        } else {
            Direction::Opening
        }
    }

    /// Is the gate at its fully open end stop?
    pub fn is_fully_open(&self) -> bool {
        self.0 & Self::FULLY_OPEN != 0
    }

    /// Is the gate at its fully closed end stop?
    pub fn is_fully_closed(&self) -> bool {
        self.0 & Self::FULLY_CLOSED != 0
    }
}

/// Motor direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Direction {
    Opening,
    Closing,
}

/// Command bits reported to the Master in a slave status reply
///
/// ```text
/// +------- (0x80) Unknown
///  +------ (0x40) Unknown
///   +----- (0x20) Unknown
///    +---- (0x10) Move to 'H'
///     +--- (0x08) Unknown
///      +-- (0x04) Impulse toggle
///       +- (0x02) Impulse close
///        + (0x01) Impulse open
/// ```
///
/// Commands are one-shot: once reported to the Master they are cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Commands(u8);

impl Commands {
    /// Impulse open
    pub const IMPULSE_OPEN: Self = Self(0x01);
    /// Impulse close
    pub const IMPULSE_CLOSE: Self = Self(0x02);
    /// Impulse toggle
    pub const IMPULSE_TOGGLE: Self = Self(0x04);
    /// Move to the 'H' position
    pub const MOVE_TO_H: Self = Self(0x10);

    /// No commands
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Commands from a raw byte, including bits with no known meaning
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Commands for keyboard style "bit N", where `n` is `1..=8`
    pub fn from_key(n: u8) -> Option<Self> {
        match n {
            1..=8 => Some(Self(1 << (n - 1))),
            _ => None,
        }
    }

    /// The raw command byte
    #[inline]
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Are no commands set?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Are all of `other`'s commands set?
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Flip every command set in `other`
    pub fn toggle(&mut self, other: Self) {
        self.0 ^= other.0;
    }

    /// Return the current commands, leaving none set
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }
}

impl BitOr for Commands {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Commands {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Input from the operator of the emulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OperatorInput {
    /// Flip the given command bits
    Toggle(Commands),
    /// Clear all pending command bits
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_status_bits() {
        // Running, closing
        let st = MasterStatus(0x60);
        assert!(st.is_running());
        assert_eq!(st.direction(), Direction::Closing);
        assert!(!st.is_fully_open());
        assert!(!st.is_fully_closed());

        // Stopped, open
        let st = MasterStatus(0x01);
        assert!(!st.is_running());
        assert_eq!(st.direction(), Direction::Opening);
        assert!(st.is_fully_open());
    }

    #[test]
    fn keys_map_to_bits() {
        assert_eq!(Commands::from_key(1), Some(Commands::IMPULSE_OPEN));
        assert_eq!(Commands::from_key(3), Some(Commands::IMPULSE_TOGGLE));
        assert_eq!(Commands::from_key(5), Some(Commands::MOVE_TO_H));
        assert_eq!(Commands::from_key(8).map(|c| c.bits()), Some(0x80));
        assert_eq!(Commands::from_key(0), None);
        assert_eq!(Commands::from_key(9), None);
    }

    #[test]
    fn toggle_and_take() {
        let mut cmds = Commands::empty();
        cmds.toggle(Commands::IMPULSE_OPEN | Commands::IMPULSE_TOGGLE);
        assert_eq!(cmds.bits(), 0x05);
        cmds.toggle(Commands::IMPULSE_OPEN);
        assert_eq!(cmds, Commands::IMPULSE_TOGGLE);
        assert!(cmds.contains(Commands::IMPULSE_TOGGLE));

        let taken = cmds.take();
        assert_eq!(taken, Commands::IMPULSE_TOGGLE);
        assert!(cmds.is_empty());
    }
}
