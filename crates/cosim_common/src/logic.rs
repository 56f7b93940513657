//! IEEE 1164 four-state logic values and single-bit transition classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single 4-state logic value as sampled from the simulator.
///
/// - `Zero`: driven low
/// - `One`: driven high
/// - `X`: unknown or uninitialized
/// - `Z`: high-impedance (not driven)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Logic {
    /// Logic low (0).
    #[default]
    Zero = 0,
    /// Logic high (1).
    One = 1,
    /// Unknown or uninitialized.
    X = 2,
    /// High-impedance (tri-state).
    Z = 3,
}

impl Logic {
    /// Returns true for the definite states `Zero` and `One`.
    pub fn is_known(self) -> bool {
        matches!(self, Logic::Zero | Logic::One)
    }
}

impl From<bool> for Logic {
    fn from(value: bool) -> Self {
        if value {
            Logic::One
        } else {
            Logic::Zero
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Logic::Zero => write!(f, "0"),
            Logic::One => write!(f, "1"),
            Logic::X => write!(f, "X"),
            Logic::Z => write!(f, "Z"),
        }
    }
}

/// How a single bit moved between two consecutive samples.
///
/// ```text
///  before \ after   0        1        X/Z
///  0                Steady   Rising   Unknown
///  1                Falling  Steady   Unknown
///  X/Z              Unknown  Unknown  Steady (same) / Unknown
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Transition {
    /// No change between the samples.
    Steady,
    /// `0 -> 1`.
    Rising,
    /// `1 -> 0`.
    Falling,
    /// Any change where either side is `X` or `Z`.
    Unknown,
}

impl Transition {
    /// Classifies the move from `before` to `after`.
    pub fn between(before: Logic, after: Logic) -> Self {
        use Logic::*;
        match (before, after) {
            (a, b) if a == b => Transition::Steady,
            (Zero, One) => Transition::Rising,
            (One, Zero) => Transition::Falling,
            _ => Transition::Unknown,
        }
    }
}
