//! Simulated time as reported by the external simulator.
//!
//! The simulator owns time; the scheduler only records what it is told.
//! [`SimTime`] is counted in the simulator's own precision units.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// A point in simulated time, in simulator precision units.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SimTime(u64);

impl SimTime {
    /// Time zero.
    pub const ZERO: SimTime = SimTime(0);

    /// Creates a time point from a raw unit count.
    pub fn from_units(units: u64) -> Self {
        Self(units)
    }

    /// Returns the raw unit count.
    pub fn units(self) -> u64 {
        self.0
    }
}

impl Add<u64> for SimTime {
    type Output = SimTime;

    fn add(self, units: u64) -> SimTime {
        SimTime(self.0.saturating_add(units))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_default() {
        assert_eq!(SimTime::default(), SimTime::ZERO);
        assert_eq!(SimTime::ZERO.units(), 0);
    }

    #[test]
    fn add_units() {
        assert_eq!(SimTime::from_units(10) + 5, SimTime::from_units(15));
        assert_eq!(SimTime::from_units(u64::MAX) + 1, SimTime::from_units(u64::MAX));
    }

    #[test]
    fn ordering() {
        assert!(SimTime::from_units(1) < SimTime::from_units(2));
    }

    #[test]
    fn display() {
        assert_eq!(SimTime::from_units(42).to_string(), "t=42");
    }
}
