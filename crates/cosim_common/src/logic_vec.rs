//! Signal values: fixed-width vectors of 4-state logic.

use crate::logic::{Logic, Transition};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed-width vector of [`Logic`] values, index 0 being the least
/// significant bit.
///
/// This is the value type read from and written to simulator handles.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicVec {
    bits: Vec<Logic>,
}

impl LogicVec {
    /// Creates a vector of the given width, initialized to all `Zero`.
    pub fn new(width: u32) -> Self {
        Self::filled(width, Logic::Zero)
    }

    /// Creates a vector of the given width with every bit set to `value`.
    pub fn filled(width: u32, value: Logic) -> Self {
        Self {
            bits: vec![value; width as usize],
        }
    }

    /// Creates an all-`X` vector, the state of an uninitialized register.
    pub fn unknown(width: u32) -> Self {
        Self::filled(width, Logic::X)
    }

    /// Creates a single-bit vector from a boolean.
    pub fn from_bool(value: bool) -> Self {
        Self {
            bits: vec![Logic::from(value)],
        }
    }

    /// Creates a vector from the low `width` bits of `value`.
    pub fn from_u64(value: u64, width: u32) -> Self {
        let bits = (0..width)
            .map(|i| Logic::from(i < 64 && (value >> i) & 1 != 0))
            .collect();
        Self { bits }
    }

    /// Returns the number of bits.
    pub fn width(&self) -> u32 {
        self.bits.len() as u32
    }

    /// Returns the bit at `index`, or `None` if out of range.
    pub fn get(&self, index: u32) -> Option<Logic> {
        self.bits.get(index as usize).copied()
    }

    /// Sets the bit at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.width()`.
    pub fn set(&mut self, index: u32, value: Logic) {
        let width = self.width();
        let slot = self
            .bits
            .get_mut(index as usize)
            .unwrap_or_else(|| panic!("index {index} out of bounds for width {width}"));
        *slot = value;
    }

    /// Returns the least significant bit, or `Z` for a zero-width vector.
    pub fn lsb(&self) -> Logic {
        self.bits.first().copied().unwrap_or(Logic::Z)
    }

    /// Converts to a `u64` if every bit is definite and the width fits.
    pub fn to_u64(&self) -> Option<u64> {
        if self.bits.len() > 64 {
            return None;
        }
        let mut result = 0u64;
        for (i, bit) in self.bits.iter().enumerate() {
            match bit {
                Logic::Zero => {}
                Logic::One => result |= 1 << i,
                Logic::X | Logic::Z => return None,
            }
        }
        Some(result)
    }

    /// Classifies the least-significant-bit movement from `previous` to `self`,
    /// following HDL `posedge`/`negedge` convention.
    pub fn transition_from(&self, previous: &LogicVec) -> Transition {
        Transition::between(previous.lsb(), self.lsb())
    }

    /// True if some bit changed from `previous` with `X` or `Z` on either
    /// side. Bits beyond the narrower width count as `Z`.
    pub fn unknown_change_from(&self, previous: &LogicVec) -> bool {
        let width = self.width().max(previous.width());
        (0..width).any(|i| {
            let before = previous.get(i).unwrap_or(Logic::Z);
            let after = self.get(i).unwrap_or(Logic::Z);
            before != after && !(before.is_known() && after.is_known())
        })
    }
}

impl From<bool> for LogicVec {
    fn from(value: bool) -> Self {
        Self::from_bool(value)
    }
}

impl fmt::Display for LogicVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.bits.iter().rev() {
            write!(f, "{bit}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for LogicVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogicVec({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_all_zero() {
        let v = LogicVec::new(8);
        assert_eq!(v.width(), 8);
        assert_eq!(v.to_u64(), Some(0));
    }

    #[test]
    fn from_u64_and_back() {
        let v = LogicVec::from_u64(0b1011, 4);
        assert_eq!(v.to_string(), "1011");
        assert_eq!(v.to_u64(), Some(11));
    }

    #[test]
    fn from_u64_truncates_to_width() {
        assert_eq!(LogicVec::from_u64(0xFF, 4).to_u64(), Some(0xF));
    }

    #[test]
    fn unknown_has_no_integer_value() {
        let v = LogicVec::unknown(4);
        assert_eq!(v.get(3), Some(Logic::X));
        assert_eq!(v.get(4), None);
        assert_eq!(v.to_u64(), None);
    }

    #[test]
    fn display_is_msb_first() {
        let mut v = LogicVec::from_u64(0b1000, 4);
        v.set(1, Logic::X);
        v.set(0, Logic::Z);
        assert_eq!(v.to_string(), "10XZ");
    }

    #[test]
    fn set_bit() {
        let mut v = LogicVec::new(2);
        v.set(1, Logic::One);
        assert_eq!(v.to_u64(), Some(2));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn set_out_of_range_panics() {
        LogicVec::new(1).set(1, Logic::One);
    }

    #[test]
    fn transition_uses_lsb() {
        let low = LogicVec::from_u64(0b10, 2);
        let high = LogicVec::from_u64(0b01, 2);
        assert_eq!(high.transition_from(&low), Transition::Rising);
        assert_eq!(low.transition_from(&high), Transition::Falling);
        assert_eq!(low.transition_from(&low), Transition::Steady);
        assert_eq!(
            LogicVec::unknown(1).transition_from(&LogicVec::from_bool(false)),
            Transition::Unknown
        );
    }

    #[test]
    fn unknown_change_looks_at_every_bit() {
        let zeros = LogicVec::new(4);
        let mut top_x = zeros.clone();
        top_x.set(3, Logic::X);
        assert!(top_x.unknown_change_from(&zeros));
        assert!(zeros.unknown_change_from(&top_x));
        assert_eq!(top_x.transition_from(&zeros), Transition::Steady);
    }

    #[test]
    fn unknown_change_ignores_steady_and_known_moves() {
        let a = LogicVec::unknown(4);
        assert!(!a.unknown_change_from(&a));
        let low = LogicVec::from_u64(0b0101, 4);
        let high = LogicVec::from_u64(0b1010, 4);
        assert!(!high.unknown_change_from(&low));
    }

    #[test]
    fn unknown_change_with_lsb_edge() {
        let mut after = LogicVec::from_u64(0b0001, 4);
        after.set(2, Logic::Z);
        let before = LogicVec::new(4);
        assert!(after.unknown_change_from(&before));
        assert_eq!(after.transition_from(&before), Transition::Rising);
    }

    #[test]
    fn debug_format() {
        assert_eq!(format!("{:?}", LogicVec::from_bool(true)), "LogicVec(1)");
    }

    #[test]
    fn serde_roundtrip() {
        let mut v = LogicVec::from_u64(0b0100, 4);
        v.set(1, Logic::X);
        v.set(0, Logic::Z);
        let json = serde_json::to_string(&v).unwrap();
        let back: LogicVec = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
