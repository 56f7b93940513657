//! Edge and change detection over sampled signal values.
//!
//! The monitor keeps, for every observed handle, the value sampled at the end
//! of the previous step. Queries compare that stored value against a fresh
//! sample and never overwrite it; only [`ChangeMonitor::refresh`], run once
//! per step at the barrier, moves the baseline forward. Every process in a
//! step therefore sees the same edges no matter when it asks.

use std::collections::BTreeMap;

use cosim_common::{Handle, LogicVec, Transition};

use crate::access::SimAccess;
use crate::error::AccessError;

/// Last-sampled values for every handle under observation.
#[derive(Debug, Default)]
pub struct ChangeMonitor {
    samples: BTreeMap<Handle, LogicVec>,
}

impl ChangeMonitor {
    /// Creates a monitor with nothing under observation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `handle`, capturing its current value as the baseline.
    /// Observing an already tracked handle does nothing.
    pub fn observe(&mut self, access: &mut dyn SimAccess, handle: Handle) -> Result<(), AccessError> {
        if !self.samples.contains_key(&handle) {
            let value = access.read_value(handle)?;
            self.samples.insert(handle, value);
        }
        Ok(())
    }

    /// Re-samples every tracked handle and stores the result as the new
    /// baseline. Returns the number of handles refreshed.
    pub fn refresh(&mut self, access: &mut dyn SimAccess) -> Result<usize, AccessError> {
        for (handle, value) in self.samples.iter_mut() {
            *value = access.read_value(*handle)?;
        }
        Ok(self.samples.len())
    }

    /// Returns true if any bit differs from the stored baseline.
    pub fn value_changed(
        &mut self,
        access: &mut dyn SimAccess,
        handle: Handle,
    ) -> Result<bool, AccessError> {
        let (before, now) = self.compare(access, handle)?;
        Ok(before != now)
    }

    /// `0 -> 1` on the least significant bit since the baseline.
    pub fn rising(&mut self, access: &mut dyn SimAccess, handle: Handle) -> Result<bool, AccessError> {
        Ok(self.edge(access, handle)? == Transition::Rising)
    }

    /// `1 -> 0` on the least significant bit since the baseline.
    pub fn falling(&mut self, access: &mut dyn SimAccess, handle: Handle) -> Result<bool, AccessError> {
        Ok(self.edge(access, handle)? == Transition::Falling)
    }

    /// Some bit moved into or out of `X`/`Z` since the baseline.
    pub fn unknown_transition(
        &mut self,
        access: &mut dyn SimAccess,
        handle: Handle,
    ) -> Result<bool, AccessError> {
        let (before, now) = self.compare(access, handle)?;
        Ok(now.unknown_change_from(&before))
    }

    /// Returns true if `handle` is under observation.
    pub fn is_observed(&self, handle: Handle) -> bool {
        self.samples.contains_key(&handle)
    }

    /// Returns the number of observed handles.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if nothing is observed.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn edge(&mut self, access: &mut dyn SimAccess, handle: Handle) -> Result<Transition, AccessError> {
        let (before, now) = self.compare(access, handle)?;
        Ok(now.transition_from(&before))
    }

    /// Returns `(baseline, fresh sample)`, observing `handle` first if needed.
    fn compare(
        &mut self,
        access: &mut dyn SimAccess,
        handle: Handle,
    ) -> Result<(LogicVec, LogicVec), AccessError> {
        self.observe(access, handle)?;
        let now = access.read_value(handle)?;
        let before = self
            .samples
            .get(&handle)
            .cloned()
            .unwrap_or_else(|| now.clone());
        Ok((before, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeAccess;
    use cosim_common::Logic;

    const CLK: Handle = Handle::from_raw(1);

    fn setup(initial: u64) -> (ChangeMonitor, FakeAccess) {
        let mut access = FakeAccess::new();
        access.set(CLK, initial);
        (ChangeMonitor::new(), access)
    }

    #[test]
    fn observe_captures_baseline() {
        let (mut mon, mut access) = setup(1);
        mon.observe(&mut access, CLK).unwrap();
        access.set(CLK, 0);
        assert!(mon.falling(&mut access, CLK).unwrap());
    }

    #[test]
    fn observe_twice_keeps_first_baseline() {
        let (mut mon, mut access) = setup(0);
        mon.observe(&mut access, CLK).unwrap();
        access.set(CLK, 1);
        mon.observe(&mut access, CLK).unwrap();
        assert_eq!(mon.len(), 1);
        assert!(mon.rising(&mut access, CLK).unwrap());
    }

    #[test]
    fn first_query_observes_lazily_with_no_edge() {
        let (mut mon, mut access) = setup(1);
        assert!(!mon.is_observed(CLK));
        assert!(!mon.value_changed(&mut access, CLK).unwrap());
        assert!(mon.is_observed(CLK));
    }

    #[test]
    fn queries_do_not_move_baseline() {
        let (mut mon, mut access) = setup(0);
        mon.observe(&mut access, CLK).unwrap();
        access.set(CLK, 1);
        assert!(mon.rising(&mut access, CLK).unwrap());
        assert!(mon.rising(&mut access, CLK).unwrap());
        assert!(mon.value_changed(&mut access, CLK).unwrap());
        access.set(CLK, 0);
        assert!(!mon.value_changed(&mut access, CLK).unwrap());
    }

    #[test]
    fn refresh_commits_new_baseline() {
        let (mut mon, mut access) = setup(0);
        mon.observe(&mut access, CLK).unwrap();
        access.set(CLK, 1);
        assert!(mon.rising(&mut access, CLK).unwrap());
        assert_eq!(mon.refresh(&mut access).unwrap(), 1);
        assert!(!mon.rising(&mut access, CLK).unwrap());
        assert!(!mon.value_changed(&mut access, CLK).unwrap());
    }

    #[test]
    fn falling_edge() {
        let (mut mon, mut access) = setup(1);
        mon.observe(&mut access, CLK).unwrap();
        access.set(CLK, 0);
        assert!(mon.falling(&mut access, CLK).unwrap());
        assert!(!mon.rising(&mut access, CLK).unwrap());
    }

    #[test]
    fn unknown_transitions() {
        let (mut mon, mut access) = setup(0);
        mon.observe(&mut access, CLK).unwrap();
        access
            .values
            .insert(CLK, LogicVec::filled(1, Logic::X));
        assert!(mon.unknown_transition(&mut access, CLK).unwrap());
        assert!(!mon.rising(&mut access, CLK).unwrap());
        mon.refresh(&mut access).unwrap();
        access.set(CLK, 1);
        assert!(mon.unknown_transition(&mut access, CLK).unwrap());
    }

    #[test]
    fn unknown_upper_bit_on_a_bus() {
        const BUS: Handle = Handle::from_raw(2);
        let mut mon = ChangeMonitor::new();
        let mut access = FakeAccess::new();
        access.values.insert(BUS, LogicVec::new(4));
        mon.observe(&mut access, BUS).unwrap();
        let mut value = LogicVec::new(4);
        value.set(3, Logic::X);
        access.values.insert(BUS, value);
        assert!(mon.value_changed(&mut access, BUS).unwrap());
        assert!(mon.unknown_transition(&mut access, BUS).unwrap());
        assert!(!mon.rising(&mut access, BUS).unwrap());
    }

    #[test]
    fn unknown_handle_is_an_access_error() {
        let mut mon = ChangeMonitor::new();
        let mut access = FakeAccess::new();
        let err = mon.observe(&mut access, Handle::from_raw(9)).unwrap_err();
        assert_eq!(err, AccessError::UnknownHandle(Handle::from_raw(9)));
        assert!(mon.is_empty());
    }
}
