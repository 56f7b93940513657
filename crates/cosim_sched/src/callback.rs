//! One-shot callbacks registered with the simulator.
//!
//! Each registration gets a fresh [`CallbackToken`] that the simulator
//! hands back when the trigger fires. A token resolves to its handler
//! exactly once: firing and cancelling both remove the entry, and a token
//! that no longer resolves is ignored, since a cancellation can always race
//! with a report already in flight.

use std::collections::HashMap;
use std::fmt;

use crate::access::{Receipt, SimAccess, Trigger};
use crate::context::CallbackContext;
use crate::error::{AccessError, ProcessResult};

/// Identifies a callback registration between the scheduler and the simulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackToken(u64);

impl CallbackToken {
    /// Creates a token from a raw value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb{}", self.0)
    }
}

/// A handler run on the scheduler's thread when its callback fires.
pub type CallbackHandler = Box<dyn FnOnce(&CallbackContext<'_>) -> ProcessResult + Send>;

struct CallbackEntry<H> {
    receipt: Receipt,
    handler: H,
}

/// Token-to-handler table for outstanding callback registrations.
pub struct CallbackRegistry<H = CallbackHandler> {
    next: u64,
    entries: HashMap<CallbackToken, CallbackEntry<H>>,
}

impl<H> CallbackRegistry<H> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            next: 1,
            entries: HashMap::new(),
        }
    }

    /// Registers `handler` to run when `trigger` fires, forwarding the
    /// registration to the simulator.
    pub fn register(
        &mut self,
        access: &mut dyn SimAccess,
        trigger: Trigger,
        handler: H,
    ) -> Result<CallbackToken, AccessError> {
        let token = CallbackToken(self.next);
        self.next += 1;
        let receipt = access.register_callback(&trigger, token)?;
        let previous = self.entries.insert(
            token,
            CallbackEntry {
                receipt,
                handler,
            },
        );
        debug_assert!(previous.is_none(), "callback token {token} reused");
        Ok(token)
    }

    /// Cancels a registration. Returns `false` for tokens that are unknown,
    /// already fired, or already cancelled.
    pub fn cancel(
        &mut self,
        access: &mut dyn SimAccess,
        token: CallbackToken,
    ) -> Result<bool, AccessError> {
        match self.entries.remove(&token) {
            Some(entry) => {
                access.cancel_callback(entry.receipt)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Resolves a fired token to its handler, removing the entry.
    pub fn take(&mut self, token: CallbackToken) -> Option<H> {
        self.entries.remove(&token).map(|entry| entry.handler)
    }

    /// Returns the number of outstanding registrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every outstanding registration without involving the simulator.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }
}

impl<H> Default for CallbackRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeAccess;
    use cosim_common::Handle;

    fn after(ticks: u64) -> Trigger {
        Trigger::After { ticks }
    }

    #[test]
    fn register_forwards_to_simulator() {
        let mut access = FakeAccess::new();
        let mut registry = CallbackRegistry::new();
        let token = registry.register(&mut access, after(3), "a").unwrap();
        assert_eq!(access.registered, vec![(after(3), token)]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn tokens_are_unique() {
        let mut access = FakeAccess::new();
        let mut registry = CallbackRegistry::new();
        let a = registry.register(&mut access, after(1), 1).unwrap();
        let b = registry.register(&mut access, after(1), 2).unwrap();
        registry.take(a);
        let c = registry.register(&mut access, after(1), 3).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn take_is_one_shot() {
        let mut access = FakeAccess::new();
        let mut registry = CallbackRegistry::new();
        let token = registry.register(&mut access, after(1), "h").unwrap();
        assert_eq!(registry.take(token), Some("h"));
        assert_eq!(registry.take(token), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_token_take_is_noop() {
        let mut registry: CallbackRegistry<&str> = CallbackRegistry::new();
        assert_eq!(registry.take(CallbackToken::from_raw(77)), None);
    }

    #[test]
    fn cancel_removes_and_forwards_receipt() {
        let mut access = FakeAccess::new();
        let mut registry = CallbackRegistry::new();
        let handle = Handle::from_raw(1);
        let token = registry
            .register(&mut access, Trigger::ValueChange { handle }, ())
            .unwrap();
        assert!(registry.cancel(&mut access, token).unwrap());
        assert_eq!(access.cancelled.len(), 1);
        assert_eq!(registry.take(token), None);
    }

    #[test]
    fn unknown_token_cancel_is_noop() {
        let mut access = FakeAccess::new();
        let mut registry: CallbackRegistry<()> = CallbackRegistry::new();
        assert!(!registry
            .cancel(&mut access, CallbackToken::from_raw(5))
            .unwrap());
        assert!(access.cancelled.is_empty());
    }

    #[test]
    fn failed_registration_leaves_no_entry() {
        let mut access = FakeAccess::new();
        access.reject_callbacks = true;
        let mut registry = CallbackRegistry::new();
        assert!(registry.register(&mut access, after(1), ()).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let mut access = FakeAccess::new();
        let mut registry = CallbackRegistry::new();
        registry.register(&mut access, after(1), ()).unwrap();
        registry.register(&mut access, after(2), ()).unwrap();
        assert_eq!(registry.clear(), 2);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn token_display() {
        assert_eq!(CallbackToken::from_raw(4).to_string(), "cb4");
    }
}
