//! Opaque simulator object handles and the name lookup table that resolves them.

use lasso::{Key, Spur, ThreadedRodeo};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque reference to a simulated signal or register.
///
/// Handles are minted by the simulator side and only ever compared, hashed,
/// and passed back to it. The scheduler never interprets the raw value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Handle(u32);

impl Handle {
    /// Creates a `Handle` from a raw simulator-assigned index.
    pub const fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hierarchical signal names resolved to [`Handle`]s once, up front.
///
/// Binding layers look handles up by name through this table instead of
/// decoding names on every access.
pub struct SignalTable {
    names: ThreadedRodeo<Spur>,
}

impl SignalTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            names: ThreadedRodeo::new(),
        }
    }

    /// Registers `name`, returning its handle. Registering the same name
    /// twice returns the same handle.
    pub fn register(&self, name: &str) -> Handle {
        to_handle(self.names.get_or_intern(name))
    }

    /// Looks up a previously registered name.
    pub fn lookup(&self, name: &str) -> Option<Handle> {
        self.names.get(name).map(to_handle)
    }

    /// Returns the number of registered signals.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no signal has been registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for SignalTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SignalTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalTable")
            .field("signals", &self.names.len())
            .finish()
    }
}

fn to_handle(key: Spur) -> Handle {
    // Spur indices are u32-backed, so the conversion is lossless.
    Handle::from_raw(key.into_usize() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_lookup_roundtrip() {
        let table = SignalTable::new();
        let clk = table.register("top.clk");
        assert_eq!(table.lookup("top.clk"), Some(clk));
    }

    #[test]
    fn same_name_same_handle() {
        let table = SignalTable::new();
        assert_eq!(table.register("top.q"), table.register("top.q"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn different_names_different_handles() {
        let table = SignalTable::new();
        assert_ne!(table.register("a"), table.register("b"));
    }

    #[test]
    fn unknown_name() {
        let table = SignalTable::new();
        assert!(table.is_empty());
        assert_eq!(table.lookup("missing"), None);
    }

    #[test]
    fn handle_display() {
        assert_eq!(Handle::from_raw(7).to_string(), "#7");
    }

    #[test]
    fn serde_roundtrip() {
        let h = Handle::from_raw(42);
        let json = serde_json::to_string(&h).unwrap();
        let back: Handle = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }
}
