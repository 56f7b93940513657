//! The seam to the external simulator's value and callback primitives.
//!
//! The scheduler never talks to a simulator directly. It goes through a
//! [`SimAccess`] implementation supplied at construction, and only while it
//! holds the baton, so the simulator is never touched mid-evaluation.

use std::fmt;

use cosim_common::{Handle, LogicVec};

use crate::callback::CallbackToken;
use crate::error::AccessError;

/// When the simulator should deliver a registered callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// After the given number of ticks from now.
    After {
        /// Relative delay in ticks; must be at least one.
        ticks: u64,
    },
    /// The next time the handle's value changes.
    ValueChange {
        /// The watched object.
        handle: Handle,
    },
}

/// How a write is applied by the simulator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Apply immediately.
    #[default]
    NoDelay,
    /// Apply after `delay` ticks; a later write to the same object cancels it.
    Inertial {
        /// Delay in ticks.
        delay: u64,
    },
    /// Hold the value until released, overriding the design's own drivers.
    Force,
    /// Release a previous force.
    Release,
}

/// One buffered call to the simulator's write primitive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRequest {
    /// The value to write.
    pub value: LogicVec,
    /// How to apply it.
    pub mode: WriteMode,
}

impl WriteRequest {
    /// An immediate write of `value`.
    pub fn new(value: LogicVec) -> Self {
        Self {
            value,
            mode: WriteMode::NoDelay,
        }
    }

    /// Replaces the write mode.
    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }
}

impl From<LogicVec> for WriteRequest {
    fn from(value: LogicVec) -> Self {
        Self::new(value)
    }
}

/// The simulator's acknowledgement of a callback registration, needed to
/// cancel it later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Receipt(u64);

impl Receipt {
    /// Creates a receipt from a raw simulator-side identifier.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "receipt {}", self.0)
    }
}

/// Primitives provided by the external simulator.
///
/// Implementations are called only from the orchestration side while the
/// driver is parked on the handshake.
pub trait SimAccess: Send {
    /// Samples the current value of `handle`.
    fn read_value(&mut self, handle: Handle) -> Result<LogicVec, AccessError>;

    /// Applies one write to `handle`.
    fn write_value(&mut self, handle: Handle, request: &WriteRequest) -> Result<(), AccessError>;

    /// Asks the simulator to report `token` back when `trigger` fires.
    fn register_callback(
        &mut self,
        trigger: &Trigger,
        token: CallbackToken,
    ) -> Result<Receipt, AccessError>;

    /// Withdraws a registration. The simulator may still deliver a report
    /// that was already in flight.
    fn cancel_callback(&mut self, receipt: Receipt) -> Result<(), AccessError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_request_defaults_to_no_delay() {
        let req = WriteRequest::from(LogicVec::from_bool(true));
        assert_eq!(req.mode, WriteMode::NoDelay);
        let forced = req.with_mode(WriteMode::Force);
        assert_eq!(forced.mode, WriteMode::Force);
    }

    #[test]
    fn receipt_roundtrip_and_display() {
        let r = Receipt::from_raw(17);
        assert_eq!(r.as_raw(), 17);
        assert_eq!(r.to_string(), "receipt 17");
    }
}
