//! Shared foundational types for the cosim co-simulation scheduler.
//!
//! This crate provides the vocabulary exchanged between user processes, the
//! scheduler core, and the external simulator: 4-state logic values, packed
//! signal vectors, opaque signal handles with a name lookup table, and
//! simulated time.

#![warn(missing_docs)]

pub mod handle;
pub mod logic;
pub mod logic_vec;
pub mod time;

pub use handle::{Handle, SignalTable};
pub use logic::{Logic, Transition};
pub use logic_vec::LogicVec;
pub use time::SimTime;
