//! Time-stepped cooperative scheduler for co-simulation against an external
//! HDL simulator.
//!
//! The simulator (the *driver*) owns simulated time. User test code runs as
//! *processes* multiplexed by a [`Scheduler`] that only executes while the
//! driver is parked on a [`handshake`]. Per step the scheduler resumes every
//! runnable process until all of them wait, refreshes the [`ChangeMonitor`],
//! replays the [`WriteBuffer`] through [`SimAccess`], and hands the baton back.
//!
//! # Usage
//!
//! ```ignore
//! use cosim_sched::{spawn_scheduler, SchedulerConfig};
//!
//! let (port, run) = spawn_scheduler(access, SchedulerConfig::default(), |sched| {
//!     sched.spawn("stimulus", |ctx| {
//!         ctx.write(reset, true)?;
//!         ctx.wait(2)?;
//!         ctx.write(reset, false)?;
//!         ctx.finish()?;
//!         Ok(())
//!     })?;
//!     Ok(())
//! })?;
//! ```
//!
//! # Modules
//!
//! - `handshake`: single-slot baton exchange between two threads
//! - `port`: the driver's end, with wake reasons and replies
//! - `process`: process ids, run/wait states, and the barrier bookkeeping
//! - `callback`: one-shot simulator callbacks keyed by token
//! - `monitor`: per-step edge and change detection
//! - `write_buffer`: writes deferred to the end of the step
//! - `scheduler`: the round loop tying everything together
//! - `loopback`: an in-process simulator and driver for tests and demos

#![warn(missing_docs)]

pub mod access;
pub mod callback;
pub mod context;
pub mod error;
pub mod handshake;
pub mod loopback;
pub mod monitor;
pub mod port;
pub mod process;
pub mod scheduler;
pub mod write_buffer;

#[cfg(test)]
mod testing;

pub use access::{Receipt, SimAccess, Trigger, WriteMode, WriteRequest};
pub use callback::{CallbackHandler, CallbackRegistry, CallbackToken};
pub use context::{CallbackContext, ProcessBody, ProcessContext};
pub use error::{AccessError, HandshakeError, ProcessError, ProcessResult, SchedError, UsageError};
pub use handshake::{handshake, HandshakeEnd};
pub use loopback::{DriverOutcome, LoopbackAccess, LoopbackDriver, LoopbackSim, ModelView, WriteRecord};
pub use monitor::ChangeMonitor;
pub use port::{DriverPort, DriverReport, SchedulerReply, WakeReason};
pub use process::{ProcessEntry, ProcessId, ProcessRegistry, ProcessState};
pub use scheduler::{spawn_scheduler, Phase, RunEnd, RunSummary, Scheduler, SchedulerConfig};
pub use write_buffer::WriteBuffer;
