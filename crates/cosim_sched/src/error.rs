//! Error types for the scheduler, its handshake, and simulator access.
//!
//! Errors fall into three groups:
//!
//! - usage errors ([`UsageError`]) are returned at the offending call site
//! - stale callback tokens are not errors at all and are dropped silently
//! - everything else in [`SchedError`] is fatal and aborts the whole run

use std::fmt;
use std::io;
use std::time::Duration;

use cosim_common::Handle;

use crate::callback::CallbackToken;
use crate::process::ProcessId;

/// Errors surfaced by the scheduler and by process-facing calls.
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    /// A call was made from a context that is not allowed to make it.
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),

    /// The baton exchange with the driver failed.
    #[error("handshake with driver failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// A simulator primitive reported a failure.
    #[error("simulator access failed: {0}")]
    Access(#[from] AccessError),

    /// A process returned an error or panicked.
    #[error("process '{name}' ({id}) failed: {reason}")]
    ProcessFailed {
        /// The failing process.
        id: ProcessId,
        /// The failing process's name.
        name: String,
        /// The error or panic message.
        reason: String,
    },

    /// A callback handler returned an error or panicked.
    #[error("callback {token} failed: {reason}")]
    CallbackFailed {
        /// Token of the failing callback.
        token: CallbackToken,
        /// The error or panic message.
        reason: String,
    },

    /// A resumed process did not suspend within the barrier timeout.
    #[error("process '{name}' ({id}) did not suspend within {timeout:?}")]
    Starved {
        /// The process holding up the barrier.
        id: ProcessId,
        /// The process's name.
        name: String,
        /// The configured barrier timeout.
        timeout: Duration,
    },

    /// The OS refused to start a thread.
    #[error("failed to start thread '{name}': {source}")]
    Thread {
        /// Name of the thread that could not be started.
        name: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The run has ended; the calling process must unwind.
    #[error("run interrupted")]
    Interrupted,

    /// Scheduler bookkeeping is inconsistent. This is a bug.
    #[error("internal scheduler error: {0}")]
    Internal(String),
}

/// Calls rejected because of where they were made from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    /// The calling context does not belong to a registered process.
    #[error("process {0} is not registered")]
    NotRegistered(ProcessId),

    /// The calling process is registered but is not the one currently running.
    #[error("process {0} is not the running process")]
    NotRunning(ProcessId),

    /// `wait` was asked to suspend for zero ticks.
    #[error("wait requires at least one tick")]
    ZeroWait,
}

/// Failures of the two-party baton exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// The other party dropped its end.
    #[error("peer disconnected")]
    Disconnected,

    /// The other party did not hand the baton back in time.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// A signal is already outstanding in this direction.
    #[error("a signal is already outstanding")]
    Busy,

    /// The run is over; no further exchanges are possible.
    #[error("handshake closed")]
    Closed,
}

/// Failures reported by the simulator's access primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// The handle does not name a simulated object.
    #[error("unknown handle {0}")]
    UnknownHandle(Handle),

    /// The written value does not fit the target.
    #[error("width mismatch on {handle}: expected {expected} bits, got {actual}")]
    WidthMismatch {
        /// The written handle.
        handle: Handle,
        /// The object's width.
        expected: u32,
        /// The written value's width.
        actual: u32,
    },

    /// The simulator does not know the callback receipt.
    #[error("unknown callback receipt {0}")]
    UnknownReceipt(u64),

    /// Any other simulator-side failure.
    #[error("{0}")]
    Simulator(String),
}

/// The error type returned by process bodies and callback handlers.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// A scheduler call failed, including [`SchedError::Interrupted`].
    #[error(transparent)]
    Sched(#[from] SchedError),

    /// The process itself decided to fail.
    #[error("{0}")]
    Failure(String),
}

impl ProcessError {
    /// Creates a [`ProcessError::Failure`] from any displayable message.
    pub fn failure(message: impl fmt::Display) -> Self {
        Self::Failure(message.to_string())
    }

    /// Returns true if this error only signals that the run has ended.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, ProcessError::Sched(SchedError::Interrupted))
    }
}

/// The result of a process body or callback handler.
pub type ProcessResult = Result<(), ProcessError>;
