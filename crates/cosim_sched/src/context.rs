//! The API seen by process bodies and callback handlers.
//!
//! Each process runs its body on a dedicated thread, but only while the
//! scheduler has resumed it: the thread parks on its resume channel until
//! told to go, and parks again inside [`ProcessContext::wait`]. Every call
//! checks that the caller is the registered process currently running, so a
//! context smuggled to another thread cannot act behind the scheduler's back.

use std::any::Any;
use std::convert::Infallible;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cosim_common::{Handle, LogicVec, SimTime};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::trace;

use crate::access::{SimAccess, Trigger, WriteRequest};
use crate::callback::{CallbackHandler, CallbackToken};
use crate::monitor::ChangeMonitor;
use crate::error::{AccessError, ProcessResult, SchedError, UsageError};
use crate::port::WakeReason;
use crate::process::ProcessId;
use crate::scheduler::{Core, Phase};

/// The shared scheduler state, locked briefly by whichever side is active.
pub(crate) type SharedCore = Arc<Mutex<Core>>;

/// A process body: runs until it returns or the run ends.
pub type ProcessBody = Box<dyn FnOnce(&ProcessContext) -> ProcessResult + Send>;

/// The scheduler's handle on a process thread.
pub(crate) struct ProcessLink {
    pub(crate) resume: Sender<()>,
    pub(crate) thread: Option<JoinHandle<()>>,
}

/// How a resumed process handed control back.
#[derive(Debug)]
pub(crate) enum Yield {
    /// Suspended in `wait(n)`.
    Wait(u32),
    /// Asked to end the run.
    Finish,
    /// The body returned normally.
    Exited,
    /// The body returned an error or panicked.
    Failed(String),
}

#[derive(Debug)]
pub(crate) struct YieldMsg {
    pub(crate) id: ProcessId,
    pub(crate) kind: Yield,
}

/// Registers a process and starts its (parked) thread.
pub(crate) fn spawn_process(
    shared: &SharedCore,
    core: &mut Core,
    name: String,
    body: ProcessBody,
) -> Result<ProcessId, SchedError> {
    let (resume_tx, resume_rx) = bounded(1);
    let id = core.processes.register(
        name.clone(),
        ProcessLink {
            resume: resume_tx,
            thread: None,
        },
    );
    let ctx = ProcessContext {
        id,
        name: name.clone(),
        shared: Arc::clone(shared),
        resume: resume_rx,
        yields: core.yields.clone(),
    };
    let spawned = thread::Builder::new()
        .name(format!("cosim-{name}"))
        .spawn(move || process_main(ctx, body));
    match spawned {
        Ok(handle) => {
            if let Some(link) = core.processes.link_mut(id) {
                link.thread = Some(handle);
            }
            trace!(%id, %name, "process spawned");
            Ok(id)
        }
        Err(source) => {
            core.processes.remove(id);
            Err(SchedError::Thread { name, source })
        }
    }
}

fn process_main(ctx: ProcessContext, body: ProcessBody) {
    if ctx.resume.recv().is_err() {
        // The run ended before this process was first scheduled.
        return;
    }
    let id = ctx.id;
    let yields = ctx.yields.clone();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&ctx)));
    let kind = match outcome {
        Ok(Ok(())) => Yield::Exited,
        // A stray interrupt while the run is live is a failure.
        Ok(Err(err)) if err.is_interrupt() && ctx.run_ended() => return,
        Ok(Err(err)) => Yield::Failed(err.to_string()),
        Err(payload) => Yield::Failed(panic_message(payload.as_ref())),
    };
    // A closed channel means the scheduler already tore down.
    let _ = yields.send(YieldMsg { id, kind });
}

/// Extracts the message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Handed to every process body; the process's window onto the scheduler.
pub struct ProcessContext {
    id: ProcessId,
    name: String,
    shared: SharedCore,
    resume: Receiver<()>,
    yields: Sender<YieldMsg>,
}

impl ProcessContext {
    /// This process's id.
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// This process's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Suspends this process until `ticks` more ticks have been reported.
    ///
    /// Returns [`SchedError::Interrupted`] if the run ends while suspended;
    /// propagate it with `?`.
    pub fn wait(&self, ticks: u32) -> Result<(), SchedError> {
        if ticks == 0 {
            return Err(UsageError::ZeroWait.into());
        }
        self.with_core(|_| Ok(()))?;
        self.suspend(Yield::Wait(ticks))
    }

    /// Ends the run. Pending writes of the current step are discarded and no
    /// further round executes.
    ///
    /// Never returns `Ok`; once the scheduler has torn down it returns
    /// [`SchedError::Interrupted`] so the body unwinds with `?`.
    pub fn finish(&self) -> Result<Infallible, SchedError> {
        self.with_core(|_| Ok(()))?;
        self.suspend(Yield::Finish)?;
        Err(SchedError::Interrupted)
    }

    /// Spawns a new process that joins the current round.
    pub fn spawn<F>(&self, name: impl Into<String>, body: F) -> Result<ProcessId, SchedError>
    where
        F: FnOnce(&ProcessContext) -> ProcessResult + Send + 'static,
    {
        let mut core = self.shared.lock();
        core.ensure_running(self.id)?;
        spawn_process(&self.shared, &mut core, name.into(), Box::new(body))
    }

    /// Starts tracking `handle` for edge queries.
    pub fn observe(&self, handle: Handle) -> Result<(), SchedError> {
        self.with_core(|core| {
            let Core {
                access, monitor, ..
            } = core;
            Ok(monitor.observe(access.as_mut(), handle)?)
        })
    }

    /// True if `handle` differs from its value at the end of the previous step.
    pub fn value_changed(&self, handle: Handle) -> Result<bool, SchedError> {
        self.with_core(|core| {
            let Core {
                access, monitor, ..
            } = core;
            Ok(monitor.value_changed(access.as_mut(), handle)?)
        })
    }

    /// True on a `0 -> 1` edge of `handle`'s least significant bit since the
    /// previous step.
    pub fn rising(&self, handle: Handle) -> Result<bool, SchedError> {
        self.with_core(|core| {
            let Core {
                access, monitor, ..
            } = core;
            Ok(monitor.rising(access.as_mut(), handle)?)
        })
    }

    /// True on a `1 -> 0` edge of `handle`'s least significant bit since the
    /// previous step.
    pub fn falling(&self, handle: Handle) -> Result<bool, SchedError> {
        self.with_core(|core| {
            let Core {
                access, monitor, ..
            } = core;
            Ok(monitor.falling(access.as_mut(), handle)?)
        })
    }

    /// True if any bit of `handle` moved into or out of `X`/`Z` since the
    /// previous step.
    pub fn unknown_transition(&self, handle: Handle) -> Result<bool, SchedError> {
        self.with_core(|core| {
            let Core {
                access, monitor, ..
            } = core;
            Ok(monitor.unknown_transition(access.as_mut(), handle)?)
        })
    }

    /// Samples the current value of `handle`.
    pub fn read(&self, handle: Handle) -> Result<LogicVec, SchedError> {
        self.with_core(|core| Ok(core.access.read_value(handle)?))
    }

    /// Queues an immediate write of `value`, applied at the end of the step.
    pub fn write(&self, handle: Handle, value: impl Into<LogicVec>) -> Result<(), SchedError> {
        self.write_with(handle, WriteRequest::new(value.into()))
    }

    /// Queues a write with an explicit mode, applied at the end of the step.
    pub fn write_with(&self, handle: Handle, request: WriteRequest) -> Result<(), SchedError> {
        self.with_core(|core| {
            core.writes.enqueue(handle, request);
            Ok(())
        })
    }

    /// Registers a one-shot callback; `handler` runs on the scheduler's
    /// thread when the simulator reports `trigger`.
    pub fn register_callback<F>(&self, trigger: Trigger, handler: F) -> Result<CallbackToken, SchedError>
    where
        F: FnOnce(&CallbackContext<'_>) -> ProcessResult + Send + 'static,
    {
        let handler: CallbackHandler = Box::new(handler);
        self.with_core(|core| {
            let Core {
                access, callbacks, ..
            } = core;
            Ok(callbacks.register(access.as_mut(), trigger, handler)?)
        })
    }

    /// Cancels a callback. Returns `false` if it already fired or was unknown.
    pub fn cancel_callback(&self, token: CallbackToken) -> Result<bool, SchedError> {
        self.with_core(|core| {
            let Core {
                access, callbacks, ..
            } = core;
            Ok(callbacks.cancel(access.as_mut(), token)?)
        })
    }

    /// The simulated time of the latest driver report.
    pub fn time(&self) -> Result<SimTime, SchedError> {
        self.with_core(|core| Ok(core.time))
    }

    /// The number of ticks reported so far.
    pub fn tick(&self) -> Result<u64, SchedError> {
        self.with_core(|core| Ok(core.ticks))
    }

    /// Why the driver last handed over the baton.
    pub fn reason(&self) -> Result<WakeReason, SchedError> {
        self.with_core(|core| Ok(core.reason))
    }

    fn run_ended(&self) -> bool {
        self.shared.lock().phase == Phase::Finished
    }

    fn with_core<T>(
        &self,
        f: impl FnOnce(&mut Core) -> Result<T, SchedError>,
    ) -> Result<T, SchedError> {
        let mut core = self.shared.lock();
        core.ensure_running(self.id)?;
        f(&mut core)
    }

    fn suspend(&self, kind: Yield) -> Result<(), SchedError> {
        self.yields
            .send(YieldMsg { id: self.id, kind })
            .map_err(|_| SchedError::Interrupted)?;
        self.resume.recv().map_err(|_| SchedError::Interrupted)
    }
}

/// Handed to callback handlers, which run on the scheduler's thread between
/// rounds. Handlers may read, query edges, and queue writes.
pub struct CallbackContext<'a> {
    pub(crate) token: CallbackToken,
    pub(crate) shared: &'a SharedCore,
}

impl CallbackContext<'_> {
    /// The token of the firing callback.
    pub fn token(&self) -> CallbackToken {
        self.token
    }

    /// The simulated time at which the callback fired.
    pub fn time(&self) -> SimTime {
        self.shared.lock().time
    }

    /// Samples the current value of `handle`.
    pub fn read(&self, handle: Handle) -> Result<LogicVec, SchedError> {
        Ok(self.shared.lock().access.read_value(handle)?)
    }

    /// Starts tracking `handle` for edge queries.
    pub fn observe(&self, handle: Handle) -> Result<(), SchedError> {
        self.with_monitor(|monitor, access| monitor.observe(access, handle))
    }

    /// True if `handle` differs from its value at the end of the previous step.
    pub fn value_changed(&self, handle: Handle) -> Result<bool, SchedError> {
        self.with_monitor(|monitor, access| monitor.value_changed(access, handle))
    }

    /// True on a `0 -> 1` edge of `handle`'s least significant bit.
    pub fn rising(&self, handle: Handle) -> Result<bool, SchedError> {
        self.with_monitor(|monitor, access| monitor.rising(access, handle))
    }

    /// True on a `1 -> 0` edge of `handle`'s least significant bit.
    pub fn falling(&self, handle: Handle) -> Result<bool, SchedError> {
        self.with_monitor(|monitor, access| monitor.falling(access, handle))
    }

    /// True if any bit of `handle` moved into or out of `X`/`Z`.
    pub fn unknown_transition(&self, handle: Handle) -> Result<bool, SchedError> {
        self.with_monitor(|monitor, access| monitor.unknown_transition(access, handle))
    }

    /// Queues an immediate write of `value`, applied at the end of the step.
    pub fn write(&self, handle: Handle, value: impl Into<LogicVec>) -> Result<(), SchedError> {
        self.shared
            .lock()
            .writes
            .enqueue(handle, WriteRequest::new(value.into()));
        Ok(())
    }

    fn with_monitor<T>(
        &self,
        f: impl FnOnce(&mut ChangeMonitor, &mut dyn SimAccess) -> Result<T, AccessError>,
    ) -> Result<T, SchedError> {
        let mut core = self.shared.lock();
        let Core {
            access, monitor, ..
        } = &mut *core;
        Ok(f(monitor, access.as_mut())?)
    }
}
