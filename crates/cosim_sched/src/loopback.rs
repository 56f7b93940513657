//! An in-process simulator and driver.
//!
//! [`LoopbackSim`] stands in for an HDL simulator: named signals held in
//! memory, a tick counter, pending callbacks, and an optional model closure
//! that plays the design (toggling a clock, registering a counter) once per
//! tick. [`LoopbackDriver`] runs the driver side of the handshake against it.
//! Tests and the bundled benches use the pair to exercise the scheduler
//! without a real simulator.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use cosim_common::{Handle, LogicVec, SignalTable, SimTime};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::access::{Receipt, SimAccess, Trigger, WriteMode, WriteRequest};
use crate::callback::CallbackToken;
use crate::error::{AccessError, HandshakeError};
use crate::port::{DriverPort, SchedulerReply};

type Model = Box<dyn FnMut(&mut ModelView<'_>) + Send>;

/// One call to the simulator's write primitive, as seen by the simulator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRecord {
    /// Simulated time of the write.
    pub time: SimTime,
    /// The written object.
    pub handle: Handle,
    /// The value and mode.
    pub request: WriteRequest,
}

#[derive(Debug)]
enum Wake {
    At(SimTime),
    Change { handle: Handle, baseline: LogicVec },
}

#[derive(Debug)]
struct PendingCallback {
    receipt: Receipt,
    token: CallbackToken,
    wake: Wake,
}

struct SimState {
    signals: SignalTable,
    values: HashMap<Handle, LogicVec>,
    time: SimTime,
    step: u64,
    callbacks: Vec<PendingCallback>,
    next_receipt: u64,
    inertial: HashMap<Handle, (SimTime, LogicVec)>,
    forced: HashSet<Handle>,
    log: Vec<WriteRecord>,
    model: Option<Model>,
}

/// The design's view of the signals during a model step.
pub struct ModelView<'a> {
    values: &'a mut HashMap<Handle, LogicVec>,
    forced: &'a HashSet<Handle>,
    signals: &'a SignalTable,
    time: SimTime,
}

impl ModelView<'_> {
    /// Current value of `handle`.
    pub fn get(&self, handle: Handle) -> Option<&LogicVec> {
        self.values.get(&handle)
    }

    /// Current value of `handle` as an integer, if fully known.
    pub fn get_u64(&self, handle: Handle) -> Option<u64> {
        self.values.get(&handle).and_then(LogicVec::to_u64)
    }

    /// Drives `handle` from the design. Forced objects keep their forced value.
    pub fn set(&mut self, handle: Handle, value: impl Into<LogicVec>) {
        if self.forced.contains(&handle) {
            return;
        }
        if let Some(slot) = self.values.get_mut(&handle) {
            *slot = value.into();
        }
    }

    /// Looks up a signal by name.
    pub fn handle(&self, name: &str) -> Option<Handle> {
        self.signals.lookup(name)
    }

    /// Simulated time of this step.
    pub fn time(&self) -> SimTime {
        self.time
    }
}

/// An in-memory simulator. Clones share state.
#[derive(Clone)]
pub struct LoopbackSim {
    state: Arc<Mutex<SimState>>,
}

impl LoopbackSim {
    /// Creates an empty simulator advancing one time unit per tick.
    pub fn new() -> Self {
        Self::with_time_step(1)
    }

    /// Creates an empty simulator advancing `step` time units per tick.
    pub fn with_time_step(step: u64) -> Self {
        let state = SimState {
            signals: SignalTable::new(),
            values: HashMap::new(),
            time: SimTime::ZERO,
            step: step.max(1),
            callbacks: Vec::new(),
            next_receipt: 1,
            inertial: HashMap::new(),
            forced: HashSet::new(),
            log: Vec::new(),
            model: None,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Declares a signal with its initial value and returns its handle.
    pub fn add_signal(&self, name: &str, initial: impl Into<LogicVec>) -> Handle {
        let mut state = self.state.lock();
        let handle = state.signals.register(name);
        state.values.insert(handle, initial.into());
        handle
    }

    /// Looks up a signal by name.
    pub fn handle(&self, name: &str) -> Option<Handle> {
        self.state.lock().signals.lookup(name)
    }

    /// Current value of `handle`.
    pub fn value(&self, handle: Handle) -> Option<LogicVec> {
        self.state.lock().values.get(&handle).cloned()
    }

    /// Installs the design model, run once per tick after time advances.
    pub fn set_model<F>(&self, model: F)
    where
        F: FnMut(&mut ModelView<'_>) + Send + 'static,
    {
        self.state.lock().model = Some(Box::new(model));
    }

    /// Every write applied so far, oldest first.
    pub fn write_log(&self) -> Vec<WriteRecord> {
        self.state.lock().log.clone()
    }

    /// Current simulated time.
    pub fn time(&self) -> SimTime {
        self.state.lock().time
    }

    /// Number of callbacks registered and not yet delivered or cancelled.
    pub fn pending_callbacks(&self) -> usize {
        self.state.lock().callbacks.len()
    }

    /// Returns the [`SimAccess`] implementation to hand to a scheduler.
    pub fn access(&self) -> LoopbackAccess {
        LoopbackAccess {
            state: Arc::clone(&self.state),
        }
    }

    /// Returns a driver for this simulator.
    pub fn driver(&self) -> LoopbackDriver {
        LoopbackDriver { sim: self.clone() }
    }

    /// Advances one tick: applies matured inertial writes, runs the model,
    /// and returns the tokens of callbacks now due, in registration order.
    fn advance(&self) -> Vec<CallbackToken> {
        let mut state = self.state.lock();
        let now = state.time + state.step;
        state.time = now;

        let matured: Vec<Handle> = state
            .inertial
            .iter()
            .filter(|(_, (at, _))| *at <= now)
            .map(|(handle, _)| *handle)
            .collect();
        for handle in matured {
            if let Some((_, value)) = state.inertial.remove(&handle) {
                if !state.forced.contains(&handle) {
                    state.values.insert(handle, value);
                }
            }
        }

        if let Some(mut model) = state.model.take() {
            let SimState {
                values,
                forced,
                signals,
                ..
            } = &mut *state;
            let mut view = ModelView {
                values,
                forced,
                signals,
                time: now,
            };
            model(&mut view);
            state.model = Some(model);
        }

        let SimState {
            callbacks, values, ..
        } = &mut *state;
        let mut due = Vec::new();
        callbacks.retain(|cb| {
            let fire = match &cb.wake {
                Wake::At(at) => *at <= now,
                Wake::Change { handle, baseline } => values.get(handle) != Some(baseline),
            };
            if fire {
                due.push(cb.token);
            }
            !fire
        });
        due
    }
}

impl Default for LoopbackSim {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoopbackSim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LoopbackSim")
            .field("time", &state.time)
            .field("signals", &state.signals.len())
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}

/// [`SimAccess`] over a [`LoopbackSim`].
pub struct LoopbackAccess {
    state: Arc<Mutex<SimState>>,
}

impl SimAccess for LoopbackAccess {
    fn read_value(&mut self, handle: Handle) -> Result<LogicVec, AccessError> {
        self.state
            .lock()
            .values
            .get(&handle)
            .cloned()
            .ok_or(AccessError::UnknownHandle(handle))
    }

    fn write_value(&mut self, handle: Handle, request: &WriteRequest) -> Result<(), AccessError> {
        let mut state = self.state.lock();
        let expected = state
            .values
            .get(&handle)
            .map(LogicVec::width)
            .ok_or(AccessError::UnknownHandle(handle))?;
        let actual = request.value.width();
        if expected != actual {
            return Err(AccessError::WidthMismatch {
                handle,
                expected,
                actual,
            });
        }
        let time = state.time;
        state.log.push(WriteRecord {
            time,
            handle,
            request: request.clone(),
        });
        match request.mode {
            WriteMode::NoDelay | WriteMode::Inertial { delay: 0 } => {
                if !state.forced.contains(&handle) {
                    state.values.insert(handle, request.value.clone());
                }
            }
            WriteMode::Inertial { delay } => {
                let at = time + delay * state.step;
                state.inertial.insert(handle, (at, request.value.clone()));
            }
            WriteMode::Force => {
                state.forced.insert(handle);
                state.values.insert(handle, request.value.clone());
            }
            WriteMode::Release => {
                state.forced.remove(&handle);
            }
        }
        Ok(())
    }

    fn register_callback(
        &mut self,
        trigger: &Trigger,
        token: CallbackToken,
    ) -> Result<Receipt, AccessError> {
        let mut state = self.state.lock();
        let wake = match *trigger {
            Trigger::After { ticks } => Wake::At(state.time + ticks.max(1) * state.step),
            Trigger::ValueChange { handle } => {
                let baseline = state
                    .values
                    .get(&handle)
                    .cloned()
                    .ok_or(AccessError::UnknownHandle(handle))?;
                Wake::Change { handle, baseline }
            }
        };
        let receipt = Receipt::from_raw(state.next_receipt);
        state.next_receipt += 1;
        state.callbacks.push(PendingCallback {
            receipt,
            token,
            wake,
        });
        Ok(receipt)
    }

    fn cancel_callback(&mut self, receipt: Receipt) -> Result<(), AccessError> {
        let mut state = self.state.lock();
        let before = state.callbacks.len();
        state.callbacks.retain(|cb| cb.receipt != receipt);
        if state.callbacks.len() == before {
            return Err(AccessError::UnknownReceipt(receipt.as_raw()));
        }
        Ok(())
    }
}

/// How a loopback run ended, from the driver's side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriverOutcome {
    /// The scheduler finished the run.
    Finished {
        /// Ticks driven.
        ticks: u64,
    },
    /// The scheduler aborted the run.
    Aborted {
        /// The scheduler's description of the fatal error.
        reason: String,
        /// Ticks driven.
        ticks: u64,
    },
    /// The tick limit was reached; the driver hung up.
    TickLimit {
        /// Ticks driven.
        ticks: u64,
    },
}

/// Drives a [`LoopbackSim`] through the handshake.
#[derive(Debug)]
pub struct LoopbackDriver {
    sim: LoopbackSim,
}

impl LoopbackDriver {
    /// Creates a driver for `sim`.
    pub fn new(sim: LoopbackSim) -> Self {
        Self { sim }
    }

    /// Runs the driver loop: `Start`, then per tick advance time, run the
    /// model, report each due callback, and report the elapsed tick.
    ///
    /// Stops when the scheduler replies `Finished` or `Aborted`, or after
    /// `max_ticks` ticks, in which case the port is dropped and the scheduler
    /// sees the driver disconnect.
    pub fn run(&self, mut port: DriverPort, max_ticks: u64) -> Result<DriverOutcome, HandshakeError> {
        let mut ticks = 0;
        let mut reply = port.start(self.sim.time())?;
        loop {
            if let Some(outcome) = settle(reply, ticks) {
                return Ok(outcome);
            }
            if ticks >= max_ticks {
                debug!(ticks, "tick limit reached, hanging up");
                drop(port);
                return Ok(DriverOutcome::TickLimit { ticks });
            }
            let due = self.sim.advance();
            ticks += 1;
            let now = self.sim.time();
            trace!(tick = ticks, time = %now, callbacks = due.len(), "tick");
            for token in due {
                let reply = port.report_callback(token, now)?;
                if let Some(outcome) = settle(reply, ticks) {
                    return Ok(outcome);
                }
            }
            reply = port.report_time_elapsed(now)?;
        }
    }
}

fn settle(reply: SchedulerReply, ticks: u64) -> Option<DriverOutcome> {
    match reply {
        SchedulerReply::Yield => None,
        SchedulerReply::Finished => Some(DriverOutcome::Finished { ticks }),
        SchedulerReply::Aborted { reason } => Some(DriverOutcome::Aborted { reason, ticks }),
    }
}
