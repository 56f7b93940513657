//! The time-stepped cooperative scheduler.
//!
//! [`Scheduler`] multiplexes processes onto the driver's ticks. Each round:
//!
//! 1. every runnable process is resumed, one at a time, until it waits,
//!    exits, or asks to finish; processes spawned meanwhile join the round
//! 2. once none is runnable (the barrier), the change monitor is refreshed
//!    and the write buffer flushed
//! 3. the baton goes back to the driver, and the scheduler blocks until the
//!    next report, which counts down the waiting processes
//!
//! A callback report fires its handler and runs a round, but does not end
//! the step: the monitor keeps its baselines and the handler's writes wait
//! for the flush that follows the tick's `TimeElapsed` round.
//!
//! The scheduler is the only caller of the handshake and the only trigger of
//! refresh and flush. A failing process or callback aborts the whole run.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cosim_common::SimTime;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::access::SimAccess;
use crate::callback::CallbackRegistry;
use crate::context::{
    panic_message, spawn_process, CallbackContext, ProcessContext, ProcessLink, SharedCore, Yield,
    YieldMsg,
};
use crate::error::{ProcessResult, SchedError, UsageError};
use crate::handshake::handshake;
use crate::monitor::ChangeMonitor;
use crate::port::{DriverPort, DriverReport, SchedulerEnd, SchedulerReply, WakeReason};
use crate::process::{ProcessId, ProcessRegistry};
use crate::write_buffer::WriteBuffer;

/// Scheduler tuning. Both watchdogs are off by default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Abort with [`HandshakeError::Timeout`](crate::HandshakeError::Timeout)
    /// if the driver does not report back within this long.
    pub handshake_timeout: Option<Duration>,
    /// Abort with [`SchedError::Starved`] if a resumed process does not
    /// suspend within this long.
    pub barrier_timeout: Option<Duration>,
}

/// Scheduler lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No process registered yet.
    Idle,
    /// At least one process registered; rounds are executing.
    Running,
    /// The run is over.
    Finished,
}

/// How a completed run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunEnd {
    /// A process called `finish`.
    Finished,
    /// Every process returned.
    Exhausted,
}

/// Statistics of a completed run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// How the run ended.
    pub end: RunEnd,
    /// Ticks reported by the driver.
    pub ticks: u64,
    /// Simulated time of the last report.
    pub final_time: SimTime,
    /// Rounds that reached the barrier.
    pub rounds: u64,
    /// Processes ever registered.
    pub processes_spawned: usize,
    /// Writes applied to the simulator.
    pub writes_flushed: u64,
    /// Callback handlers invoked.
    pub callbacks_fired: u64,
}

/// Scheduler state shared with process threads.
pub(crate) struct Core {
    pub(crate) access: Box<dyn SimAccess>,
    pub(crate) processes: ProcessRegistry<ProcessLink>,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) monitor: ChangeMonitor,
    pub(crate) writes: WriteBuffer,
    pub(crate) yields: Sender<YieldMsg>,
    pub(crate) phase: Phase,
    pub(crate) time: SimTime,
    pub(crate) ticks: u64,
    pub(crate) reason: WakeReason,
    rounds: u64,
    writes_flushed: u64,
    callbacks_fired: u64,
}

impl Core {
    /// Rejects calls from anything but the registered, running process.
    pub(crate) fn ensure_running(&self, id: ProcessId) -> Result<(), SchedError> {
        if self.phase == Phase::Finished {
            return Err(SchedError::Interrupted);
        }
        if !self.processes.contains(id) {
            return Err(UsageError::NotRegistered(id).into());
        }
        if self.processes.current() != Some(id) {
            return Err(UsageError::NotRunning(id).into());
        }
        Ok(())
    }
}

enum RoundOutcome {
    Quiescent,
    FinishRequested,
}

/// The orchestration side of a co-simulation run.
///
/// Build with [`Scheduler::new`], spawn the initial processes with
/// [`Scheduler::spawn`] (the bootstrap context), then call
/// [`Scheduler::run`], which blocks until the driver's first report.
pub struct Scheduler {
    shared: SharedCore,
    port: SchedulerEnd,
    yields: Receiver<YieldMsg>,
    config: SchedulerConfig,
    /// A process that never suspended; its thread cannot be joined.
    stuck: Option<ProcessId>,
}

impl Scheduler {
    /// Creates a scheduler over `access`, returning it with the driver's end
    /// of the handshake.
    pub fn new<A>(access: A, config: SchedulerConfig) -> (Self, DriverPort)
    where
        A: SimAccess + 'static,
    {
        let (driver_end, sched_end) = handshake();
        let (yield_tx, yield_rx) = unbounded();
        let core = Core {
            access: Box::new(access),
            processes: ProcessRegistry::new(),
            callbacks: CallbackRegistry::new(),
            monitor: ChangeMonitor::new(),
            writes: WriteBuffer::new(),
            yields: yield_tx,
            phase: Phase::Idle,
            time: SimTime::ZERO,
            ticks: 0,
            reason: WakeReason::Start,
            rounds: 0,
            writes_flushed: 0,
            callbacks_fired: 0,
        };
        let scheduler = Self {
            shared: Arc::new(Mutex::new(core)),
            port: sched_end.with_timeout(config.handshake_timeout),
            yields: yield_rx,
            config,
            stuck: None,
        };
        (scheduler, DriverPort::new(driver_end))
    }

    /// Registers a process from the bootstrap context. It runs in the first
    /// round after the driver starts the run.
    pub fn spawn<F>(&mut self, name: impl Into<String>, body: F) -> Result<ProcessId, SchedError>
    where
        F: FnOnce(&ProcessContext) -> ProcessResult + Send + 'static,
    {
        let mut core = self.shared.lock();
        if core.phase == Phase::Finished {
            return Err(SchedError::Interrupted);
        }
        let id = spawn_process(&self.shared, &mut core, name.into(), Box::new(body))?;
        core.phase = Phase::Running;
        Ok(id)
    }

    /// Returns the lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    /// Returns the number of registered processes.
    pub fn process_count(&self) -> usize {
        self.shared.lock().processes.len()
    }

    /// Runs rounds until a process finishes the run, every process has
    /// returned, or a fatal error occurs.
    ///
    /// On every path the driver is released with a final reply, so it never
    /// stays blocked on the handshake.
    pub fn run(mut self) -> Result<RunSummary, SchedError> {
        info!(processes = self.process_count(), "scheduler waiting for driver");
        match self.run_rounds() {
            Ok(end) => {
                self.teardown();
                if let Err(err) = self.port.release(SchedulerReply::Finished) {
                    warn!(%err, "driver missed the final reply");
                }
                let summary = self.summary(end);
                info!(
                    ticks = summary.ticks,
                    rounds = summary.rounds,
                    end = ?summary.end,
                    "run complete"
                );
                Ok(summary)
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Tears down after a fatal error and tells the driver the run is over.
    fn abort(&mut self, err: SchedError) -> SchedError {
        error!(%err, "run aborted");
        self.teardown();
        // The driver may be the thing that failed; nobody to tell then.
        let _ = self.port.release(SchedulerReply::Aborted {
            reason: err.to_string(),
        });
        err
    }

    fn run_rounds(&mut self) -> Result<RunEnd, SchedError> {
        let mut report = self.port.wait()?;
        loop {
            // A callback lands inside a step; only time reports close one.
            let ends_step = !matches!(report.reason, WakeReason::Callback(_));
            self.absorb(report)?;
            if let RoundOutcome::FinishRequested = self.run_round()? {
                return Ok(RunEnd::Finished);
            }
            let exhausted = self.shared.lock().processes.is_empty();
            if ends_step || exhausted {
                self.publish()?;
            }
            if exhausted {
                return Ok(RunEnd::Exhausted);
            }
            report = self.port.signal(SchedulerReply::Yield)?;
        }
    }

    /// Records a driver report: advances the tick countdowns or fires a callback.
    fn absorb(&mut self, report: DriverReport) -> Result<(), SchedError> {
        let fired = {
            let mut core = self.shared.lock();
            core.time = report.time;
            core.reason = report.reason;
            match report.reason {
                WakeReason::Start => {
                    debug!(time = %report.time, "driver started the run");
                    None
                }
                WakeReason::TimeElapsed => {
                    core.ticks += 1;
                    let woken = core.processes.tick();
                    debug!(tick = core.ticks, time = %report.time, woken, "time advanced");
                    None
                }
                WakeReason::Callback(token) => match core.callbacks.take(token) {
                    Some(handler) => {
                        core.callbacks_fired += 1;
                        Some((token, handler))
                    }
                    None => {
                        warn!(%token, "ignoring stale callback");
                        None
                    }
                },
            }
        };
        let Some((token, handler)) = fired else {
            return Ok(());
        };
        trace!(%token, "running callback handler");
        let cx = CallbackContext {
            token,
            shared: &self.shared,
        };
        let reason = match panic::catch_unwind(AssertUnwindSafe(|| handler(&cx))) {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        Err(SchedError::CallbackFailed { token, reason })
    }

    /// Resumes runnable processes until the barrier holds.
    fn run_round(&mut self) -> Result<RoundOutcome, SchedError> {
        let mut resumed = 0usize;
        loop {
            let next = self.shared.lock().processes.next_runnable();
            let Some(id) = next else {
                break;
            };
            resumed += 1;
            match self.resume(id)? {
                Yield::Wait(ticks) => {
                    self.shared.lock().processes.suspend(id, ticks);
                    trace!(%id, ticks, "process suspended");
                }
                Yield::Exited => {
                    let entry = self.shared.lock().processes.remove(id);
                    trace!(%id, "process exited");
                    if let Some(entry) = entry {
                        join_process(id, entry.link);
                    }
                }
                Yield::Finish => {
                    info!(%id, "finish requested");
                    return Ok(RoundOutcome::FinishRequested);
                }
                Yield::Failed(reason) => {
                    let name = self.process_name(id);
                    return Err(SchedError::ProcessFailed { id, name, reason });
                }
            }
        }
        let mut core = self.shared.lock();
        core.rounds += 1;
        debug_assert!(core.processes.is_quiescent());
        debug!(
            round = core.rounds,
            resumed,
            live = core.processes.len(),
            "barrier reached"
        );
        Ok(RoundOutcome::Quiescent)
    }

    /// Hands control to process `id` and waits for it to yield.
    fn resume(&mut self, id: ProcessId) -> Result<Yield, SchedError> {
        {
            let core = self.shared.lock();
            let link = core
                .processes
                .link(id)
                .ok_or_else(|| SchedError::Internal(format!("runnable process {id} has no link")))?;
            link.resume
                .try_send(())
                .map_err(|_| SchedError::Internal(format!("process {id} cannot be resumed")))?;
        }
        trace!(%id, "process resumed");
        let msg = match self.config.barrier_timeout {
            Some(timeout) => match self.yields.recv_timeout(timeout) {
                Ok(msg) => msg,
                Err(RecvTimeoutError::Timeout) => {
                    self.stuck = Some(id);
                    return Err(SchedError::Starved {
                        id,
                        name: self.process_name(id),
                        timeout,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SchedError::Internal("yield channel closed".into()))
                }
            },
            None => self
                .yields
                .recv()
                .map_err(|_| SchedError::Internal("yield channel closed".into()))?,
        };
        if msg.id != id {
            return Err(SchedError::Internal(format!(
                "expected {id} to yield, got {}",
                msg.id
            )));
        }
        Ok(msg.kind)
    }

    /// Refreshes the change monitor, then flushes the write buffer.
    fn publish(&mut self) -> Result<(), SchedError> {
        let mut core = self.shared.lock();
        let Core {
            access,
            monitor,
            writes,
            ..
        } = &mut *core;
        let sampled = monitor.refresh(access.as_mut())?;
        let applied = writes.flush(access.as_mut())?;
        core.writes_flushed += applied as u64;
        trace!(sampled, applied, "step published");
        Ok(())
    }

    /// Ends the run: releases every parked process and joins its thread.
    fn teardown(&mut self) {
        let (entries, discarded) = {
            let mut core = self.shared.lock();
            core.phase = Phase::Finished;
            let discarded = core.writes.discard();
            core.callbacks.clear();
            (core.processes.drain(), discarded)
        };
        if discarded > 0 {
            debug!(discarded, "dropped writes queued after the last flush");
        }
        // Disconnect every resume channel first so all parked threads unwind together.
        let threads: Vec<_> = entries
            .into_iter()
            .map(|(id, entry)| {
                let ProcessLink { resume, thread } = entry.link;
                drop(resume);
                (id, thread)
            })
            .collect();
        for (id, thread) in threads {
            if self.stuck == Some(id) {
                warn!(%id, "leaving unresponsive process thread detached");
                continue;
            }
            if let Some(thread) = thread {
                if thread.join().is_err() {
                    warn!(%id, "process thread panicked during teardown");
                }
            }
        }
    }

    fn process_name(&self, id: ProcessId) -> String {
        self.shared
            .lock()
            .processes
            .name(id)
            .unwrap_or("<unknown>")
            .to_string()
    }

    fn summary(&self, end: RunEnd) -> RunSummary {
        let core = self.shared.lock();
        RunSummary {
            end,
            ticks: core.ticks,
            final_time: core.time,
            rounds: core.rounds,
            processes_spawned: core.processes.spawned(),
            writes_flushed: core.writes_flushed,
            callbacks_fired: core.callbacks_fired,
        }
    }
}

fn join_process(id: ProcessId, link: ProcessLink) {
    let ProcessLink { resume, thread } = link;
    drop(resume);
    if let Some(thread) = thread {
        if thread.join().is_err() {
            warn!(%id, "process thread panicked after exiting");
        }
    }
}

/// Starts a scheduler on its own thread.
///
/// `bootstrap` runs first on that thread with the bootstrap context and
/// typically spawns the initial processes. The returned [`DriverPort`] is
/// for the driver; the join handle yields the run's outcome, including any
/// fatal error.
pub fn spawn_scheduler<A, B>(
    access: A,
    config: SchedulerConfig,
    bootstrap: B,
) -> Result<(DriverPort, JoinHandle<Result<RunSummary, SchedError>>), SchedError>
where
    A: SimAccess + 'static,
    B: FnOnce(&mut Scheduler) -> Result<(), SchedError> + Send + 'static,
{
    let (mut scheduler, port) = Scheduler::new(access, config);
    let name = "cosim-scheduler".to_string();
    let handle = thread::Builder::new()
        .name(name.clone())
        .spawn(move || match bootstrap(&mut scheduler) {
            Ok(()) => scheduler.run(),
            Err(err) => Err(scheduler.abort(err)),
        })
        .map_err(|source| SchedError::Thread { name, source })?;
    Ok((port, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeAccess;
    use cosim_common::Handle;

    fn driver_thread(
        mut port: DriverPort,
        ticks: u64,
    ) -> thread::JoinHandle<Vec<SchedulerReply>> {
        thread::spawn(move || {
            let mut replies = Vec::new();
            let mut reply = port.start(SimTime::ZERO);
            for t in 1..=ticks {
                match reply {
                    Ok(SchedulerReply::Yield) => replies.push(SchedulerReply::Yield),
                    Ok(other) => {
                        replies.push(other);
                        return replies;
                    }
                    Err(_) => return replies,
                }
                reply = port.report_time_elapsed(SimTime::from_units(t));
            }
            if let Ok(r) = reply {
                replies.push(r);
            }
            replies
        })
    }

    #[test]
    fn empty_scheduler_exhausts_immediately() {
        let (scheduler, port) = Scheduler::new(FakeAccess::new(), SchedulerConfig::default());
        assert_eq!(scheduler.phase(), Phase::Idle);
        let driver = driver_thread(port, 3);
        let summary = scheduler.run().unwrap();
        assert_eq!(summary.end, RunEnd::Exhausted);
        assert_eq!(summary.ticks, 0);
        assert_eq!(driver.join().unwrap(), vec![SchedulerReply::Finished]);
    }

    #[test]
    fn bootstrap_spawn_moves_to_running() {
        let (mut scheduler, _port) = Scheduler::new(FakeAccess::new(), SchedulerConfig::default());
        scheduler.spawn("idle", |_| Ok(())).unwrap();
        assert_eq!(scheduler.phase(), Phase::Running);
        assert_eq!(scheduler.process_count(), 1);
    }

    #[test]
    fn ticks_counted_until_finish() {
        let (mut scheduler, port) = Scheduler::new(FakeAccess::new(), SchedulerConfig::default());
        scheduler
            .spawn("three", |ctx| {
                ctx.wait(3)?;
                assert_eq!(ctx.tick()?, 3);
                ctx.finish()?;
                Ok(())
            })
            .unwrap();
        let driver = driver_thread(port, 10);
        let summary = scheduler.run().unwrap();
        assert_eq!(summary.end, RunEnd::Finished);
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.final_time, SimTime::from_units(3));
        let replies = driver.join().unwrap();
        assert_eq!(replies.last(), Some(&SchedulerReply::Finished));
        assert_eq!(replies.len(), 4);
    }

    #[test]
    fn last_writes_flushed_when_processes_return() {
        let h = Handle::from_raw(1);
        let mut access = FakeAccess::new();
        access.set(h, 0);
        let (mut scheduler, port) = Scheduler::new(access, SchedulerConfig::default());
        scheduler
            .spawn("writer", move |ctx| {
                ctx.write(h, true)?;
                Ok(())
            })
            .unwrap();
        let driver = driver_thread(port, 2);
        let summary = scheduler.run().unwrap();
        assert_eq!(summary.end, RunEnd::Exhausted);
        assert_eq!(summary.writes_flushed, 1);
        driver.join().unwrap();
    }

    #[test]
    fn failing_process_aborts_and_releases_driver() {
        let (mut scheduler, port) = Scheduler::new(FakeAccess::new(), SchedulerConfig::default());
        scheduler
            .spawn("broken", |_| Err(crate::ProcessError::failure("parity mismatch")))
            .unwrap();
        let driver = driver_thread(port, 5);
        let err = scheduler.run().unwrap_err();
        match err {
            SchedError::ProcessFailed { name, reason, .. } => {
                assert_eq!(name, "broken");
                assert_eq!(reason, "parity mismatch");
            }
            other => panic!("expected ProcessFailed, got {other:?}"),
        }
        let replies = driver.join().unwrap();
        assert!(matches!(
            replies.last(),
            Some(SchedulerReply::Aborted { reason }) if reason.contains("broken")
        ));
    }

    #[test]
    fn handshake_timeout_aborts() {
        let config = SchedulerConfig {
            handshake_timeout: Some(Duration::from_millis(20)),
            barrier_timeout: None,
        };
        let (mut scheduler, _port) = Scheduler::new(FakeAccess::new(), config);
        scheduler.spawn("idle", |ctx| Ok(ctx.wait(1)?)).unwrap();
        let err = scheduler.run().unwrap_err();
        assert!(matches!(
            err,
            SchedError::Handshake(crate::HandshakeError::Timeout(_))
        ));
    }
}
