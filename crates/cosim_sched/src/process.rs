//! Process identity, run/wait state, and the registry that drives the barrier.
//!
//! The registry is pure bookkeeping: it knows which processes exist, which one
//! is running, which are queued to run this round, and how many ticks each
//! waiting process still has to sit out. Threads and channels live in the
//! per-process link `L` and are managed by the scheduler.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Identifies a registered process for its whole lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Creates a `ProcessId` from a raw index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Where a process is in the round cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    /// Runnable this round, or currently running.
    Run,
    /// Suspended until `remaining` more ticks have been reported.
    Waiting {
        /// Ticks left before the process becomes runnable again.
        remaining: u32,
    },
}

/// A registered process.
#[derive(Debug)]
pub struct ProcessEntry<L> {
    /// Human-readable name used in logs and errors.
    pub name: String,
    /// Current state.
    pub state: ProcessState,
    /// Scheduler-owned link to the process's execution unit.
    pub link: L,
}

/// Every live process, the run queue of the current round, and the
/// currently running process.
#[derive(Debug)]
pub struct ProcessRegistry<L> {
    next_id: u32,
    entries: BTreeMap<ProcessId, ProcessEntry<L>>,
    run_queue: VecDeque<ProcessId>,
    current: Option<ProcessId>,
    spawned: usize,
}

impl<L> ProcessRegistry<L> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
            run_queue: VecDeque::new(),
            current: None,
            spawned: 0,
        }
    }

    /// Registers a new process in the `Run` state and queues it for the
    /// current round.
    pub fn register(&mut self, name: impl Into<String>, link: L) -> ProcessId {
        let id = ProcessId(self.next_id);
        self.next_id += 1;
        self.spawned += 1;
        self.entries.insert(
            id,
            ProcessEntry {
                name: name.into(),
                state: ProcessState::Run,
                link,
            },
        );
        self.run_queue.push_back(id);
        id
    }

    /// Pops the next runnable process and marks it current.
    ///
    /// Queued processes that were removed in the meantime are skipped.
    pub fn next_runnable(&mut self) -> Option<ProcessId> {
        debug_assert!(self.current.is_none(), "a process is already running");
        while let Some(id) = self.run_queue.pop_front() {
            if self.entries.contains_key(&id) {
                self.current = Some(id);
                return Some(id);
            }
        }
        None
    }

    /// Suspends `id` for `ticks` ticks and clears it as current.
    ///
    /// Returns `false` if `id` is not registered.
    pub fn suspend(&mut self, id: ProcessId, ticks: u32) -> bool {
        if self.current == Some(id) {
            self.current = None;
        }
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.state = ProcessState::Waiting { remaining: ticks };
                true
            }
            None => false,
        }
    }

    /// Deregisters `id`, returning its entry.
    pub fn remove(&mut self, id: ProcessId) -> Option<ProcessEntry<L>> {
        if self.current == Some(id) {
            self.current = None;
        }
        self.entries.remove(&id)
    }

    /// Counts one reported tick against every waiting process. Those reaching
    /// zero become runnable and are queued in id order. Returns how many woke.
    pub fn tick(&mut self) -> usize {
        let mut woken = 0;
        for (id, entry) in self.entries.iter_mut() {
            if let ProcessState::Waiting { remaining } = &mut entry.state {
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    entry.state = ProcessState::Run;
                    self.run_queue.push_back(*id);
                    woken += 1;
                }
            }
        }
        woken
    }

    /// True when nothing is running or queued and every process is waiting.
    pub fn is_quiescent(&self) -> bool {
        self.current.is_none()
            && self.run_queue.is_empty()
            && self
                .entries
                .values()
                .all(|e| matches!(e.state, ProcessState::Waiting { .. }))
    }

    /// Returns the currently running process.
    pub fn current(&self) -> Option<ProcessId> {
        self.current
    }

    /// Returns true if `id` is registered.
    pub fn contains(&self, id: ProcessId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Returns the state of `id`.
    pub fn state(&self, id: ProcessId) -> Option<ProcessState> {
        self.entries.get(&id).map(|e| e.state)
    }

    /// Returns the name of `id`.
    pub fn name(&self, id: ProcessId) -> Option<&str> {
        self.entries.get(&id).map(|e| e.name.as_str())
    }

    /// Returns the link of `id`.
    pub fn link(&self, id: ProcessId) -> Option<&L> {
        self.entries.get(&id).map(|e| &e.link)
    }

    /// Returns the link of `id` mutably.
    pub fn link_mut(&mut self, id: ProcessId) -> Option<&mut L> {
        self.entries.get_mut(&id).map(|e| &mut e.link)
    }

    /// Returns the number of registered processes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no process is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns how many processes were ever registered.
    pub fn spawned(&self) -> usize {
        self.spawned
    }

    /// Removes every process, returning the entries in id order.
    pub fn drain(&mut self) -> Vec<(ProcessId, ProcessEntry<L>)> {
        self.current = None;
        self.run_queue.clear();
        std::mem::take(&mut self.entries).into_iter().collect()
    }
}

impl<L> Default for ProcessRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}
