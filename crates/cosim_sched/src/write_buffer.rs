//! Deferred writes, applied to the simulator once per step.
//!
//! Processes never write to the simulator directly. Writes are queued here in
//! issue order and replayed at the step boundary, after every process has
//! suspended and before the driver gets the baton back. Repeated writes to
//! one handle are all forwarded, oldest first, so the last one wins while
//! tracing simulators still see the intermediate values.

use std::collections::HashMap;

use cosim_common::Handle;

use crate::access::{SimAccess, WriteRequest};
use crate::error::AccessError;

/// Writes issued during the current step, grouped per handle.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    /// Handles in the order of their first write this step.
    order: Vec<Handle>,
    pending: HashMap<Handle, Vec<WriteRequest>>,
}

impl WriteBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a write. Never touches the simulator.
    pub fn enqueue(&mut self, handle: Handle, request: WriteRequest) {
        let queue = self.pending.entry(handle).or_insert_with(|| {
            self.order.push(handle);
            Vec::new()
        });
        queue.push(request);
    }

    /// Replays every queued write through the simulator's write primitive,
    /// per handle in issue order, and empties the buffer.
    ///
    /// The buffer is emptied even if a write fails; the error is fatal to the
    /// run anyway. Returns the number of writes applied.
    pub fn flush(&mut self, access: &mut dyn SimAccess) -> Result<usize, AccessError> {
        let order = std::mem::take(&mut self.order);
        let mut pending = std::mem::take(&mut self.pending);
        let mut applied = 0;
        for handle in order {
            for request in pending.remove(&handle).unwrap_or_default() {
                access.write_value(handle, &request)?;
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Drops every queued write without applying it. Returns how many were dropped.
    pub fn discard(&mut self) -> usize {
        let dropped = self.len();
        self.order.clear();
        self.pending.clear();
        dropped
    }

    /// Returns the writes queued for `handle`, oldest first.
    pub fn pending_for(&self, handle: Handle) -> &[WriteRequest] {
        self.pending.get(&handle).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the total number of queued writes.
    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
