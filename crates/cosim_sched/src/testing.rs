//! In-crate test double for [`SimAccess`].

use std::collections::HashMap;

use cosim_common::{Handle, LogicVec};

use crate::access::{Receipt, SimAccess, Trigger, WriteRequest};
use crate::callback::CallbackToken;
use crate::error::AccessError;

/// Records every call and serves reads from a plain map.
#[derive(Default)]
pub(crate) struct FakeAccess {
    pub values: HashMap<Handle, LogicVec>,
    pub writes: Vec<(Handle, WriteRequest)>,
    pub registered: Vec<(Trigger, CallbackToken)>,
    pub cancelled: Vec<Receipt>,
    pub reads: usize,
    pub reject_callbacks: bool,
}

impl FakeAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, handle: Handle, value: u64) {
        self.values.insert(handle, LogicVec::from_u64(value, 1));
    }
}

impl SimAccess for FakeAccess {
    fn read_value(&mut self, handle: Handle) -> Result<LogicVec, AccessError> {
        self.reads += 1;
        self.values
            .get(&handle)
            .cloned()
            .ok_or(AccessError::UnknownHandle(handle))
    }

    fn write_value(&mut self, handle: Handle, request: &WriteRequest) -> Result<(), AccessError> {
        self.writes.push((handle, request.clone()));
        self.values.insert(handle, request.value.clone());
        Ok(())
    }

    fn register_callback(
        &mut self,
        trigger: &Trigger,
        token: CallbackToken,
    ) -> Result<Receipt, AccessError> {
        if self.reject_callbacks {
            return Err(AccessError::Simulator("callbacks disabled".into()));
        }
        self.registered.push((*trigger, token));
        Ok(Receipt::from_raw(self.registered.len() as u64))
    }

    fn cancel_callback(&mut self, receipt: Receipt) -> Result<(), AccessError> {
        self.cancelled.push(receipt);
        Ok(())
    }
}
