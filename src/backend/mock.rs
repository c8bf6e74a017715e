//! Recording mock of the compute driver
//!
//! Every trait call is appended to an in-order log so tests can assert the
//! exact backend call sequence. Failures are scripted one-shot: the next
//! matching call fails with the given status code, then the script slot
//! clears. The mock also tracks live allocations so leak assertions are
//! possible without a GPU.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::backend::driver::{
    ComputeDriver, ComputeError, ComputeResult, DeviceHandle, DevicePtr, RawContext,
};

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Init,
    DeviceGet(i32),
    CtxCreate(DeviceHandle),
    CtxSetCurrent(RawContext),
    CtxDestroy(RawContext),
    MemAlloc(usize),
    MemAllocManaged(usize),
    MemFree(DevicePtr),
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<DriverCall>,
    fail_next_init: Option<i32>,
    fail_next_mem_alloc: Option<i32>,
    fail_next_mem_alloc_managed: Option<i32>,
    next_ptr: DevicePtr,
    live: HashMap<DevicePtr, usize>,
}

/// In-memory compute driver double.
#[derive(Debug, Default)]
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next `init` call to fail with `code`.
    pub fn fail_next_init(&self, code: i32) {
        self.lock().fail_next_init = Some(code);
    }

    /// Script the next `mem_alloc` call to fail with `code`.
    pub fn fail_next_mem_alloc(&self, code: i32) {
        self.lock().fail_next_mem_alloc = Some(code);
    }

    /// Script the next `mem_alloc_managed` call to fail with `code`.
    pub fn fail_next_mem_alloc_managed(&self, code: i32) {
        self.lock().fail_next_mem_alloc_managed = Some(code);
    }

    /// Snapshot of all calls recorded so far, in order.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.lock().calls.clone()
    }

    /// Number of allocations handed out and not yet freed.
    pub fn live_allocations(&self) -> usize {
        self.lock().live.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A poisoned mock is still observable; tests should keep running.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ComputeDriver for MockDriver {
    fn init(&self) -> ComputeResult<()> {
        let mut state = self.lock();
        state.calls.push(DriverCall::Init);
        if let Some(code) = state.fail_next_init.take() {
            return Err(ComputeError::BackendFailure(code));
        }
        Ok(())
    }

    fn device_get(&self, ordinal: i32) -> ComputeResult<DeviceHandle> {
        let mut state = self.lock();
        state.calls.push(DriverCall::DeviceGet(ordinal));
        if ordinal == 0 {
            Ok(0)
        } else {
            // Single mock device, matching the no-multi-GPU design.
            Err(ComputeError::BackendFailure(101))
        }
    }

    fn ctx_create(&self, device: DeviceHandle) -> ComputeResult<RawContext> {
        let mut state = self.lock();
        state.calls.push(DriverCall::CtxCreate(device));
        Ok(0xC0DE)
    }

    fn ctx_set_current(&self, ctx: RawContext) -> ComputeResult<()> {
        let mut state = self.lock();
        state.calls.push(DriverCall::CtxSetCurrent(ctx));
        Ok(())
    }

    fn ctx_destroy(&self, ctx: RawContext) -> ComputeResult<()> {
        let mut state = self.lock();
        state.calls.push(DriverCall::CtxDestroy(ctx));
        Ok(())
    }

    fn mem_alloc(&self, size: usize) -> ComputeResult<DevicePtr> {
        let mut state = self.lock();
        state.calls.push(DriverCall::MemAlloc(size));
        if let Some(code) = state.fail_next_mem_alloc.take() {
            return Err(ComputeError::BackendFailure(code));
        }
        Ok(Self::hand_out(&mut state, size))
    }

    fn mem_alloc_managed(&self, size: usize) -> ComputeResult<DevicePtr> {
        let mut state = self.lock();
        state.calls.push(DriverCall::MemAllocManaged(size));
        if let Some(code) = state.fail_next_mem_alloc_managed.take() {
            return Err(ComputeError::BackendFailure(code));
        }
        Ok(Self::hand_out(&mut state, size))
    }

    fn mem_free(&self, ptr: DevicePtr) -> ComputeResult<()> {
        let mut state = self.lock();
        state.calls.push(DriverCall::MemFree(ptr));
        state.live.remove(&ptr);
        Ok(())
    }
}

impl MockDriver {
    fn hand_out(state: &mut MockState, size: usize) -> DevicePtr {
        // Distinct, non-null fake device addresses.
        state.next_ptr += 0x1000;
        let ptr = state.next_ptr;
        state.live.insert(ptr, size);
        state.next_ptr += size as DevicePtr;
        ptr
    }
}
