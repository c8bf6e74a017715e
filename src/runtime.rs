//! Runtime facade owning all bridge state
//!
//! One [`Runtime`] per process-equivalent scope; no process-wide statics.
//! Construction is the (no-op) load hook; `Drop` is the mandatory unload
//! hook, destroying the compute context and releasing the heap region if
//! they were ever created.

use std::ptr::NonNull;
use std::sync::Arc;

use crate::backend::context::ContextManager;
use crate::backend::driver::{ComputeDriver, ComputeResult};
use crate::heap::bump::{BumpHeap, DEFAULT_HEAP_CAPACITY};
use crate::heap::AllocResult;
use crate::tensor::manager::{DeviceFailurePolicy, Mode, TensorHandle, TensorManager, TensorResult};

/// Runtime construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Bump heap region size, reserved lazily on first allocation.
    pub heap_capacity: usize,
    /// Policy for backend allocation failures after the context is up.
    pub device_failure_policy: DeviceFailurePolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            heap_capacity: DEFAULT_HEAP_CAPACITY,
            device_failure_policy: DeviceFailurePolicy::default(),
        }
    }
}

/// Owner of the bump heap, the compute context, and the tensor manager.
#[derive(Debug)]
pub struct Runtime {
    heap: BumpHeap,
    context: Arc<ContextManager>,
    tensors: TensorManager,
}

impl Runtime {
    /// Build a runtime with default configuration (64 MiB heap, propagate
    /// device failures).
    pub fn new(driver: Arc<dyn ComputeDriver>) -> Self {
        Self::with_config(driver, RuntimeConfig::default())
    }

    pub fn with_config(driver: Arc<dyn ComputeDriver>, config: RuntimeConfig) -> Self {
        tracing::debug!(
            "runtime created: heap capacity {} bytes, policy {:?}",
            config.heap_capacity,
            config.device_failure_policy
        );
        let context = Arc::new(ContextManager::new(driver));
        let tensors = TensorManager::new(context.clone(), config.device_failure_policy);
        Runtime {
            heap: BumpHeap::new(config.heap_capacity),
            context,
            tensors,
        }
    }

    /// The bump heap, for callers that need its statistics directly.
    pub fn heap(&self) -> &BumpHeap {
        &self.heap
    }

    /// Bump-allocate `size` bytes (rounded to 8). Never individually freed.
    pub fn malloc(&self, size: usize) -> AllocResult<NonNull<u8>> {
        self.heap.allocate(size)
    }

    /// Release a bump allocation: a documented no-op.
    pub fn free(&self, ptr: NonNull<u8>) {
        self.heap.free(ptr)
    }

    /// Initialize the compute context now instead of on first tensor use.
    pub fn ensure_context(&self) -> ComputeResult<()> {
        self.context.ensure_context()
    }

    /// Allocate a tensor; sizes are rounded to 256 before reaching the
    /// backend. Initializes the compute context on first use.
    pub fn tensor_alloc(&self, size: usize, mode: Mode) -> TensorResult<TensorHandle> {
        self.tensors.alloc(size, mode)
    }

    /// Free a tensor allocated by this runtime.
    pub fn tensor_free(&self, handle: TensorHandle) {
        self.tensors.free(handle)
    }
}
