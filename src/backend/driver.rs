//! Compute driver trait and backend error type

use thiserror::Error;

/// Device-visible memory address. Matches the driver's 64-bit pointer width
/// regardless of host pointer size.
pub type DevicePtr = u64;

/// Driver device handle (ordinal-derived, device 0 in this design).
pub type DeviceHandle = i32;

/// Opaque compute context handle as handed out by the driver.
pub type RawContext = u64;

/// Compute backend errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComputeError {
    /// A backend call failed with the driver's raw status code.
    #[error("compute backend call failed with status {0}")]
    BackendFailure(i32),
    #[error("internal lock poisoned - this indicates a bug: {0}")]
    LockPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for ComputeError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ComputeError::LockPoisoned(format!("backend lock poisoned: {}", err))
    }
}

impl ComputeError {
    /// Raw driver status code, if this error carries one.
    pub fn backend_code(&self) -> Option<i32> {
        match self {
            ComputeError::BackendFailure(code) => Some(*code),
            ComputeError::LockPoisoned(_) => None,
        }
    }
}

/// Compute backend result type
pub type ComputeResult<T> = Result<T, ComputeError>;

/// Seam over the GPU compute driver.
///
/// Only the allocation/lifecycle surface the runtime needs is exposed;
/// kernel launches and scheduling are out of scope. Implementations must be
/// internally thread-safe for the memory calls; context calls are serialized
/// by [`super::ContextManager`].
///
/// Every fallible method reports failure as
/// [`ComputeError::BackendFailure`] carrying the driver's status code.
pub trait ComputeDriver: Send + Sync {
    /// Initialize the driver. Safe to call more than once.
    fn init(&self) -> ComputeResult<()>;

    /// Look up the device at `ordinal`.
    fn device_get(&self, ordinal: i32) -> ComputeResult<DeviceHandle>;

    /// Create a context bound to `device`.
    fn ctx_create(&self, device: DeviceHandle) -> ComputeResult<RawContext>;

    /// Mark `ctx` current for the calling thread.
    fn ctx_set_current(&self, ctx: RawContext) -> ComputeResult<()>;

    /// Destroy a context created by [`ComputeDriver::ctx_create`].
    fn ctx_destroy(&self, ctx: RawContext) -> ComputeResult<()>;

    /// Allocate `size` bytes of device memory.
    fn mem_alloc(&self, size: usize) -> ComputeResult<DevicePtr>;

    /// Allocate `size` bytes of unified memory, coherently visible from
    /// host and device.
    fn mem_alloc_managed(&self, size: usize) -> ComputeResult<DevicePtr>;

    /// Release memory from either allocation path.
    fn mem_free(&self, ptr: DevicePtr) -> ComputeResult<()>;
}
