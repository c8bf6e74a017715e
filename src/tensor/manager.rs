//! Tensor allocation, accessors, and teardown

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

use thiserror::Error;

use crate::backend::context::ContextManager;
use crate::backend::driver::{ComputeError, DevicePtr};

/// Backend-facing size alignment: every allocation request is rounded up to
/// this boundary before it reaches the driver.
pub const TENSOR_ALIGNMENT: usize = 256;

/// Tensor memory model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Separate host and device blocks linked by a descriptor.
    Paired,
    /// One backend-managed allocation visible from host and device.
    Unified,
}

/// What to do when the backend refuses a device or unified allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceFailurePolicy {
    /// Unwind any host allocation and return a structured error (default).
    #[default]
    Propagate,
    /// Treat the failure as unrecoverable and abort the process, matching
    /// the behavior of the original runtime this crate replaces.
    Abort,
}

/// Tensor lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    /// The mandatory context-ready check failed.
    #[error("compute context initialization failed: {0}")]
    ContextInitFailed(#[from] ComputeError),
    /// System allocator exhaustion; no partial state is leaked.
    #[error("host allocation of {0} bytes failed")]
    HostAllocFailed(usize),
    /// Backend refused the device or unified allocation
    /// (only reachable under [`DeviceFailurePolicy::Propagate`]).
    #[error("device allocation failed with status {0}")]
    DeviceAllocFailed(i32),
    /// An accessor was applied to a handle of the other memory model.
    #[error("accessor expects a {expected:?} tensor, handle is {actual:?}")]
    WrongMode { expected: Mode, actual: Mode },
    /// Zero-size tensors are rejected rather than given undefined meaning.
    #[error("tensor size cannot be zero")]
    ZeroSize,
    /// Request so large that rounding it to the backend alignment would
    /// overflow the address space.
    #[error("tensor size {0} is too large")]
    TooLarge(usize),
}

/// Tensor result type
pub type TensorResult<T> = Result<T, TensorError>;

/// A paired tensor's two halves plus its recorded byte size.
#[derive(Debug)]
pub struct PairedTensor {
    host: NonNull<u8>,
    device: DevicePtr,
    /// Aligned byte size; also the size of the host block's layout.
    size: usize,
}

// SAFETY: the host pointer is uniquely owned by the descriptor and only
// dereferenced by the owner; the device pointer is an opaque handle.
unsafe impl Send for PairedTensor {}
unsafe impl Sync for PairedTensor {}

/// A unified tensor's single handle. Size is not tracked here; the caller
/// must remember it independently.
#[derive(Debug)]
pub struct UnifiedTensor {
    ptr: DevicePtr,
}

/// Tagged tensor handle. The tag is the memory model, so a mismatched
/// accessor is a defined error instead of a garbage read.
#[derive(Debug)]
pub enum TensorHandle {
    Paired(PairedTensor),
    Unified(UnifiedTensor),
}

impl TensorHandle {
    /// Memory model this handle was allocated with.
    pub fn mode(&self) -> Mode {
        match self {
            TensorHandle::Paired(_) => Mode::Paired,
            TensorHandle::Unified(_) => Mode::Unified,
        }
    }

    /// Host address of a paired tensor.
    pub fn host_ptr(&self) -> TensorResult<NonNull<u8>> {
        match self {
            TensorHandle::Paired(t) => Ok(t.host),
            TensorHandle::Unified(_) => Err(TensorError::WrongMode {
                expected: Mode::Paired,
                actual: Mode::Unified,
            }),
        }
    }

    /// Device address of a paired tensor.
    pub fn device_ptr(&self) -> TensorResult<DevicePtr> {
        match self {
            TensorHandle::Paired(t) => Ok(t.device),
            TensorHandle::Unified(_) => Err(TensorError::WrongMode {
                expected: Mode::Paired,
                actual: Mode::Unified,
            }),
        }
    }

    /// Single handle of a unified tensor.
    pub fn unified_ptr(&self) -> TensorResult<DevicePtr> {
        match self {
            TensorHandle::Unified(t) => Ok(t.ptr),
            TensorHandle::Paired(_) => Err(TensorError::WrongMode {
                expected: Mode::Unified,
                actual: Mode::Paired,
            }),
        }
    }

    /// Recorded aligned byte size. Unified tensors always report 0; the
    /// manager keeps no side-table for them.
    pub fn size(&self) -> usize {
        match self {
            TensorHandle::Paired(t) => t.size,
            TensorHandle::Unified(_) => 0,
        }
    }
}

/// Allocates and frees tensors against one compute context.
///
/// Holds no lock of its own: it composes the context manager (internally
/// guarded) and the backend memory calls (thread-safe per the driver
/// contract). Handles returned here must go back through
/// [`TensorManager::free`]; dropping one on the floor leaks both halves.
#[derive(Debug)]
pub struct TensorManager {
    context: Arc<ContextManager>,
    policy: DeviceFailurePolicy,
}

impl TensorManager {
    pub fn new(context: Arc<ContextManager>, policy: DeviceFailurePolicy) -> Self {
        TensorManager { context, policy }
    }

    /// Allocate a tensor of at least `size` bytes in the given mode.
    ///
    /// The context is initialized on first use. The byte count is rounded up
    /// to [`TENSOR_ALIGNMENT`] before any allocation happens, on both the
    /// host and the backend path.
    pub fn alloc(&self, size: usize, mode: Mode) -> TensorResult<TensorHandle> {
        if size == 0 {
            return Err(TensorError::ZeroSize);
        }
        let aligned = round_up_tensor(size).ok_or(TensorError::TooLarge(size))?;
        self.context.ensure_context()?;

        match mode {
            Mode::Paired => self.alloc_paired(aligned),
            Mode::Unified => self.alloc_unified(aligned),
        }
    }

    /// Free a tensor. Paired order: host memory, device memory, descriptor.
    ///
    /// Consuming the handle makes a double free unrepresentable; the C-style
    /// "null handle is a no-op" case has no analogue here.
    pub fn free(&self, handle: TensorHandle) {
        match handle {
            TensorHandle::Paired(t) => {
                tracing::trace!(
                    "freeing paired tensor: host {:?}, device {:#x}, {} bytes",
                    t.host,
                    t.device,
                    t.size
                );
                // SAFETY: host was allocated by alloc_paired with this exact
                // layout and ownership never left the descriptor.
                unsafe {
                    alloc::dealloc(t.host.as_ptr(), paired_layout(t.size));
                }
                if let Err(err) = self.context.driver().mem_free(t.device) {
                    tracing::warn!("device free of {:#x} failed: {}", t.device, err);
                }
            }
            TensorHandle::Unified(t) => {
                tracing::trace!("freeing unified tensor {:#x}", t.ptr);
                if let Err(err) = self.context.driver().mem_free(t.ptr) {
                    tracing::warn!("unified free of {:#x} failed: {}", t.ptr, err);
                }
            }
        }
    }

    fn alloc_paired(&self, aligned: usize) -> TensorResult<TensorHandle> {
        let layout = paired_layout(aligned);
        // SAFETY: layout has non-zero size (ZeroSize rejected earlier) and a
        // valid power-of-two alignment.
        let host = unsafe { alloc::alloc(layout) };
        let host = NonNull::new(host).ok_or(TensorError::HostAllocFailed(aligned))?;

        let device = match self.context.driver().mem_alloc(aligned) {
            Ok(ptr) => ptr,
            Err(err) => {
                // SAFETY: same layout as the allocation above.
                unsafe { alloc::dealloc(host.as_ptr(), layout) };
                return Err(self.device_failure("device", aligned, err));
            }
        };

        tracing::trace!(
            "paired tensor allocated: host {:?}, device {:#x}, {} bytes",
            host,
            device,
            aligned
        );
        Ok(TensorHandle::Paired(PairedTensor {
            host,
            device,
            size: aligned,
        }))
    }

    fn alloc_unified(&self, aligned: usize) -> TensorResult<TensorHandle> {
        let ptr = self
            .context
            .driver()
            .mem_alloc_managed(aligned)
            .map_err(|err| self.device_failure("unified", aligned, err))?;

        tracing::trace!("unified tensor allocated: {:#x}, {} bytes", ptr, aligned);
        Ok(TensorHandle::Unified(UnifiedTensor { ptr }))
    }

    fn device_failure(&self, kind: &str, aligned: usize, err: ComputeError) -> TensorError {
        let code = err.backend_code().unwrap_or(-1);
        match self.policy {
            DeviceFailurePolicy::Propagate => {
                tracing::debug!(
                    "{} allocation of {} bytes failed with status {}",
                    kind,
                    aligned,
                    code
                );
                TensorError::DeviceAllocFailed(code)
            }
            DeviceFailurePolicy::Abort => {
                tracing::error!(
                    "{} allocation of {} bytes failed with status {}; \
                     abort policy in effect",
                    kind,
                    aligned,
                    code
                );
                std::process::abort();
            }
        }
    }
}

fn paired_layout(aligned: usize) -> Layout {
    // aligned is a non-zero multiple of TENSOR_ALIGNMENT and the alignment is
    // a power of two, so this cannot fail.
    Layout::from_size_align(aligned, TENSOR_ALIGNMENT)
        .expect("aligned tensor size always forms a valid layout")
}

/// Round `size` up to the next multiple of [`TENSOR_ALIGNMENT`].
/// `None` if the rounded size does not fit in `usize`.
fn round_up_tensor(size: usize) -> Option<usize> {
    size.checked_add(TENSOR_ALIGNMENT - 1)
        .map(|s| s & !(TENSOR_ALIGNMENT - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockDriver;

    fn manager(policy: DeviceFailurePolicy) -> (Arc<MockDriver>, TensorManager) {
        let driver = Arc::new(MockDriver::new());
        let context = Arc::new(ContextManager::new(driver.clone()));
        (driver, TensorManager::new(context, policy))
    }

    #[test]
    fn rounding_hits_256_byte_boundaries() {
        assert_eq!(round_up_tensor(1), Some(256));
        assert_eq!(round_up_tensor(100), Some(256));
        assert_eq!(round_up_tensor(256), Some(256));
        assert_eq!(round_up_tensor(257), Some(512));
    }

    #[test]
    fn oversized_requests_are_rejected_before_any_allocation() {
        assert_eq!(round_up_tensor(usize::MAX), None);
        assert_eq!(round_up_tensor(usize::MAX - 255), Some(usize::MAX - 255));

        let (driver, manager) = manager(DeviceFailurePolicy::Propagate);
        assert_eq!(
            manager.alloc(usize::MAX, Mode::Paired).unwrap_err(),
            TensorError::TooLarge(usize::MAX)
        );
        assert_eq!(
            manager.alloc(usize::MAX - 1, Mode::Unified).unwrap_err(),
            TensorError::TooLarge(usize::MAX - 1)
        );
        // Rejected before any backend traffic.
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn paired_tensor_records_aligned_size() {
        let (_driver, manager) = manager(DeviceFailurePolicy::Propagate);
        let handle = manager.alloc(100, Mode::Paired).unwrap();
        assert_eq!(handle.size(), 256);
        assert!(handle.host_ptr().is_ok());
        manager.free(handle);
    }

    #[test]
    fn unified_tensor_does_not_track_size() {
        let (_driver, manager) = manager(DeviceFailurePolicy::Propagate);
        let handle = manager.alloc(1000, Mode::Unified).unwrap();
        assert_eq!(handle.size(), 0);
        assert!(handle.unified_ptr().is_ok());
        manager.free(handle);
    }

    #[test]
    fn wrong_mode_accessors_fail_cleanly() {
        let (_driver, manager) = manager(DeviceFailurePolicy::Propagate);
        let unified = manager.alloc(64, Mode::Unified).unwrap();

        assert!(matches!(
            unified.host_ptr(),
            Err(TensorError::WrongMode { .. })
        ));
        assert!(matches!(
            unified.device_ptr(),
            Err(TensorError::WrongMode { .. })
        ));
        manager.free(unified);
    }

    #[test]
    fn zero_size_is_rejected() {
        let (driver, manager) = manager(DeviceFailurePolicy::Propagate);
        assert_eq!(
            manager.alloc(0, Mode::Paired).unwrap_err(),
            TensorError::ZeroSize
        );
        // Rejected before any backend traffic.
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn device_failure_propagates_and_unwinds() {
        let (driver, manager) = manager(DeviceFailurePolicy::Propagate);
        driver.fail_next_mem_alloc(2);

        let err = manager.alloc(100, Mode::Paired).unwrap_err();
        assert_eq!(err, TensorError::DeviceAllocFailed(2));
        assert_eq!(driver.live_allocations(), 0);

        // The manager stays usable after a propagated failure.
        let handle = manager.alloc(100, Mode::Paired).unwrap();
        manager.free(handle);
        assert_eq!(driver.live_allocations(), 0);
    }
}
