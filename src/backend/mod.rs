//! Compute backend seam
//!
//! The runtime talks to the GPU driver through the [`ComputeDriver`] trait:
//! driver init, device selection, context lifecycle, and device/unified
//! memory allocation. Nothing here launches kernels or schedules work.
//!
//! Implementations:
//! - [`CudaDriver`] (feature `cuda`): FFI bindings to the CUDA driver API.
//! - [`MockDriver`]: records every call and supports scripted failures;
//!   used by the test suites and the diagnostic binary.

pub mod context;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod driver;
pub mod mock;

pub use context::ContextManager;
#[cfg(feature = "cuda")]
pub use cuda::CudaDriver;
pub use driver::{ComputeDriver, ComputeError, ComputeResult, DeviceHandle, DevicePtr, RawContext};
pub use mock::{DriverCall, MockDriver};
