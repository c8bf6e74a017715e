//! cubridge - minimal GPU runtime support layer
//!
//! A runtime bridge for low-level code that needs memory before anything
//! else exists: a lazily-reserved bump heap, a lazily-created compute
//! context, and a tensor lifecycle manager over paired (host+device) and
//! unified memory models.
//!
//! All state is owned by an explicit [`Runtime`] rather than process-wide
//! statics, so tests get fresh state and the unload path is ordinary `Drop`.
//!
//! ```no_run
//! use std::sync::Arc;
//! use cubridge::{MockDriver, Mode, Runtime};
//!
//! let runtime = Runtime::new(Arc::new(MockDriver::new()));
//! let block = runtime.malloc(128)?;
//! let tensor = runtime.tensor_alloc(4096, Mode::Paired)?;
//! runtime.tensor_free(tensor);
//! runtime.free(block); // no-op: the bump heap never reclaims
//! # Ok::<(), cubridge::BridgeError>(())
//! ```

pub mod backend;
pub mod error;
pub mod heap;
pub mod logging;
pub mod runtime;
pub mod tensor;

pub use backend::{
    ComputeDriver, ComputeError, ComputeResult, ContextManager, DevicePtr, MockDriver,
};
#[cfg(feature = "cuda")]
pub use backend::CudaDriver;
pub use error::{BridgeError, BridgeResult, ErrorCategory};
pub use heap::{AllocError, AllocResult, BumpHeap, HeapRegion, ScratchArena, DEFAULT_HEAP_CAPACITY};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingError};
pub use runtime::{Runtime, RuntimeConfig};
pub use tensor::{
    DeviceFailurePolicy, Mode, TensorError, TensorHandle, TensorManager, TensorResult,
    TENSOR_ALIGNMENT,
};
