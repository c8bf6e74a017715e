//! GPU-visible tensor buffers in two memory models
//!
//! *Paired* tensors own a host block (system allocator, individually
//! freeable) and a device block, linked by one descriptor. *Unified* tensors
//! own a single handle coherently visible from both sides. Every byte size
//! that reaches the backend is rounded up to a 256-byte boundary for the
//! bulk-transfer hardware path.

pub mod manager;

pub use manager::{
    DeviceFailurePolicy, Mode, TensorError, TensorHandle, TensorManager, TensorResult,
    TENSOR_ALIGNMENT,
};
