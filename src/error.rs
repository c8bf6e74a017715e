//! Unified error handling for cubridge
//!
//! Each subsystem carries its own error enum (`AllocError`, `ComputeError`,
//! `TensorError`); this module consolidates them into a single crate-level
//! type with categorization, for callers that handle all three at one
//! boundary.

use crate::backend::driver::ComputeError;
use crate::heap::AllocError;
use crate::tensor::manager::TensorError;

/// Unified error type for cubridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Compute(#[from] ComputeError),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Broad error categorization for reporting and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Recoverable and actionable by the caller (smaller request, retry).
    User,
    /// The OS or the GPU driver refused; caller-side retries rarely help.
    Backend,
    /// A bug in this crate (poisoned locks and the like).
    Internal,
}

impl BridgeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::Alloc(AllocError::OutOfMemory { .. })
            | BridgeError::Alloc(AllocError::InvalidRequest(_))
            | BridgeError::Tensor(TensorError::WrongMode { .. })
            | BridgeError::Tensor(TensorError::ZeroSize)
            | BridgeError::Tensor(TensorError::TooLarge(_)) => ErrorCategory::User,

            BridgeError::Alloc(AllocError::ReservationFailed(_))
            | BridgeError::Compute(ComputeError::BackendFailure(_))
            | BridgeError::Tensor(TensorError::ContextInitFailed(_))
            | BridgeError::Tensor(TensorError::HostAllocFailed(_))
            | BridgeError::Tensor(TensorError::DeviceAllocFailed(_)) => ErrorCategory::Backend,

            BridgeError::Alloc(AllocError::LockPoisoned(_))
            | BridgeError::Compute(ComputeError::LockPoisoned(_)) => ErrorCategory::Internal,
        }
    }
}

/// Unified result type
pub type BridgeResult<T> = Result<T, BridgeError>;
