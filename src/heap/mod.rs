//! Process-local heap support for the runtime bridge
//!
//! Two allocation strategies live here:
//!
//! - [`BumpHeap`]: the default path. One lazily-reserved region, a forward-only
//!   cursor, and a `free` that never reclaims. Callers must tolerate
//!   unbounded-until-teardown growth.
//! - [`ScratchArena`]: the named alternative for callers that need true
//!   individual-block reclamation. Best-fit free blocks with coalescing.

pub mod arena;
pub mod bump;
pub mod region;

pub use arena::ScratchArena;
pub use bump::{BumpHeap, DEFAULT_HEAP_CAPACITY};
pub use region::HeapRegion;

use thiserror::Error;

/// Heap allocation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// The operating system refused the initial region reservation.
    /// Fatal to any further use of the heap; never retried at a smaller size.
    #[error("heap region reservation failed: {0}")]
    ReservationFailed(String),
    /// The bump cursor would exceed the fixed region. Recoverable by the
    /// caller; never triggers a larger re-reservation.
    #[error("heap out of memory: requested {requested} bytes, {remaining} remaining")]
    OutOfMemory { requested: usize, remaining: usize },
    /// Zero-size or non-power-of-two-aligned request to the arena.
    #[error("invalid allocation request: {0}")]
    InvalidRequest(String),
    #[error("internal lock poisoned - this indicates a bug: {0}")]
    LockPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for AllocError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        AllocError::LockPoisoned(format!("heap lock poisoned: {}", err))
    }
}

/// Heap result type
pub type AllocResult<T> = Result<T, AllocError>;
