//! Bump allocator over a lazily-reserved fixed region
//!
//! This is the allocator low-level callers hit before anything else in the
//! runtime is up. It reserves its region on first use, serves allocations by
//! advancing a cursor, and never reclaims: `free` is a documented no-op and
//! the whole region is released when the heap is dropped at teardown.

use std::ptr::NonNull;
use std::sync::Mutex;

use crate::heap::region::HeapRegion;
use crate::heap::{AllocError, AllocResult};

/// Default region size: 64 MiB, reserved in one shot and never resized.
pub const DEFAULT_HEAP_CAPACITY: usize = 64 * 1024 * 1024;

/// Natural word alignment applied to every request.
const WORD_ALIGNMENT: usize = 8;

#[derive(Debug)]
enum HeapState {
    /// No region yet; first allocation (or `ensure_ready`) reserves it.
    Uninit,
    /// Region live, cursor within `[0, region.len()]` and forward-only.
    Ready { region: HeapRegion, cursor: usize },
    /// Reservation failed once; sticky for the life of the heap.
    Failed(AllocError),
}

/// Lazily-initialized bump heap.
///
/// Initialization and allocation share one mutex, so concurrent first-callers
/// race safely (exactly one region is ever reserved) and every allocation is
/// fully serialized.
#[derive(Debug)]
pub struct BumpHeap {
    capacity: usize,
    state: Mutex<HeapState>,
}

impl Default for BumpHeap {
    fn default() -> Self {
        Self::new(DEFAULT_HEAP_CAPACITY)
    }
}

impl BumpHeap {
    /// Create a heap that will reserve `capacity` bytes on first use.
    ///
    /// The capacity is fixed for the life of the heap and never renegotiated.
    pub fn new(capacity: usize) -> Self {
        BumpHeap {
            capacity,
            state: Mutex::new(HeapState::Uninit),
        }
    }

    /// Reserve the backing region if that has not happened yet.
    ///
    /// Idempotent: the first successful call reserves, every later call
    /// returns immediately. A failed reservation is sticky - later calls
    /// report the same `ReservationFailed` without retrying.
    pub fn ensure_ready(&self) -> AllocResult<()> {
        let mut state = self.state.lock()?;
        Self::init_locked(self.capacity, &mut state)
    }

    /// Allocate `size` bytes, rounded up to the next multiple of 8.
    ///
    /// Triggers region reservation internally if needed. The nth successful
    /// allocation always lands at `base + sum(rounded sizes so far)`,
    /// deterministic given the call order.
    ///
    /// # Errors
    /// - `ReservationFailed` if the region could not be reserved (ever);
    /// - `OutOfMemory` if the rounded size does not fit; the cursor is left
    ///   unchanged, so a smaller follow-up request can still succeed.
    pub fn allocate(&self, size: usize) -> AllocResult<NonNull<u8>> {
        let mut state = self.state.lock()?;
        Self::init_locked(self.capacity, &mut state)?;

        let HeapState::Ready { region, cursor } = &mut *state else {
            unreachable!("init_locked leaves the heap ready");
        };

        let remaining = region.len() - *cursor;
        // A size the rounding itself overflows on can never fit either.
        let rounded = round_up_word(size).ok_or(AllocError::OutOfMemory {
            requested: size,
            remaining,
        })?;
        if rounded > remaining {
            tracing::trace!(
                "bump allocation of {} bytes refused: {} remaining",
                rounded,
                remaining
            );
            return Err(AllocError::OutOfMemory {
                requested: rounded,
                remaining,
            });
        }

        // SAFETY: cursor + rounded <= region.len(), so the offset stays
        // inside the mapping.
        let addr = unsafe { NonNull::new_unchecked(region.base().as_ptr().add(*cursor)) };
        *cursor += rounded;

        tracing::trace!("bump allocated {} bytes at {:?}", rounded, addr);
        Ok(addr)
    }

    /// Release a bump allocation. Always a successful no-op.
    ///
    /// The cursor never moves backwards and the pointer is not validated;
    /// the address range stays dead weight until the heap is dropped.
    pub fn free(&self, ptr: NonNull<u8>) {
        tracing::trace!("bump free of {:?} ignored (no reclamation)", ptr);
    }

    /// Fixed capacity this heap reserves.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes consumed so far (0 if the region is not yet reserved).
    pub fn used(&self) -> usize {
        match &*self.state.lock().unwrap_or_else(|e| e.into_inner()) {
            HeapState::Ready { cursor, .. } => *cursor,
            _ => 0,
        }
    }

    fn init_locked(capacity: usize, state: &mut HeapState) -> AllocResult<()> {
        match state {
            HeapState::Ready { .. } => Ok(()),
            HeapState::Failed(err) => Err(err.clone()),
            HeapState::Uninit => match HeapRegion::reserve(capacity) {
                Ok(region) => {
                    tracing::debug!("bump heap ready: {} bytes", capacity);
                    *state = HeapState::Ready { region, cursor: 0 };
                    Ok(())
                }
                Err(err) => {
                    tracing::error!("bump heap reservation failed: {}", err);
                    *state = HeapState::Failed(err.clone());
                    Err(err)
                }
            },
        }
    }
}

/// Round `size` up to the next multiple of the word alignment (8 bytes).
/// `None` if the rounded size does not fit in `usize`.
fn round_up_word(size: usize) -> Option<usize> {
    size.checked_add(WORD_ALIGNMENT - 1)
        .map(|s| s & !(WORD_ALIGNMENT - 1))
}
