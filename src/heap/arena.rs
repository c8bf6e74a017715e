//! Scratch arena with true individual-block reclamation
//!
//! The bump heap deliberately never frees. For callers that need to recycle
//! blocks within the process lifetime, this arena is the named alternative:
//! a best-fit free-block allocator over its own reserved region, with
//! coalescing of adjacent free blocks on release. It is an opt-in strategy,
//! not a silent change to the default bump behavior.

use std::ptr::NonNull;

use crate::heap::region::HeapRegion;
use crate::heap::{AllocError, AllocResult};

/// Free block within the arena, tracked as an offset range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FreeBlock {
    /// Byte offset from the region base
    offset: usize,
    /// Size in bytes
    size: usize,
}

impl FreeBlock {
    fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// True if this block ends exactly where `other` starts.
    fn is_adjacent_to(&self, other: &FreeBlock) -> bool {
        self.offset + self.size == other.offset
    }
}

/// Host-memory arena supporting allocate and deallocate.
///
/// Not thread-safe on its own; wrap in a `Mutex` for concurrent use.
#[derive(Debug)]
pub struct ScratchArena {
    region: HeapRegion,
    allocated: usize,
    /// Free blocks, kept sorted by offset and coalesced.
    free_blocks: Vec<FreeBlock>,
}

impl ScratchArena {
    /// Default block alignment (matches the bump heap's word alignment).
    pub const DEFAULT_ALIGNMENT: usize = 8;

    /// Fragments smaller than this are discarded rather than tracked.
    const MIN_FRAGMENT_SIZE: usize = 64;

    /// Reserve a fresh region of `capacity` bytes for the arena.
    pub fn new(capacity: usize) -> AllocResult<Self> {
        let region = HeapRegion::reserve(capacity)?;
        tracing::debug!("scratch arena created: {} bytes", capacity);
        Ok(Self {
            region,
            allocated: 0,
            free_blocks: vec![FreeBlock::new(0, capacity)],
        })
    }

    /// Allocate `size` bytes at the given alignment.
    ///
    /// Returns the byte offset of the block within the arena region; convert
    /// with [`ScratchArena::ptr_at`] when a pointer is needed.
    ///
    /// # Errors
    /// - `InvalidRequest` for a zero size or a non-power-of-two alignment;
    /// - `OutOfMemory` if no free block fits.
    pub fn allocate(&mut self, size: usize, alignment: usize) -> AllocResult<usize> {
        if !alignment.is_power_of_two() {
            return Err(AllocError::InvalidRequest(format!(
                "alignment must be a power of 2, got {}",
                alignment
            )));
        }
        if size == 0 {
            return Err(AllocError::InvalidRequest(
                "allocation size cannot be zero".to_string(),
            ));
        }

        let alignment = alignment.max(Self::DEFAULT_ALIGNMENT);
        let best_idx = self.find_best_fit(size, alignment).ok_or_else(|| {
            AllocError::OutOfMemory {
                requested: size,
                remaining: self.remaining_capacity(),
            }
        })?;

        let block = self.free_blocks[best_idx];
        let offset = align_up(block.offset, alignment);
        let padding = offset - block.offset;
        let remaining = block.size - padding - size;

        self.free_blocks.remove(best_idx);

        if remaining >= Self::MIN_FRAGMENT_SIZE {
            self.free_blocks.push(FreeBlock::new(offset + size, remaining));
        }
        if padding >= Self::MIN_FRAGMENT_SIZE {
            self.free_blocks.push(FreeBlock::new(block.offset, padding));
        }

        self.allocated += size;
        self.sort_free_blocks();

        tracing::trace!(
            "arena allocated {} bytes at offset {} (alignment={})",
            size,
            offset,
            alignment
        );
        Ok(offset)
    }

    /// Return a block to the arena.
    ///
    /// `offset` and `size` must describe a block previously returned by
    /// [`ScratchArena::allocate`]; the arena does not validate them beyond
    /// range bookkeeping.
    pub fn deallocate(&mut self, offset: usize, size: usize) {
        self.allocated = self.allocated.saturating_sub(size);
        self.free_blocks.push(FreeBlock::new(offset, size));
        self.sort_free_blocks();
        tracing::trace!("arena released {} bytes at offset {}", size, offset);
    }

    /// Pointer into the arena region at `offset`.
    pub fn ptr_at(&self, offset: usize) -> Option<NonNull<u8>> {
        if offset >= self.region.len() {
            return None;
        }
        // SAFETY: offset < region.len(), so the address is inside the mapping.
        Some(unsafe { NonNull::new_unchecked(self.region.base().as_ptr().add(offset)) })
    }

    /// Sum of all free block sizes.
    pub fn remaining_capacity(&self) -> usize {
        self.free_blocks.iter().map(|b| b.size).sum()
    }

    /// Bytes currently handed out.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    /// Total region size.
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Number of free fragments.
    pub fn fragment_count(&self) -> usize {
        self.free_blocks.len()
    }

    /// Best-fit: the smallest free block that can satisfy the request at the
    /// required alignment. Minimizes fragmentation and preserves large blocks.
    fn find_best_fit(&self, size: usize, alignment: usize) -> Option<usize> {
        self.free_blocks
            .iter()
            .enumerate()
            .filter_map(|(idx, block)| {
                let aligned_offset = align_up(block.offset, alignment);
                if aligned_offset >= block.offset + block.size {
                    return None; // Block too small for this alignment
                }
                let padding = aligned_offset - block.offset;
                let usable = block.size - padding;
                if usable >= size {
                    Some((idx, usable))
                } else {
                    None
                }
            })
            .min_by_key(|&(_, usable)| usable)
            .map(|(idx, _)| idx)
    }

    fn sort_free_blocks(&mut self) {
        self.free_blocks.sort_by_key(|b| b.offset);
        self.coalesce_free_blocks();
    }

    /// Merge adjacent free blocks to keep contiguous regions available.
    fn coalesce_free_blocks(&mut self) {
        let mut i = 0;
        while i + 1 < self.free_blocks.len() {
            let current = self.free_blocks[i];
            let next = self.free_blocks[i + 1];

            if current.is_adjacent_to(&next) {
                self.free_blocks[i].size += next.size;
                self.free_blocks.remove(i + 1);
                // Don't advance - the grown block may also touch its new neighbor.
            } else {
                i += 1;
            }
        }
    }
}

/// Align `offset` up to `alignment` (power of 2).
fn align_up(offset: usize, alignment: usize) -> usize {
    (offset + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_boundary() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(255, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
    }

    #[test]
    fn free_block_adjacency() {
        let a = FreeBlock::new(0, 100);
        let b = FreeBlock::new(100, 200);
        let c = FreeBlock::new(300, 100);

        assert!(a.is_adjacent_to(&b));
        assert!(b.is_adjacent_to(&c));
        assert!(!a.is_adjacent_to(&c));
    }

    #[test]
    fn basic_allocation_and_accounting() {
        let mut arena = ScratchArena::new(16384).unwrap();

        let offset1 = arena.allocate(1000, 8).unwrap();
        assert_eq!(offset1, 0);
        assert_eq!(arena.allocated_bytes(), 1000);

        let offset2 = arena.allocate(500, 8).unwrap();
        assert!(offset2 >= 1000);
        assert_eq!(arena.allocated_bytes(), 1500);
        assert!(arena.ptr_at(offset2).is_some());
    }

    #[test]
    fn alignment_is_honored() {
        let mut arena = ScratchArena::new(16384).unwrap();

        let a = arena.allocate(100, 256).unwrap();
        assert_eq!(a % 256, 0);
        let b = arena.allocate(100, 512).unwrap();
        assert_eq!(b % 512, 0);
    }

    #[test]
    fn deallocate_enables_reuse() {
        let mut arena = ScratchArena::new(8192).unwrap();

        let _a = arena.allocate(1024, 8).unwrap();
        let b = arena.allocate(1024, 8).unwrap();
        let _c = arena.allocate(1024, 8).unwrap();

        arena.deallocate(b, 1024);

        // Best-fit should place a block of the same size back into the hole.
        let reused = arena.allocate(1024, 8).unwrap();
        assert_eq!(reused, b);
    }

    #[test]
    fn coalescing_merges_adjacent_blocks() {
        let mut arena = ScratchArena::new(8192).unwrap();

        let a = arena.allocate(1024, 8).unwrap();
        let b = arena.allocate(1024, 8).unwrap();
        assert_eq!(b, a + 1024);

        arena.deallocate(a, 1024);
        arena.deallocate(b, 1024);

        // Both blocks and the tail merge back to one region.
        assert_eq!(arena.fragment_count(), 1);
        assert_eq!(arena.remaining_capacity(), 8192);
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let mut arena = ScratchArena::new(1024).unwrap();
        assert!(matches!(
            arena.allocate(0, 8),
            Err(AllocError::InvalidRequest(_))
        ));
        assert!(matches!(
            arena.allocate(16, 100),
            Err(AllocError::InvalidRequest(_))
        ));
    }

    #[test]
    fn exhaustion_reports_out_of_memory() {
        let mut arena = ScratchArena::new(1024).unwrap();
        arena.allocate(900, 8).unwrap();
        assert!(matches!(
            arena.allocate(512, 8),
            Err(AllocError::OutOfMemory { .. })
        ));
    }
}
