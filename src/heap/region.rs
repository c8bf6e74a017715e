//! Anonymous memory region backing the heap allocators

use std::ptr::NonNull;

use crate::heap::{AllocError, AllocResult};

/// One fixed-size, anonymous, zero-filled, read/write virtual memory region.
///
/// The region is reserved in a single `mmap` call and released as a whole when
/// the owner drops it. Nothing here hands out sub-ranges; that is the job of
/// [`super::BumpHeap`] and [`super::ScratchArena`].
#[derive(Debug)]
pub struct HeapRegion {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the region is plain memory; all mutation of its contents happens
// through the owning allocator, which serializes access behind its own lock.
unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}

impl HeapRegion {
    /// Reserve `len` bytes of anonymous read/write memory from the OS.
    ///
    /// # Errors
    /// `AllocError::ReservationFailed` if the OS cannot provide the region
    /// (for example address space exhaustion). The size is never retried.
    pub fn reserve(len: usize) -> AllocResult<Self> {
        if len == 0 {
            return Err(AllocError::ReservationFailed(
                "region length cannot be zero".to_string(),
            ));
        }

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            let errno = std::io::Error::last_os_error();
            tracing::error!("mmap of {} bytes failed: {}", len, errno);
            return Err(AllocError::ReservationFailed(format!(
                "mmap of {} bytes failed: {}",
                len, errno
            )));
        }

        tracing::debug!("reserved {} byte heap region at {:?}", len, ptr);

        // SAFETY: mmap success means ptr is non-null and valid for len bytes.
        let base = unsafe { NonNull::new_unchecked(ptr.cast::<u8>()) };
        Ok(HeapRegion { base, len })
    }

    /// Base address of the region.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Total region size in bytes, fixed at reservation.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        tracing::debug!("releasing {} byte heap region at {:?}", self.len, self.base);
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_returns_zeroed_writable_memory() {
        let region = HeapRegion::reserve(4096).unwrap();
        assert_eq!(region.len(), 4096);

        let base = region.base().as_ptr();
        unsafe {
            // Anonymous mappings are zero-filled.
            assert_eq!(*base, 0);
            assert_eq!(*base.add(4095), 0);
            // And writable.
            *base = 0xAB;
            assert_eq!(*base, 0xAB);
        }
    }

    #[test]
    fn reserve_zero_length_fails() {
        let result = HeapRegion::reserve(0);
        assert!(matches!(result, Err(AllocError::ReservationFailed(_))));
    }
}
