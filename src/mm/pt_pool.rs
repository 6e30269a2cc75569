//! Fixed-size allocator for page-table pages
//!
//! Seeded at boot from a reservoir of memory below the kernel heap (returned via
//! [`PtPool::free_range`] in [`PT_SZ`] increments); once that reservoir is exhausted, further pages
//! come from the physical [`BuddyAllocator`] at [`PT_ORDER`].

use super::buddy::BuddyAllocator;
use core::ptr::NonNull;
use crate::sync::SpinLock;

/// Order at which a page-table page is allocated from the buddy allocator when the boot reservoir
/// is empty. A 4 KiB-granule, 2 MiB-block PMD level requires a full 512-entry leaf table
/// underneath it, which is 4 KiB (`1 << 12`), not the 1 KiB that the reference implementation's
/// own (incorrect) comment claims — see `DESIGN.md`.
pub const PT_ORDER: u32 = 12;
/// Size, in bytes, of one page-table page
pub const PT_SZ: usize = 1 << PT_ORDER;

/// Intrusive free-list node, written into the first bytes of a free page-table page
struct FreeNode {
    next: Option<NonNull<FreeNode>>,
}

/// A free list of page-table pages
pub struct PtPool {
    /// Head of the boot-reservoir free list
    free_list: SpinLock<Option<NonNull<FreeNode>>>,
    /// The physical address at or above which a returned page belongs to the buddy allocator
    /// rather than the boot reservoir
    heap_boundary: usize,
}

// SAFETY: access to the free list is serialized by the spinlock; `heap_boundary` is immutable
// after construction
unsafe impl Sync for PtPool {}

impl PtPool {
    /// Creates an empty pool. `heap_boundary` should be the kernel-virtual address of
    /// `INIT_KERNMAP` (`P2V(INIT_KERNMAP)`): addresses below it were handed out by
    /// [`Self::free_range`] during boot and must come back to the free list; addresses at or
    /// above it belong to the buddy allocator.
    pub const fn new(heap_boundary: usize) -> Self {
        Self {
            free_list: SpinLock::new(None),
            heap_boundary,
        }
    }

    /// Seeds the pool's boot reservoir by pushing every `PT_SZ`-aligned region in `[low, hi)`
    /// onto the free list
    ///
    /// # Safety
    /// `[low, hi)` must be valid, exclusively-owned memory, aligned to `PT_SZ`
    pub unsafe fn free_range(&self, low: usize, hi: usize) {
        let mut addr = low;
        while addr + PT_SZ <= hi {
            // SAFETY: `addr` is within the caller-guaranteed exclusive range
            unsafe { self.push(addr) };
            addr += PT_SZ;
        }
    }

    /// # Safety
    /// `addr` must be a `PT_SZ`-aligned, exclusively-owned page not already on any free list
    unsafe fn push(&self, addr: usize) {
        let node = addr as *mut FreeNode;
        let mut head = self.free_list.lock();
        // SAFETY: caller guarantees `addr` is valid, aligned, and exclusively owned
        unsafe {
            node.write(FreeNode { next: *head });
        }
        *head = NonNull::new(node);
    }

    /// Allocates one zeroed, `PT_SZ`-aligned page-table page
    ///
    /// # Panics
    /// Panics if both the boot reservoir and the buddy allocator are exhausted
    pub fn alloc(&self, buddy: &BuddyAllocator) -> NonNull<u8> {
        let addr = {
            let mut head = self.free_list.lock();
            match *head {
                Some(node) => {
                    // SAFETY: every node on the free list was pushed as a valid, owned page
                    let next = unsafe { node.as_ref() }.next;
                    *head = next;
                    Some(node.as_ptr() as usize)
                }
                None => None,
            }
        }
        .or_else(|| buddy.alloc(PT_ORDER))
        .expect("page-table page pool and buddy allocator both exhausted");

        let ptr = addr as *mut u8;
        // SAFETY: `addr` is a freshly obtained, exclusively-owned `PT_SZ` region
        unsafe { ptr.write_bytes(0, PT_SZ) };
        NonNull::new(ptr).expect("pool addresses are never null")
    }

    /// Returns a page-table page previously obtained from [`Self::alloc`]
    ///
    /// # Safety
    /// `ptr` must have been returned by a prior call to [`Self::alloc`] on this pool and must not
    /// be used again afterwards
    pub unsafe fn free(&self, ptr: NonNull<u8>, buddy: &BuddyAllocator) {
        let addr = ptr.as_ptr() as usize;
        if addr >= self.heap_boundary {
            buddy.free(addr, PT_ORDER);
        } else {
            // SAFETY: caller guarantees `ptr` is an owned page-table page no longer in use
            unsafe { self.push(addr) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_reservoir_round_trips() {
        let mut backing = alloc::vec![0_u8; PT_SZ * 4];
        let base = backing.as_mut_ptr() as usize;
        let pool = PtPool::new(usize::MAX);
        // SAFETY: `backing` is exclusively owned for the duration of the test
        unsafe { pool.free_range(base, base + backing.len()) };

        let buddy = BuddyAllocator::new();
        let page = pool.alloc(&buddy);
        assert_eq!(page.as_ptr() as usize % PT_SZ, 0);
        // SAFETY: `page` came from this pool and is not used again
        unsafe { pool.free(page, &buddy) };
    }
}
