//! Physical memory management: the buddy allocator and the page-table-page pool layered on it

pub use stdos::mm::{buddy, pt_pool};

use crate::board;
use buddy::BuddyAllocator;
use pt_pool::PtPool;

/// The kernel's single physical buddy allocator
pub static BUDDY: BuddyAllocator = BuddyAllocator::new();
/// The kernel's single page-table-page pool
pub static PT_POOL: PtPool = PtPool::new(board::p2v(board::INIT_KERNMAP) as usize);

/// Brings up physical memory management: seeds the page-table pool's boot reservoir, then hands
/// the rest of RAM to the buddy allocator
///
/// Mirrors the reference boot sequence's `kpt_freerange` followed by `kmem_init`/`kmem_init2`.
///
/// # Safety
/// Must run exactly once, after the boot-time identity map is live and before any other component
/// allocates physical memory. `kernel_end` must be the first free address after the kernel image
/// (the linker's `end` symbol).
pub unsafe fn init(kernel_end: usize) {
    let pt_reservoir_end = board::p2v(board::INIT_KERNMAP) as usize;
    let pt_reservoir_start = align_up(kernel_end, pt_pool::PT_SZ);
    // SAFETY: `[pt_reservoir_start, pt_reservoir_end)` is unused boot memory below the heap, per
    // this function's caller contract
    unsafe { PT_POOL.free_range(pt_reservoir_start, pt_reservoir_end) };

    BUDDY.init();
    let heap_end = board::p2v(board::PHYSTOP) as usize;
    // SAFETY: `[pt_reservoir_end, heap_end)` is unused boot memory, per this function's caller
    // contract
    unsafe { BUDDY.init2(pt_reservoir_end, heap_end) };
}

/// Rounds `addr` up to the next multiple of `align`, which must be a power of two
const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}
