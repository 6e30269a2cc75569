//! Physical memory buddy allocator
//!
//! Divides a contiguous physical pool into power-of-two blocks at orders `MIN_ORD..=MAX_ORD`
//! (64 bytes .. 4 KiB). Each order has a contiguous array of [`Mark`]s; a mark tracks the free
//! status of 32 same-order blocks in a bitmap, plus the index-linked list of marks that currently
//! have at least one free block. The mark array itself lives inside the managed memory pool, so
//! every operation here works in terms of raw pointers rather than any higher-level allocation —
//! this is the allocator everything else in the kernel is eventually built on top of.

use crate::sync::SpinLock;

/// Largest block order this allocator serves (4 KiB)
pub const MAX_ORD: u32 = 12;
/// Smallest block order this allocator serves (64 bytes)
pub const MIN_ORD: u32 = 6;
/// Number of distinct orders served
const N_ORD: usize = (MAX_ORD - MIN_ORD + 1) as usize;
/// Sentinel marking the absence of a link
const NIL: u16 = 0xFFFF;

/// One entry in an order's mark array: free-bitmap for 32 blocks, plus this mark's position in
/// the doubly-linked list of marks with at least one free block
#[repr(C)]
#[derive(Clone, Copy)]
struct Mark {
    /// Index of the previous mark in this order's free list, or `NIL`
    prev: u16,
    /// Index of the next mark in this order's free list, or `NIL`
    next: u16,
    /// Bit `i` set means block `i` of this mark's 32 is free
    bitmap: u32,
}

impl Mark {
    const EMPTY: Self = Self {
        prev: NIL,
        next: NIL,
        bitmap: 0,
    };

    const fn is_available(&self, blk_id: u32) -> bool {
        self.bitmap & (1 << (blk_id & 0x1F)) != 0
    }
}

/// Converts a raw link value to an optional mark index
const fn link(raw: u16) -> Option<u16> {
    if raw == NIL {
        None
    } else {
        Some(raw)
    }
}

/// Converts an optional mark index back to its raw link representation
const fn unlink(idx: Option<u16>) -> u16 {
    match idx {
        Some(idx) => idx,
        None => NIL,
    }
}

/// Per-order bookkeeping: the head of the free list, and this order's offset into the shared mark
/// array
#[derive(Clone, Copy)]
struct OrderInfo {
    /// Index (within this order's own slice) of the first mark with a free block
    head: Option<u16>,
    /// Offset, in marks, of this order's slice within the shared mark array
    offset: usize,
}

/// Mutable state protected by the allocator's lock
struct State {
    /// Base address of the mark array (and of the whole managed pool)
    start: usize,
    /// Base address of the first allocatable block, at or above `start` once the mark array has
    /// been carved out
    start_heap: usize,
    /// First address past the end of the managed pool
    end: usize,
    /// Per-order free-list heads and array offsets, indexed by `order - MIN_ORD`
    orders: [OrderInfo; N_ORD],
}

impl State {
    /// Returns a pointer to the mark describing the group of 32 blocks containing `idx` at
    /// `order`
    ///
    /// # Safety
    /// `kmem_init2` must have run, and `idx` must be in range for `order`'s slice of the mark
    /// array
    unsafe fn get_mark(&self, order: u32, idx: u32) -> *mut Mark {
        let order_info = self.orders[(order - MIN_ORD) as usize];
        // SAFETY: caller guarantees this stays within the mark array reserved at `kmem_init2`
        unsafe {
            (self.start as *mut Mark)
                .add(order_info.offset)
                .add(idx as usize)
        }
    }

    const fn blkid_to_addr(&self, order: u32, blk_id: u32) -> usize {
        self.start_heap + ((1_usize << order) * blk_id as usize)
    }

    fn addr_to_blkid(&self, order: u32, addr: usize) -> u32 {
        u32::try_from((addr - self.start_heap) >> order)
            .expect("block id should fit in a u32 for any pool this allocator manages")
    }

    /// Marks a block unavailable, unlinking its mark from the free list if it was the mark's only
    /// free block
    ///
    /// # Safety
    /// `blk_id` must currently be marked available at `order`
    unsafe fn unmark_blk(&mut self, order: u32, blk_id: u32) {
        let order_idx = (order - MIN_ORD) as usize;
        // SAFETY: `blk_id >> 5` is in range because `blk_id` is a valid block id at `order`
        let mark_ptr = unsafe { self.get_mark(order, blk_id >> 5) };
        // SAFETY: `mark_ptr` is valid per the above, and no other reference to it is live
        let mark = unsafe { &mut *mark_ptr };

        assert!(
            mark.is_available(blk_id),
            "buddy allocator: double alloc of block {blk_id} at order {order}"
        );
        mark.bitmap &= !(1 << (blk_id & 0x1F));

        if mark.bitmap == 0 {
            let mark_idx = u16::try_from(blk_id >> 5).expect("mark index should fit in a u16");
            let prev = link(mark.prev);
            let next = link(mark.next);

            match prev {
                Some(prev) => {
                    // SAFETY: `prev` was a valid in-list mark index
                    let prev_mark = unsafe { &mut *self.get_mark(order, u32::from(prev)) };
                    prev_mark.next = unlink(next);
                }
                None if self.orders[order_idx].head == Some(mark_idx) => {
                    self.orders[order_idx].head = next;
                }
                None => {}
            }
            if let Some(next) = next {
                // SAFETY: `next` was a valid in-list mark index
                let next_mark = unsafe { &mut *self.get_mark(order, u32::from(next)) };
                next_mark.prev = unlink(prev);
            }
            mark.prev = NIL;
            mark.next = NIL;
        }
    }

    /// Marks a block available, linking its mark onto the free list if it was previously fully
    /// allocated
    ///
    /// # Safety
    /// `blk_id` must currently be marked unavailable at `order`
    unsafe fn mark_blk(&mut self, order: u32, blk_id: u32) {
        let order_idx = (order - MIN_ORD) as usize;
        // SAFETY: `blk_id >> 5` is in range because `blk_id` is a valid block id at `order`
        let mark_ptr = unsafe { self.get_mark(order, blk_id >> 5) };
        // SAFETY: `mark_ptr` is valid per the above, and no other reference to it is live
        let mark = unsafe { &mut *mark_ptr };

        assert!(
            !mark.is_available(blk_id),
            "buddy allocator: double free of block {blk_id} at order {order}"
        );
        let needs_insert = mark.bitmap == 0;
        mark.bitmap |= 1 << (blk_id & 0x1F);

        if needs_insert {
            let mark_idx = u16::try_from(blk_id >> 5).expect("mark index should fit in a u16");
            let old_head = self.orders[order_idx].head;
            mark.prev = NIL;
            mark.next = unlink(old_head);
            if let Some(old_head) = old_head {
                // SAFETY: `old_head` was a valid in-list mark index
                let head_mark = unsafe { &mut *self.get_mark(order, u32::from(old_head)) };
                head_mark.prev = mark_idx;
            }
            self.orders[order_idx].head = Some(mark_idx);
        }
    }

    /// Pops one free block from the head mark of `order`'s free list
    ///
    /// # Safety
    /// `order`'s free list must be non-empty
    unsafe fn get_blk(&mut self, order: u32) -> usize {
        let head = self.orders[(order - MIN_ORD) as usize]
            .head
            .expect("caller guarantees a non-empty free list");
        // SAFETY: `head` is a valid in-list mark index
        let mark = unsafe { &*self.get_mark(order, u32::from(head)) };
        assert_ne!(
            mark.bitmap, 0,
            "buddy allocator: empty mark present in a non-empty free list"
        );

        let bit = mark.bitmap.trailing_zeros();
        let blk_id = u32::from(head) * 32 + bit;
        // SAFETY: `blk_id` is available, as established by the bitmap check above
        unsafe { self.unmark_blk(order, blk_id) };
        self.blkid_to_addr(order, blk_id)
    }

    fn alloc(&mut self, order: u32) -> Option<usize> {
        let order_idx = (order - MIN_ORD) as usize;
        if self.orders[order_idx].head.is_some() {
            // SAFETY: the free list was just observed non-empty
            Some(unsafe { self.get_blk(order) })
        } else if order < MAX_ORD {
            let parent = self.alloc(order + 1)?;
            let upper_half = parent + (1_usize << order);
            self.free(upper_half, order);
            Some(parent)
        } else {
            None
        }
    }

    fn free(&mut self, addr: usize, order: u32) {
        let blk_id = self.addr_to_blkid(order, addr);
        let mark_idx = blk_id >> 5;
        // SAFETY: `mark_idx` is in range for `order`'s slice, as `blk_id` was derived from a
        // pool address
        let mark = unsafe { &*self.get_mark(order, mark_idx) };
        assert!(
            !mark.is_available(blk_id),
            "buddy allocator: double free at order {order}"
        );

        let buddy_id = blk_id ^ 1;
        if order == MAX_ORD || !mark.is_available(buddy_id) {
            // SAFETY: just confirmed unavailable above
            unsafe { self.mark_blk(order, blk_id) };
        } else {
            // SAFETY: just confirmed available above
            unsafe { self.unmark_blk(order, buddy_id) };
            self.free(self.blkid_to_addr(order, blk_id & !1), order + 1);
        }
    }
}

/// A buddy allocator over a single contiguous physical pool
pub struct BuddyAllocator {
    /// Protected allocator state; `None` until [`Self::init2`] has run
    state: SpinLock<Option<State>>,
}

impl BuddyAllocator {
    /// Creates an allocator with no pool yet attached; [`Self::init2`] must run before any
    /// allocation is attempted
    pub const fn new() -> Self {
        Self {
            state: SpinLock::new(None),
        }
    }

    /// Idempotent setup hook, kept for parity with the two-phase `kmem_init`/`kmem_init2`
    /// initialization this allocator's design is modeled on; the lock itself needs no separate
    /// construction step in this implementation
    pub const fn init(&self) {}

    /// Reserves the mark array starting at `start`, then frees every `1 << MAX_ORD`-byte block in
    /// the remainder of `[start, end)` at the top order
    ///
    /// # Safety
    /// `[start, end)` must be valid, exclusively-owned memory for the lifetime of this allocator
    pub unsafe fn init2(&self, start: usize, end: usize) {
        let len = end - start;
        // Estimated number of marks needed at `MAX_ORD`; `kmem_init2`'s reference computation
        let mut n = (len >> (MAX_ORD + 5)) + 1;
        let mut total = 0_usize;
        let mut orders = [OrderInfo {
            head: None,
            offset: 0,
        }; N_ORD];

        for order in (MIN_ORD..=MAX_ORD).rev() {
            let order_idx = (order - MIN_ORD) as usize;
            orders[order_idx] = OrderInfo {
                head: None,
                offset: total,
            };
            for idx in 0..n {
                let mark_ptr = (start as *mut Mark).add(total + idx);
                // SAFETY: within the reserved mark-array region, exclusively owned per this
                // function's safety contract
                unsafe { mark_ptr.write(Mark::EMPTY) };
            }
            total += n;
            n <<= 1;
        }

        let start_heap = align_up(start + total * core::mem::size_of::<Mark>(), 1 << MAX_ORD);
        let mut state = State {
            start,
            start_heap,
            end,
            orders,
        };

        let mut addr = start_heap;
        while addr < end {
            state.free(addr, MAX_ORD);
            addr += 1 << MAX_ORD;
        }

        let mut guard = self.state.lock();
        assert!(guard.is_none(), "buddy allocator pool initialized twice");
        *guard = Some(state);
    }

    /// Allocates a block of exactly `1 << order` bytes, aligned to that size
    ///
    /// Returns `None` if no memory is available at `order` or any larger order
    ///
    /// # Panics
    /// Panics if `order` is outside `MIN_ORD..=MAX_ORD`
    pub fn alloc(&self, order: u32) -> Option<usize> {
        assert!(
            (MIN_ORD..=MAX_ORD).contains(&order),
            "kmalloc: order out of range"
        );
        let mut guard = self.state.lock();
        guard
            .as_mut()
            .expect("buddy allocator used before init2")
            .alloc(order)
    }

    /// Frees a block previously returned by [`Self::alloc`] at the same `order`
    ///
    /// # Panics
    /// Panics if `order` is out of range, `addr` is misaligned for `order`, or the block is
    /// already free
    pub fn free(&self, addr: usize, order: u32) {
        assert!(
            (MIN_ORD..=MAX_ORD).contains(&order) && addr & ((1 << order) - 1) == 0,
            "kfree: order out of range or memory unaligned"
        );
        let mut guard = self.state.lock();
        guard
            .as_mut()
            .expect("buddy allocator used before init2")
            .free(addr, order);
    }
}

impl Default for BuddyAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Rounds `addr` up to the next multiple of `align`, which must be a power of two
const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> (BuddyAllocator, alloc::vec::Vec<u8>) {
        let mut backing = alloc::vec![0_u8; 1 << 20];
        let start = backing.as_mut_ptr() as usize;
        let allocator = BuddyAllocator::new();
        // SAFETY: `backing` is exclusively owned by this test and kept alive alongside `allocator`
        unsafe { allocator.init2(start, start + backing.len()) };
        (allocator, backing)
    }

    #[test]
    fn alloc_is_aligned_and_in_order_size() {
        let (allocator, _backing) = pool();
        for order in MIN_ORD..=MAX_ORD {
            let addr = allocator.alloc(order).expect("pool should have room");
            assert_eq!(addr % (1 << order), 0);
            allocator.free(addr, order);
        }
    }

    #[test]
    fn alloc_free_returns_to_initial_state() {
        let (allocator, _backing) = pool();
        let a = allocator.alloc(MAX_ORD).unwrap();
        let b = allocator.alloc(MAX_ORD).unwrap();
        assert_ne!(a, b);
        allocator.free(a, MAX_ORD);
        allocator.free(b, MAX_ORD);
        // The pool should be able to satisfy the same two allocations again
        let a2 = allocator.alloc(MAX_ORD).unwrap();
        let b2 = allocator.alloc(MAX_ORD).unwrap();
        allocator.free(a2, MAX_ORD);
        allocator.free(b2, MAX_ORD);
    }

    #[test]
    fn split_and_coalesce_round_trips() {
        let (allocator, _backing) = pool();
        let small = allocator.alloc(MIN_ORD).expect("splitting should succeed");
        allocator.free(small, MIN_ORD);
        let big = allocator
            .alloc(MAX_ORD)
            .expect("coalescing should have restored the top-order block");
        allocator.free(big, MAX_ORD);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let (allocator, _backing) = pool();
        let addr = allocator.alloc(MIN_ORD).unwrap();
        allocator.free(addr, MIN_ORD);
        allocator.free(addr, MIN_ORD);
    }

    #[test]
    fn non_overlapping_allocations() {
        let (allocator, _backing) = pool();
        let mut addrs = alloc::vec::Vec::new();
        while let Some(addr) = allocator.alloc(MIN_ORD) {
            addrs.push(addr);
        }
        addrs.sort_unstable();
        for window in addrs.windows(2) {
            assert!(window[1] >= window[0] + (1 << MIN_ORD));
        }
    }
}
