//! Page tables and the user-space virtual memory runtime
//!
//! All three levels of the long-descriptor walk (PGD, PMD, PTE) share one descriptor
//! representation and one page size (§9's page-table-page-size resolution in `DESIGN.md`), so a
//! single [`PageTable`] type backs all of them; only the index arithmetic differs per level.

use crate::board;
use crate::collaborators::{FileSystem, FsError};
use crate::mm::buddy::BuddyAllocator;
use crate::mm::pt_pool::{PtPool, PT_SZ};
use bitfield_struct::bitfield;
use core::ptr::NonNull;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

/// Access-permission encoding for a leaf descriptor
#[derive(Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum AccessPermission {
    /// Read/write, kernel only
    KernelReadWrite = 0b00,
    /// Read/write, kernel and user
    UserReadWrite = 0b01,
    /// Read-only, kernel only
    KernelReadOnly = 0b10,
    /// Read-only, kernel and user
    UserReadOnly = 0b11,
}

impl From<u64> for AccessPermission {
    fn from(value: u64) -> Self {
        #[expect(
            clippy::expect_used,
            reason = "This implementation is necessary for bitfield derivation"
        )]
        FromPrimitive::from_u64(value).expect("Invalid access permission provided")
    }
}

impl From<AccessPermission> for u64 {
    #[inline]
    fn from(value: AccessPermission) -> Self {
        // SAFETY: `AccessPermission` always fits into a `u64`
        unsafe { ToPrimitive::to_u64(&value).unwrap_unchecked() }
    }
}

/// Shareability encoding for a leaf or table descriptor
#[derive(Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum Shareability {
    /// Non-shareable
    NonShareable = 0b00,
    /// Unpredictable encoding, kept for completeness with the reference bit layout
    Unpredictable = 0b01,
    /// Outer shareable
    OuterShareable = 0b10,
    /// Inner shareable
    InnerShareable = 0b11,
}

impl From<u64> for Shareability {
    fn from(value: u64) -> Self {
        #[expect(
            clippy::expect_used,
            reason = "This implementation is necessary for bitfield derivation"
        )]
        FromPrimitive::from_u64(value).expect("Invalid shareability provided")
    }
}

impl From<Shareability> for u64 {
    #[inline]
    fn from(value: Shareability) -> Self {
        // SAFETY: `Shareability` always fits into a `u64`
        unsafe { ToPrimitive::to_u64(&value).unwrap_unchecked() }
    }
}

/// MAIR_EL1 index used for normal (cacheable) kernel and user memory
pub const MEM_ATTR_NORMAL: u8 = 4;
/// MAIR_EL1 index used for device memory (UART, timers, GIC)
pub const MEM_ATTR_DEVICE: u8 = 0;

/// One entry in a page-table page, valid at any of the three levels (PGD/PMD/PTE). Bit layout
/// matches the historical reference's `mmu.h`.
#[bitfield(u64, debug = false)]
pub struct PageTableEntry {
    /// Whether this descriptor is valid
    valid: bool,
    /// For PGD/PMD levels: set if this descriptor points to a next-level table rather than
    /// describing a block. For the PTE level this bit is always set (`ENTRY_PAGE` shares the same
    /// bit position as `ENTRY_TABLE`).
    table_or_page: bool,
    /// `MAIR_EL1` index
    #[bits(3)]
    mem_attr_index: u8,
    /// Non-secure physical address bit
    non_secure: bool,
    #[bits(2)]
    access_permission: AccessPermission,
    #[bits(2)]
    shareability: Shareability,
    /// Access flag: faults on first use if clear
    access: bool,
    #[bits(1)]
    _res0_a: u8,
    #[bits(36)]
    ppn: u64,
    #[bits(5)]
    _res0_b: u8,
    /// Privileged (EL1) execute-never
    privileged_execute_never: bool,
    /// Unprivileged (EL0) execute-never
    unprivileged_execute_never: bool,
    #[bits(9)]
    _res0_c: u16,
}

impl PageTableEntry {
    /// An empty, invalid descriptor
    const EMPTY: Self = Self::new();

    /// Builds a table descriptor pointing at the next-level table whose physical base address is
    /// `pa`
    pub(crate) fn table(pa: usize) -> Self {
        Self::new()
            .with_valid(true)
            .with_table_or_page(true)
            .with_ppn((pa as u64) >> 12)
    }

    /// Builds a leaf descriptor (PMD block or PTE page) mapping `pa` with the given permission and
    /// memory type
    fn leaf(pa: usize, ap: AccessPermission, mem_attr_index: u8) -> Self {
        Self::new()
            .with_valid(true)
            .with_table_or_page(true)
            .with_mem_attr_index(mem_attr_index)
            .with_access_permission(ap)
            .with_shareability(Shareability::InnerShareable)
            .with_access(true)
            .with_ppn((pa as u64) >> 12)
    }

    /// Builds a 2 MiB block descriptor directly at the PMD level, used only by the boot-time
    /// identity map. `non_secure` and `execute_never` are exposed separately from the leaf/table
    /// constructors above because the boot map is the only place this codebase marks a mapping
    /// non-secure or unprivileged-execute-never.
    pub fn block(
        pa: usize,
        ap: AccessPermission,
        mem_attr_index: u8,
        non_secure: bool,
        execute_never: bool,
    ) -> Self {
        Self::new()
            .with_valid(true)
            .with_table_or_page(false)
            .with_mem_attr_index(mem_attr_index)
            .with_non_secure(non_secure)
            .with_access_permission(ap)
            .with_shareability(if non_secure {
                Shareability::InnerShareable
            } else {
                Shareability::NonShareable
            })
            .with_access(true)
            .with_unprivileged_execute_never(execute_never)
            .with_ppn((pa as u64) >> 12)
    }

    /// Whether this descriptor currently refers to anything (block, table, or page)
    fn is_present(self) -> bool {
        self.valid() && self.table_or_page()
    }

    /// The physical address this descriptor points to, ignoring attribute bits
    fn physical_address(self) -> usize {
        (self.ppn() << 12) as usize
    }
}

/// Number of entries in one page-table page at any level
pub const PTRS_PER_TABLE: usize = PT_SZ / 8;
/// One page-table page, valid at any level of the walk
pub type PageTable = [PageTableEntry; PTRS_PER_TABLE];

/// Bits of virtual address space available to a user process
pub const UADDR_BITS: u32 = 28;
/// Size, in bytes, of the user address space
pub const UADDR_SZ: usize = 1 << UADDR_BITS;

pub(crate) const PGD_SHIFT: u32 = 30;
pub(crate) const PGD_ENTRIES: usize = 4;
pub(crate) const PMD_SHIFT: u32 = 21;
/// Size in bytes of the region one PMD entry (block or table) covers
pub const PMD_SZ: usize = 1 << PMD_SHIFT;
const PTE_SHIFT: u32 = 12;
/// Size in bytes of one leaf page
pub const PTE_SZ: usize = 1 << PTE_SHIFT;

pub(crate) const fn pgd_idx(va: usize) -> usize {
    (va >> PGD_SHIFT) & (PGD_ENTRIES - 1)
}

pub(crate) const fn pmd_idx(va: usize) -> usize {
    (va >> PMD_SHIFT) & (PTRS_PER_TABLE - 1)
}

const fn pte_idx(va: usize) -> usize {
    (va >> PTE_SHIFT) & (PTRS_PER_TABLE - 1)
}

/// Rounds `addr` down to the previous multiple of `align`, a power of two
const fn align_dn(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

/// Rounds `addr` up to the next multiple of `align`, a power of two
const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

/// A physical page allocated for user data or a page table, returned to the kernel's linear map
fn phys_to_kernel(pa: usize) -> *mut PageTable {
    board::p2v(pa as u64) as usize as *mut PageTable
}

/// Errors that `copyout` reports instead of partially writing the destination
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CopyOutError;

/// A process's page table, plus the allocators it draws on
pub struct AddressSpace {
    root: NonNull<PageTable>,
}

// SAFETY: `AddressSpace` only exposes its raw pointer through methods that take `&mut self` or
// consume `self`, so access is serialized by the caller's own borrowing, same as any other owned
// heap structure
unsafe impl Send for AddressSpace {}

impl AddressSpace {
    /// Allocates a fresh, empty page table
    pub fn new(pt_pool: &PtPool, buddy: &BuddyAllocator) -> Self {
        let root = pt_pool.alloc(buddy).cast::<PageTable>();
        Self { root }
    }

    /// Physical address of this address space's root table, for loading into `TTBR0_EL1`
    fn root_physical(&self) -> usize {
        board::v2p(self.root.as_ptr() as usize as u64) as usize
    }

    /// Returns the PTE for `va`, allocating intermediate page-table pages if `alloc` is set and
    /// they do not yet exist
    ///
    /// Returns `None` if `alloc` is false and no mapping exists yet, or if `alloc` is true and a
    /// page-table page could not be obtained.
    ///
    /// Takes `&self`, not `&mut self`: every table this walks is reached through raw pointers
    /// derived from `self.root`, matching how the rest of this module treats page-table memory as
    /// hardware state rather than Rust-owned data. Callers still take `&mut self` at the public API
    /// boundary so two walks of the same address space can never interleave.
    fn walk(
        &self,
        va: usize,
        alloc: bool,
        pt_pool: &PtPool,
        buddy: &BuddyAllocator,
    ) -> Option<NonNull<PageTableEntry>> {
        // SAFETY: `root` is a live page-table page for as long as `self` exists
        let pgd_entry = unsafe { &mut (*self.root.as_ptr())[pgd_idx(va)] };
        let pmd_table = if pgd_entry.is_present() {
            phys_to_kernel(pgd_entry.physical_address())
        } else {
            if !alloc {
                return None;
            }
            let page = pt_pool.alloc(buddy).cast::<PageTable>();
            *pgd_entry = PageTableEntry::table(board::v2p(page.as_ptr() as usize as u64) as usize);
            page.as_ptr()
        };

        // SAFETY: `pmd_table` is either the page just allocated above or the live table the PGD
        // entry already pointed to
        let pmd_entry = unsafe { &mut (*pmd_table)[pmd_idx(va)] };
        let pte_table = if pmd_entry.is_present() {
            phys_to_kernel(pmd_entry.physical_address())
        } else {
            if !alloc {
                return None;
            }
            let page = pt_pool.alloc(buddy).cast::<PageTable>();
            *pmd_entry = PageTableEntry::table(board::v2p(page.as_ptr() as usize as u64) as usize);
            page.as_ptr()
        };

        // SAFETY: as above
        let pte = unsafe { &mut (*pte_table)[pte_idx(va)] as *mut PageTableEntry };
        NonNull::new(pte)
    }

    /// Maps `[va, va + size)` to physical addresses starting at `pa`, in `PTE_SZ` chunks
    ///
    /// # Panics
    /// Panics if any page in the range is already mapped (a remap always indicates a caller bug,
    /// never a recoverable condition).
    fn map_pages(
        &self,
        va: usize,
        size: usize,
        pa: usize,
        ap: AccessPermission,
        pt_pool: &PtPool,
        buddy: &BuddyAllocator,
    ) -> Option<()> {
        let first = align_dn(va, PTE_SZ);
        let last = align_dn(va.checked_add(size)?.checked_sub(1)?, PTE_SZ);
        let mut a = first;
        let mut phys = pa;
        loop {
            let mut pte = self.walk(a, true, pt_pool, buddy)?;
            // SAFETY: `walk` always returns a pointer into a live page-table page
            let entry = unsafe { pte.as_mut() };
            assert!(!entry.is_present(), "remap of an already-mapped page");
            *entry = PageTableEntry::leaf(phys, ap, MEM_ATTR_NORMAL);

            if a == last {
                break;
            }
            a += PTE_SZ;
            phys += PTE_SZ;
        }
        Some(())
    }

    /// Loads the initial process image (must fit in one page) at virtual address 0
    pub fn inituvm(
        &mut self,
        init: &[u8],
        pt_pool: &PtPool,
        buddy: &BuddyAllocator,
    ) {
        assert!(init.len() < PTE_SZ, "inituvm: more than a page");
        let page = buddy
            .alloc(PTE_SHIFT)
            .expect("inituvm: out of memory for the initial process page");
        let dst = phys_to_kernel(page).cast::<u8>();
        // SAFETY: `page` was just allocated and is not yet mapped or aliased
        unsafe {
            dst.write_bytes(0, PTE_SZ);
            core::ptr::copy_nonoverlapping(init.as_ptr(), dst, init.len());
        }
        self.map_pages(0, PTE_SZ, page, AccessPermission::UserReadWrite, pt_pool, buddy)
            .expect("inituvm: mapping the initial page cannot fail");
    }

    /// Loads `sz` bytes of a program segment from `fs` at `offset`, into the already-mapped
    /// region `[addr, addr + sz)`
    ///
    /// # Panics
    /// Panics if `addr` is not page-aligned, or if a page in the range is not already mapped.
    pub fn loaduvm(
        &mut self,
        fs: &dyn FileSystem,
        inode: crate::collaborators::InodeId,
        addr: usize,
        offset: u32,
        sz: usize,
        pt_pool: &PtPool,
        buddy: &BuddyAllocator,
    ) -> Result<(), FsError> {
        assert_eq!(addr % PTE_SZ, 0, "loaduvm: addr must be page aligned");
        let mut i = 0;
        while i < sz {
            let pte = self
                .walk(addr + i, false, pt_pool, buddy)
                .expect("loaduvm: address should already be mapped");
            // SAFETY: `walk` returns a pointer into a live page-table page
            let pa = unsafe { pte.as_ref() }.physical_address();
            let n = core::cmp::min(sz - i, PTE_SZ);
            let dst = phys_to_kernel(pa).cast::<u8>();
            // SAFETY: `dst` points at a page this address space exclusively owns
            let buf = unsafe { core::slice::from_raw_parts_mut(dst, n) };
            let read = fs.read_inode(inode, buf, offset + i as u32)?;
            if read as usize != n {
                return Err(FsError::Io);
            }
            i += n;
        }
        Ok(())
    }

    /// Grows the process from `oldsz` to `newsz`, allocating and mapping new pages as needed.
    /// Returns the new size, or `None` if `newsz` would exceed the user address space or memory
    /// ran out partway through (in which case the partial growth is rolled back).
    pub fn allocuvm(
        &mut self,
        oldsz: usize,
        newsz: usize,
        pt_pool: &PtPool,
        buddy: &BuddyAllocator,
    ) -> Option<usize> {
        if newsz >= UADDR_SZ {
            return None;
        }
        if newsz < oldsz {
            return Some(oldsz);
        }

        let mut a = align_up(oldsz, PTE_SZ);
        while a < newsz {
            match buddy.alloc(PTE_SHIFT) {
                Some(page) => {
                    let dst = phys_to_kernel(page).cast::<u8>();
                    // SAFETY: `page` was just allocated and is not yet mapped or aliased
                    unsafe { dst.write_bytes(0, PTE_SZ) };
                    self.map_pages(a, PTE_SZ, page, AccessPermission::UserReadWrite, pt_pool, buddy)
                        .expect("allocuvm: mapping a freshly allocated page cannot fail");
                }
                None => {
                    self.deallocuvm(newsz, oldsz, pt_pool, buddy);
                    return None;
                }
            }
            a += PTE_SZ;
        }
        Some(newsz)
    }

    /// Shrinks the process from `oldsz` to `newsz`, freeing pages no longer in range. `newsz` need
    /// not be page-aligned, and may exceed the process's actual mapped size.
    pub fn deallocuvm(
        &mut self,
        oldsz: usize,
        newsz: usize,
        pt_pool: &PtPool,
        buddy: &BuddyAllocator,
    ) -> usize {
        if newsz >= oldsz {
            return oldsz;
        }

        let mut a = align_up(newsz, PTE_SZ);
        while a < oldsz {
            match self.walk(a, false, pt_pool, buddy) {
                None => {
                    // No page table at this address; skip to the next PMD's worth of range. The
                    // advance saturates so a hole ending at or beyond `oldsz` terminates the loop
                    // rather than wrapping the address around.
                    a = align_up(a, PMD_SZ).max(a).min(usize::MAX - PTE_SZ + 1);
                    if a >= oldsz {
                        break;
                    }
                    continue;
                }
                Some(mut pte) => {
                    // SAFETY: `walk` returns a pointer into a live page-table page
                    let entry = unsafe { pte.as_mut() };
                    if entry.is_present() {
                        let pa = entry.physical_address();
                        assert_ne!(pa, 0, "deallocuvm: mapped page has a null physical address");
                        buddy.free(pa, PTE_SHIFT);
                        *entry = PageTableEntry::EMPTY;
                    }
                    a += PTE_SZ;
                }
            }
        }
        newsz
    }

    /// Releases every mapped user page and every page-table page belonging to this address space
    pub fn freevm(mut self, pt_pool: &PtPool, buddy: &BuddyAllocator) {
        self.deallocuvm(UADDR_SZ, 0, pt_pool, buddy);

        // SAFETY: `root` is a live page-table page for as long as `self` exists, and `self` is
        // consumed by this call
        let root_table = unsafe { self.root.as_ref() };
        for pgd_entry in root_table.iter() {
            if !pgd_entry.is_present() {
                continue;
            }
            let pmd_table = phys_to_kernel(pgd_entry.physical_address());
            // SAFETY: still-present PGD entries point at live page-table pages owned by this
            // address space
            let pmd_table = unsafe { &*pmd_table };
            for pmd_entry in pmd_table.iter() {
                if pmd_entry.is_present() {
                    let pte_page = phys_to_kernel(pmd_entry.physical_address()).cast::<u8>();
                    // SAFETY: this page was obtained from `pt_pool` and is no longer referenced
                    // once freed here
                    unsafe {
                        pt_pool.free(NonNull::new_unchecked(pte_page), buddy);
                    }
                }
            }
            let pmd_page = phys_to_kernel(pgd_entry.physical_address()).cast::<u8>();
            // SAFETY: as above
            unsafe {
                pt_pool.free(NonNull::new_unchecked(pmd_page), buddy);
            }
        }

        let root_page = self.root.cast::<u8>();
        // SAFETY: the root table has no remaining references after this call
        unsafe { pt_pool.free(root_page, buddy) };
    }

    /// Clears the user-accessible bit on the page at `uva`, turning it into a guard page
    ///
    /// # Panics
    /// Panics if `uva` has no mapping.
    pub fn clearpteu(&mut self, uva: usize, pt_pool: &PtPool, buddy: &BuddyAllocator) {
        let mut pte = self
            .walk(uva, false, pt_pool, buddy)
            .expect("clearpteu: no mapping for guard page");
        // SAFETY: `walk` returns a pointer into a live page-table page
        let entry = unsafe { pte.as_mut() };
        *entry = entry.with_access_permission(AccessPermission::KernelReadWrite);
    }

    /// Creates a full copy of this address space's mappings and backing pages (no copy-on-write)
    pub fn copyuvm(&self, sz: usize, pt_pool: &PtPool, buddy: &BuddyAllocator) -> Option<Self> {
        let child = Self::new(pt_pool, buddy);
        let mut i = 0;
        while i < sz {
            let pte = self
                .walk(i, false, pt_pool, buddy)
                .expect("copyuvm: source mapping should exist");
            // SAFETY: `walk` returns a pointer into a live page-table page
            let entry = unsafe { pte.as_ref() };
            assert!(entry.is_present(), "copyuvm: source page not present");
            let pa = entry.physical_address();
            let ap = entry.access_permission();

            let new_page = buddy.alloc(PTE_SHIFT)?;
            // SAFETY: both pages are live, exclusively owned, and exactly `PTE_SZ` long
            unsafe {
                core::ptr::copy_nonoverlapping(
                    phys_to_kernel(pa).cast::<u8>(),
                    phys_to_kernel(new_page).cast::<u8>(),
                    PTE_SZ,
                );
            }
            if child
                .map_pages(i, PTE_SZ, new_page, ap, pt_pool, buddy)
                .is_some()
            {
                i += PTE_SZ;
            } else {
                child.freevm(pt_pool, buddy);
                return None;
            }
        }
        Some(child)
    }

    /// Translates a user virtual address to its kernel-virtual alias, if it is mapped exactly
    /// user-read-write (a read-only user page, like a kernel-only one, is not a valid target)
    pub fn uva2ka(&self, uva: usize, pt_pool: &PtPool, buddy: &BuddyAllocator) -> Option<usize> {
        let pte = self.walk(uva, false, pt_pool, buddy)?;
        // SAFETY: `walk` returns a pointer into a live page-table page
        let entry = unsafe { pte.as_ref() };
        if !entry.is_present() {
            return None;
        }
        match entry.access_permission() {
            AccessPermission::UserReadWrite => {
                Some(board::p2v(entry.physical_address() as u64) as usize)
            }
            AccessPermission::UserReadOnly
            | AccessPermission::KernelReadWrite
            | AccessPermission::KernelReadOnly => None,
        }
    }

    /// Copies `src` into this address space at `va`, atomically: every destination page is
    /// validated before any byte is written, so a bad range leaves the destination untouched.
    ///
    /// Runs in two passes over the same address sequence rather than collecting the per-page
    /// translations, so no heap allocation is needed for an operation bounded only by `src.len()`.
    pub fn copyout(
        &self,
        va: usize,
        src: &[u8],
        pt_pool: &PtPool,
        buddy: &BuddyAllocator,
    ) -> Result<(), CopyOutError> {
        let mut remaining = src.len();
        let mut addr = va;
        while remaining > 0 {
            let va0 = align_dn(addr, PTE_SZ);
            self.uva2ka(va0, pt_pool, buddy).ok_or(CopyOutError)?;
            let n = core::cmp::min(PTE_SZ - (addr - va0), remaining);
            remaining -= n;
            addr = va0 + PTE_SZ;
        }

        let mut remaining = src.len();
        let mut addr = va;
        let mut consumed = 0;
        while remaining > 0 {
            let va0 = align_dn(addr, PTE_SZ);
            // SAFETY: every destination page in this range was validated by `uva2ka` in the pass
            // above before any write happened
            let ka0 = unsafe { self.uva2ka(va0, pt_pool, buddy).unwrap_unchecked() };
            let n = core::cmp::min(PTE_SZ - (addr - va0), remaining);
            let dst_ptr = (ka0 + (addr - va0)) as *mut u8;
            // SAFETY: `dst_ptr` points into a page this address space maps as user-writable,
            // validated above
            unsafe {
                core::ptr::copy_nonoverlapping(src.as_ptr().add(consumed), dst_ptr, n);
            }
            consumed += n;
            remaining -= n;
            addr = va0 + PTE_SZ;
        }
        Ok(())
    }

    /// Loads this address space's root into `TTBR0_EL1` and flushes the TLB
    pub fn switchuvm(&self) {
        let ttbr0 = self.root_physical() as u64;
        // SAFETY: `ttbr0` is this address space's own root table, valid for as long as `self`
        // lives; switching TTBR0 and flushing stale translations is the documented way to change
        // the active user address space
        unsafe {
            core::arch::asm!(
                "msr ttbr0_el1, {val}",
                "tlbi vmalle1",
                "dsb ish",
                "isb",
                val = in(reg) ttbr0,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_roundtrips(ap: AccessPermission) {
        let pte = PageTableEntry::leaf(0x4000_1000, ap, MEM_ATTR_NORMAL);
        assert!(pte.is_present());
        assert_eq!(pte.physical_address(), 0x4000_1000);
        assert_eq!(pte.access_permission(), ap);
    }

    #[test]
    fn leaf_descriptor_round_trips_every_permission() {
        leaf_roundtrips(AccessPermission::KernelReadWrite);
        leaf_roundtrips(AccessPermission::UserReadWrite);
        leaf_roundtrips(AccessPermission::KernelReadOnly);
        leaf_roundtrips(AccessPermission::UserReadOnly);
    }

    #[test]
    fn table_descriptor_is_present_but_carries_no_permission_bits() {
        let pte = PageTableEntry::table(0x4010_0000);
        assert!(pte.is_present());
        assert_eq!(pte.physical_address(), 0x4010_0000);
    }

    #[test]
    fn empty_descriptor_is_not_present() {
        assert!(!PageTableEntry::EMPTY.is_present());
    }

    #[test]
    fn index_functions_cover_the_address_ranges_they_claim() {
        assert_eq!(pgd_idx(0), 0);
        assert_eq!(pgd_idx(PMD_SZ * PTRS_PER_TABLE), 1);
        assert_eq!(pmd_idx(0), 0);
        assert_eq!(pmd_idx(PTE_SZ * PTRS_PER_TABLE), 1);
        assert_eq!(pte_idx(0), 0);
        assert_eq!(pte_idx(PTE_SZ), 1);
    }
}
