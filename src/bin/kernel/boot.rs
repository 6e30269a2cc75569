//! The initial boot sequence of the kernel. Execution begins here and this assembly/Rust sequence
//! sets up the boot-time page tables, enables the MMU, and jumps into the high-half [`crate::main`]
//!
//! `virt` hands control to `_start` at `board::PHY_START`, running with the MMU off and `x0`..`x3`
//! undefined. There is no device tree to discover a memory map from (§1's single fixed board), so
//! this just builds the two static roots `linker.ld` reserves and turns translation on.

use crate::board;
use crate::vm::{AccessPermission, PageTable, PageTableEntry, MEM_ATTR_DEVICE, MEM_ATTR_NORMAL};

core::arch::global_asm! {
    ".section .init",
    "_start:",
    "msr DAIFSET, 0b1111", // Mask all exceptions until a vector table exists

    // Zero the shared NOLOAD region (the two boot page-table roots, their L2 tables, and the
    // kernel's ordinary BSS): the `--oformat=binary` release image carries no bytes for it.
    "adr x0, __bss_start",
    "adr x1, __bss_end",
    "0:",
    "cmp x0, x1",
    "b.hs 1f",
    "str xzr, [x0], 8",
    "b 0b",
    "1:",

    // A temporary stack, physically addressed, just to run {rust_entry}.
    "adr x0, __stack_top",
    "mov sp, x0",

    "bl {rust_entry}",

    // {rust_entry} never returns: it either enables the MMU and branches into `main`, or it
    // doesn't return at all.
    "2: wfi",
    "b 2b",
    rust_entry = sym boot_rust_entry,
}

/// `MAIR_EL1`: index 0 is device-nGnRnE, index 4 is normal cacheable write-back, matching
/// [`MEM_ATTR_DEVICE`]/[`MEM_ATTR_NORMAL`]. Taken directly from the historical reference's
/// `load_pgtlb`.
const MAIR_EL1: u64 = 0xFF44_0C04_00;

/// `TCR_EL1`: 4 KiB granule for both translation regimes, a narrower input range for `TTBR0`
/// (user, `UADDR_BITS`) than `TTBR1` (kernel). Taken directly from the historical reference's
/// `load_pgtlb`; this core does not re-derive the field layout since the encoding is dense and the
/// literal is already known-correct for this machine.
const TCR_EL1: u64 = 0x34_B520_3520;

/// Writes one 2 MiB PMD block descriptor per iteration, covering `[virt, virt + len)`, into the L2
/// table whose 4 contiguous pages start at `l2_base`
///
/// `virt` and `phy` must both be 2 MiB-aligned. Normal memory is marked non-secure and
/// unprivileged-execute-never; device memory is marked secure and executable (matching the
/// historical reference, which never executes out of its device windows anyway).
///
/// # Safety
/// `l2_base` must point to 4 contiguous, exclusively-owned, writable 4 KiB pages indexed by
/// [`crate::vm`]'s PGD index math, and the whole range `[virt, virt + len)` must fall within a
/// single root's 4-PGD-entry, 4 GiB span.
unsafe fn map_range(l2_base: *mut PageTable, virt: usize, phy: usize, len: usize, device: bool) {
    let mem_attr = if device { MEM_ATTR_DEVICE } else { MEM_ATTR_NORMAL };
    let mut v = virt;
    let mut p = phy;
    let end = virt + len;
    while v < end {
        let table = l2_base.add(crate::vm::pgd_idx(v));
        let entry =
            PageTableEntry::block(p, AccessPermission::KernelReadWrite, mem_attr, !device, !device);
        // SAFETY: `table` is one of the four contiguous pages the caller promises, and `pmd_idx`
        // never exceeds a table's entry count
        unsafe { (*table)[crate::vm::pmd_idx(v)] = entry };
        v += crate::vm::PMD_SZ;
        p += crate::vm::PMD_SZ;
    }
}

/// Builds the boot-time page tables, enables the MMU, and branches into [`crate::main`] at its
/// high-half linked address. Called once, from `_start`, on a temporary physical stack.
///
/// Mirrors the historical reference's `start()`/`set_bootpgtbl`/`load_pgtlb` sequence: both roots
/// map the high-half window of RAM the kernel occupies plus the GICv2 and UART device windows; the
/// user root additionally identity-maps low RAM and the UART, since a low program counter is
/// translated through `TTBR0` (the user root) the instant the MMU comes on. The historical
/// reference's `DEVBASE3`-into-`DEVBASE2` boot mapping is a bug (see `DESIGN.md`); this maps
/// `DEVBASE3` to itself.
extern "C" fn boot_rust_entry() -> ! {
    extern "C" {
        static mut _kernel_pgtbl: PageTable;
        static mut _user_pgtbl: PageTable;
        static mut _K_l2_pgtbl: PageTable;
        static mut _U_l2_pgtbl: PageTable;
        static __stack_top: u8;
    }

    // SAFETY: these are the linker-reserved, zeroed regions `linker.ld` lays out for exactly this
    // purpose; nothing else touches them before the MMU is enabled below
    let (kernel_root, user_root, k_l2, u_l2) = unsafe {
        (
            core::ptr::addr_of_mut!(_kernel_pgtbl),
            core::ptr::addr_of_mut!(_user_pgtbl),
            core::ptr::addr_of_mut!(_K_l2_pgtbl),
            core::ptr::addr_of_mut!(_U_l2_pgtbl),
        )
    };

    // SAFETY: `kernel_root`/`user_root` are valid 4-entry PGDs, and `k_l2`/`u_l2` are each 4
    // contiguous, exclusively-owned L2 pages, per `linker.ld`'s layout
    unsafe {
        for i in 0..4_usize {
            (*kernel_root)[i] = PageTableEntry::table(k_l2.add(i) as usize);
            (*user_root)[i] = PageTableEntry::table(u_l2.add(i) as usize);
        }
    }

    let ram_len = (board::INIT_KERNMAP - board::PHY_START) as usize;
    let phy_start = board::PHY_START as usize;
    let kernbase = board::KERNBASE as usize;

    // SAFETY: `k_l2`/`u_l2` are valid per the loop above; every range below is 2 MiB-aligned and
    // fits within one PGD entry's 1 GiB span
    unsafe {
        // Low, identity-mapped RAM and UART: the narrow window right after `SCTLR_EL1.M` is set,
        // while the PC is still a low physical address, is translated through `TTBR0` (the user
        // root), not `TTBR1` — a low VA never routes through the kernel root. Only the user root
        // needs this, so the bootstrap code here can keep running and printing until the jump to
        // the high-half stack below.
        map_range(u_l2, phy_start, phy_start, ram_len, false);
        map_range(
            u_l2,
            board::DEVBASE2 as usize,
            board::DEVBASE2 as usize,
            board::DEV_MEM_SZ as usize,
            true,
        );

        // High-half RAM, where `main` and everything after it actually lives.
        map_range(k_l2, kernbase + phy_start, phy_start, ram_len, false);
        map_range(u_l2, kernbase + phy_start, phy_start, ram_len, false);

        // GICv2, high-half only: the kernel drives the controller, user code never does.
        map_range(
            k_l2,
            kernbase + board::DEVBASE1 as usize,
            board::DEVBASE1 as usize,
            board::DEV_MEM_SZ as usize,
            true,
        );

        // UART, high-half, both roots: the kernel console lives here too.
        map_range(
            k_l2,
            kernbase + board::DEVBASE2 as usize,
            board::DEVBASE2 as usize,
            board::DEV_MEM_SZ as usize,
            true,
        );
        map_range(
            u_l2,
            kernbase + board::DEVBASE2 as usize,
            board::DEVBASE2 as usize,
            board::DEV_MEM_SZ as usize,
            true,
        );

        // SP804 timers, high-half only, mapped to themselves (the historical reference's bug,
        // fixed per `DESIGN.md`).
        map_range(
            k_l2,
            kernbase + board::DEVBASE3 as usize,
            board::DEVBASE3 as usize,
            board::DEV_MEM_SZ as usize,
            true,
        );
        map_range(
            u_l2,
            kernbase + board::DEVBASE3 as usize,
            board::DEVBASE3 as usize,
            board::DEV_MEM_SZ as usize,
            true,
        );
    }

    // SAFETY: the two roots above are fully populated, `MAIR_EL1`/`TCR_EL1` match the descriptor
    // bits `vm::PageTableEntry` produces, and this runs exactly once before anything depends on
    // translation being enabled
    unsafe {
        let kernel_root_pa = kernel_root as u64;
        let user_root_pa = user_root as u64;

        // `addr_of!`/`fn`-to-integer casts resolve through the same `adrp`+`add` pair the compiler
        // would use once this image runs at its linked address; executed here, with the PC still
        // physical, they instead yield each symbol's physical address (the whole image is shifted
        // from its link addresses by the same constant `KERNBASE`, so the PC-relative distance is
        // identical either way). Add `KERNBASE` back to deliberately land on the high-half address
        // for the stack and for `main`, since everything past this point assumes that convention.
        let stack_top_phys = core::ptr::addr_of!(__stack_top) as u64;
        let main_phys = crate::main as usize as u64;
        enable_mmu_and_jump(
            kernel_root_pa,
            user_root_pa,
            stack_top_phys + board::KERNBASE,
            main_phys + board::KERNBASE,
        );
    }
}

/// Loads the translation registers, enables `SCTLR_EL1.M`, flushes the TLB and I-cache, switches
/// the stack pointer to `stack_top`, and branches to `target`
///
/// # Safety
/// `kernel_root_pa`/`user_root_pa` must be physical addresses of complete, correct boot page
/// tables; `stack_top` and `target` must be the high-half linked addresses of `__stack_top` and
/// [`crate::main`] respectively.
#[expect(clippy::missing_panics_doc, reason = "Never panics, only traps")]
unsafe fn enable_mmu_and_jump(
    kernel_root_pa: u64,
    user_root_pa: u64,
    stack_top: u64,
    target: u64,
) -> ! {
    // SAFETY: see function contract
    unsafe {
        core::arch::asm!(
            "msr mair_el1, {mair}",
            "msr tcr_el1, {tcr}",
            "msr ttbr1_el1, {kroot}",
            "msr ttbr0_el1, {uroot}",
            "isb",

            "mrs {tmp}, sctlr_el1",
            "orr {tmp}, {tmp}, 1",
            "msr sctlr_el1, {tmp}",
            "isb",

            "ic ialluis",
            "tlbi vmalle1",
            "dsb ish",
            "isb",

            "mov sp, {stack}",
            "br {target}",
            mair = in(reg) MAIR_EL1,
            tcr = in(reg) TCR_EL1,
            kroot = in(reg) kernel_root_pa,
            uroot = in(reg) user_root_pa,
            tmp = out(reg) _,
            stack = in(reg) stack_top,
            target = in(reg) target,
            options(noreturn),
        );
    }
}
