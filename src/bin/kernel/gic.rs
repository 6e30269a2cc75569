//! Driver for the GICv2 interrupt controller on QEMU's `virt` machine
//!
//! A GICv2 is two register blocks: the distributor (`GICD_*`, shared across all cores, configures
//! which interrupts are enabled and which core they target) and a per-core CPU interface
//! (`GICC_*`, used to acknowledge and complete interrupts). `virt` maps the CPU interface at a
//! fixed offset from the distributor rather than at a separate address, so one base address and
//! one [`GicRegisters`] layout cover both.

use crate::board;
use crate::intc::{Isr, IsrTable};
use crate::spinlock::SpinLock;
use crate::trap::TrapFrame;
use core::num::NonZeroUsize;
use core::ptr::{self, NonNull};
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

/// Number of 32-bit words needed to hold one bit per interrupt source
const BITMAP_WORDS: usize = board::NUM_INTSRC_GIC / 32;
/// Number of 32-bit words needed to hold one byte per interrupt source
const BYTE_WORDS: usize = board::NUM_INTSRC_GIC / 4;
/// Number of 32-bit words needed to hold two bits per interrupt source
const CFG_WORDS: usize = board::NUM_INTSRC_GIC / 16;

register_bitfields! {
    u32,
    GICD_CTLR [
        ENABLE OFFSET(0) NUMBITS(1) [],
    ],
    GICC_CTLR [
        ENABLE OFFSET(0) NUMBITS(1) [],
    ],
    GICC_IAR [
        INTERRUPT_ID OFFSET(0) NUMBITS(10) [],
    ],
}

register_structs! {
    /// The distributor's register block, `GICD_*`
    GicDistributorRegisters {
        (0x000 => ctlr: ReadWrite<u32, GICD_CTLR::Register>),
        (0x004 => _reserved0),
        (0x100 => isenabler: [ReadWrite<u32>; BITMAP_WORDS]),
        (0x108 => _reserved1),
        (0x180 => icenabler: [ReadWrite<u32>; BITMAP_WORDS]),
        (0x188 => _reserved2),
        (0x800 => itargetsr: [ReadWrite<u32>; BYTE_WORDS]),
        (0x840 => _reserved3),
        (0xC00 => icfgr: [ReadWrite<u32>; CFG_WORDS]),
        (0xC10 => _reserved4),
        (0x1000 => @END),
    }
}

register_structs! {
    /// The per-core CPU interface's register block, `GICC_*`
    GicCpuRegisters {
        (0x000 => ctlr: ReadWrite<u32, GICC_CTLR::Register>),
        (0x004 => pmr: ReadWrite<u32>),
        (0x008 => _reserved0),
        (0x00C => iar: ReadOnly<u32, GICC_IAR::Register>),
        (0x010 => eoir: WriteOnly<u32>),
        (0x014 => @END),
    }
}

/// Value `GICC_IAR` reads as when no interrupt is pending
const SPURIOUS_INTERRUPT: u32 = 1023;

/// A GICv2 distributor and this core's CPU interface
pub struct Gic {
    distributor: NonNull<GicDistributorRegisters>,
    cpu_iface: NonNull<GicCpuRegisters>,
    isrs: SpinLock<IsrTable<{ board::NUM_INTSRC_GIC }>>,
}

// SAFETY: the register blocks are memory-mapped device registers, inherently shared; all mutation
// of software-side state goes through `isrs`, itself a `SpinLock`
unsafe impl Sync for Gic {}
// SAFETY: see above
unsafe impl Send for Gic {}

impl Gic {
    /// Creates a driver for the GICv2 at `distributor_base`, whose CPU interface sits
    /// `board::GICC_OFFSET` bytes further along
    ///
    /// Returns `None` if `distributor_base` is not suitably aligned.
    ///
    /// # Safety
    /// `distributor_base` must be the base of a valid, exclusively-owned GICv2 register pair that
    /// lives for the remainder of the program.
    unsafe fn new(distributor_base: NonZeroUsize) -> Option<Self> {
        let distributor = NonNull::new(ptr::from_exposed_addr_mut::<GicDistributorRegisters>(
            distributor_base.get(),
        ))?;
        let cpu_iface = NonNull::new(ptr::from_exposed_addr_mut::<GicCpuRegisters>(
            distributor_base.get() + board::GICC_OFFSET as usize,
        ))?;

        if !distributor.as_ptr().is_aligned() || !cpu_iface.as_ptr().is_aligned() {
            return None;
        }

        Some(Self {
            distributor,
            cpu_iface,
            isrs: SpinLock::new("gic", IsrTable::new()),
        })
    }

    fn distributor(&self) -> &GicDistributorRegisters {
        // SAFETY: constructed from a valid, exclusively-owned pointer in `new`
        unsafe { self.distributor.as_ref() }
    }

    fn cpu_iface(&self) -> &GicCpuRegisters {
        // SAFETY: constructed from a valid, exclusively-owned pointer in `new`
        unsafe { self.cpu_iface.as_ref() }
    }

    /// Configures `irq` as edge-triggered and targeted at this core, leaving it disabled
    fn configure(&self, irq: u32) {
        let cfg_word = irq as usize / 16;
        let cfg_shift = (irq as usize % 16) * 2;
        let cfg = self.distributor().icfgr[cfg_word].get();
        // Bit 1 of the 2-bit field selects edge- over level-triggered
        self.distributor().icfgr[cfg_word].set(cfg | (0b10 << cfg_shift));

        let target_word = irq as usize / 4;
        let target_shift = (irq as usize % 4) * 8;
        let target = self.distributor().itargetsr[target_word].get();
        // Targets CPU interface 0, the only core this kernel runs on
        self.distributor().itargetsr[target_word].set(target | (0b1 << target_shift));
    }

    /// Enables `irq` at the distributor and registers `isr` to run when it fires
    pub fn enable(&self, irq: u32, isr: Isr) {
        self.configure(irq);
        self.isrs.lock().register(irq, isr);
        let word = irq as usize / 32;
        let bit = irq as usize % 32;
        self.distributor().isenabler[word].set(1 << bit);
    }

    /// Disables `irq` at the distributor
    pub fn disable(&self, irq: u32) {
        let word = irq as usize / 32;
        let bit = irq as usize % 32;
        self.distributor().icenabler[word].set(1 << bit);
    }

    /// Enables the distributor and this core's CPU interface, and sets the priority mask to admit
    /// all priorities
    fn enable_controller(&self) {
        self.cpu_iface().pmr.set(0x0f);
        self.distributor().ctlr.write(GICD_CTLR::ENABLE::SET);
        self.cpu_iface().ctlr.write(GICC_CTLR::ENABLE::SET);
    }

    /// Acknowledges the highest-priority pending interrupt, dispatches to its registered ISR, and
    /// signals end-of-interrupt
    ///
    /// Does nothing if the acknowledged interrupt is spurious (no interrupt was actually pending).
    pub fn dispatch(&self, tf: &mut TrapFrame) {
        let irq = self.cpu_iface().iar.read(GICC_IAR::INTERRUPT_ID);
        if irq == SPURIOUS_INTERRUPT {
            return;
        }

        self.disable(irq);
        self.cpu_iface().eoir.set(irq);
        self.isrs.lock().invoke(irq, tf);
        let word = irq as usize / 32;
        let bit = irq as usize % 32;
        self.distributor().isenabler[word].set(1 << bit);
    }
}

/// The GICv2 driver for this boot, set once by [`init`]
pub static GIC: stdos::cell::InitCell<Gic> = stdos::cell::InitCell::new();

/// Initializes the GICv2 at `board::VIC_BASE` and enables it
///
/// # Panics
/// Panics if the distributor base address is misaligned, which cannot happen on `virt`'s fixed
/// memory map.
pub fn init() {
    let base = NonZeroUsize::new(board::p2v(board::VIC_BASE) as usize)
        .expect("GICv2 distributor base is never zero");
    // SAFETY: `board::VIC_BASE` is `virt`'s fixed, exclusively-owned GICv2 base address, mapped as
    // device memory by the boot-time page tables, and `init` runs once during kernel startup
    let gic = unsafe { Gic::new(base) }.expect("GICv2 distributor base is 4 KiB aligned");
    gic.enable_controller();
    GIC.set(gic);
}
