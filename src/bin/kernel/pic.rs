//! Driver for the legacy PL190 vectored interrupt controller
//!
//! Kept alongside [`crate::gic`] as the alternative interrupt controller contract: some boards
//! this kernel targets expose a PL190 instead of a GICv2. Unlike the GIC, a PL190 has no
//! per-interrupt trigger or target configuration and no explicit end-of-interrupt write; a single
//! status register reports every source that is currently asserted.

use crate::board;
use crate::intc::{Isr, IsrTable};
use crate::spinlock::SpinLock;
use crate::trap::TrapFrame;
use core::num::NonZeroUsize;
use core::ptr::{self, NonNull};
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::ReadWrite;
use tock_registers::register_structs;

register_structs! {
    /// The PL190's register block
    PicRegisters {
        (0x00 => irq_status: ReadWrite<u32>),
        (0x04 => _reserved0),
        (0x08 => raw_intr: ReadWrite<u32>),
        (0x0C => int_select: ReadWrite<u32>),
        (0x10 => int_enable: ReadWrite<u32>),
        (0x14 => int_enable_clear: ReadWrite<u32>),
        (0x18 => _reserved1),
        (0x20 => @END),
    }
}

/// A legacy PL190 vectored interrupt controller
pub struct Pic {
    registers: NonNull<PicRegisters>,
    isrs: SpinLock<IsrTable<{ board::NUM_INTSRC_PIC }>>,
}

// SAFETY: the register block is memory-mapped device registers, inherently shared; all mutation
// of software-side state goes through `isrs`, itself a `SpinLock`
unsafe impl Sync for Pic {}
// SAFETY: see above
unsafe impl Send for Pic {}

impl Pic {
    /// Creates a driver for the PL190 at `base`
    ///
    /// Returns `None` if `base` is not suitably aligned.
    ///
    /// # Safety
    /// `base` must be the base of a valid, exclusively-owned PL190 register block that lives for
    /// the remainder of the program.
    unsafe fn new(base: NonZeroUsize) -> Option<Self> {
        let registers = NonNull::new(ptr::from_exposed_addr_mut::<PicRegisters>(base.get()))?;
        if !registers.as_ptr().is_aligned() {
            return None;
        }
        Some(Self {
            registers,
            isrs: SpinLock::new("pic", IsrTable::new()),
        })
    }

    fn registers(&self) -> &PicRegisters {
        // SAFETY: constructed from a valid, exclusively-owned pointer in `new`
        unsafe { self.registers.as_ref() }
    }

    /// Disables every interrupt source and clears the ISR table to its defaults
    fn reset(&self) {
        self.registers().int_enable_clear.set(0xFFFF_FFFF);
    }

    /// Enables `irq` and registers `isr` to run when it fires
    pub fn enable(&self, irq: u32, isr: Isr) {
        self.isrs.lock().register(irq, isr);
        self.registers().int_enable.set(1 << irq);
    }

    /// Disables `irq`
    pub fn disable(&self, irq: u32) {
        self.registers().int_enable_clear.set(1 << irq);
    }

    /// Dispatches to the registered ISR of every interrupt source currently asserted
    ///
    /// A PL190 reports all pending sources in a single bitmap read rather than one at a time, so
    /// this may invoke more than one ISR per call.
    pub fn dispatch(&self, tf: &mut TrapFrame) {
        let status = self.registers().irq_status.get();
        let isrs = self.isrs.lock();
        for irq in 0..board::NUM_INTSRC_PIC as u32 {
            if status & (1 << irq) != 0 {
                isrs.invoke(irq, tf);
            }
        }
    }
}

/// The PL190 driver for this boot, set once by [`init`]
pub static PIC: stdos::cell::InitCell<Pic> = stdos::cell::InitCell::new();

/// Initializes the PL190 at `base`, disabling every source until [`Pic::enable`] is called
///
/// # Panics
/// Panics if `base` is misaligned.
pub fn init(base: NonZeroUsize) {
    // SAFETY: the caller supplies the board's PL190 base address, mapped as device memory by the
    // boot-time page tables, and `init` runs once during kernel startup
    let pic = unsafe { Pic::new(base) }.expect("PL190 base is 4 KiB aligned");
    pic.reset();
    PIC.set(pic);
}
