//! The contract shared by this board's two interrupt controller drivers
//!
//! [`crate::gic`] (a GICv2, `virt`'s default) and [`crate::pic`] (a legacy PL190, kept as an
//! alternative for boards that expose one instead) both dispatch through an [`IsrTable`] of this
//! shape, so `timer::init` and friends can register against either without caring which is active.

use crate::trap::TrapFrame;

/// A handler for one interrupt source, invoked with the trapframe the IRQ preempted and the
/// source's own interrupt number
pub type Isr = fn(&mut TrapFrame, u32);

/// Printed by any interrupt source nobody has registered a handler for
fn default_isr(_tf: &mut TrapFrame, irq: u32) {
    crate::println!("unhandled interrupt: {irq}");
}

/// A fixed-size table of `N` interrupt sources, every slot initially occupied by
/// [`default_isr`]
pub struct IsrTable<const N: usize> {
    isrs: [Isr; N],
}

impl<const N: usize> IsrTable<N> {
    /// Creates a table with every slot set to the default handler
    pub const fn new() -> Self {
        Self {
            isrs: [default_isr; N],
        }
    }

    /// Registers `isr` for `irq`. Out-of-range `irq` is silently ignored, matching the historical
    /// reference's bounds-checked table write.
    pub fn register(&mut self, irq: u32, isr: Isr) {
        if let Some(slot) = self.isrs.get_mut(irq as usize) {
            *slot = isr;
        }
    }

    /// Invokes the handler registered for `irq`, if `irq` is in range
    pub fn invoke(&self, irq: u32, tf: &mut TrapFrame) {
        if let Some(isr) = self.isrs.get(irq as usize) {
            isr(tf, irq);
        }
    }
}

impl<const N: usize> Default for IsrTable<N> {
    fn default() -> Self {
        Self::new()
    }
}
