//! Timer drivers: the SP804 dual timer and the ARMv8 virtual generic timer
//!
//! `virt` exposes both; either can drive the scheduling tick. Both share one [`isr_timer`]
//! handler and one [`TimerDevice`] acknowledge/re-arm contract, so `main` picks whichever backend
//! the board wants without the tick-counting logic caring which.

use crate::board;
use crate::collaborators::SCHEDULER;
use crate::spinlock::SpinLock;
use crate::trap::TrapFrame;
use core::arch::asm;
use core::num::NonZeroUsize;
use core::ptr::{self, NonNull};
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::ReadWrite;
use tock_registers::register_structs;

/// Number of scheduling ticks observed since boot
pub static TICKS: SpinLock<u64> = SpinLock::new("ticks", 0);

/// Behavior a timer backend provides beyond the shared tick-counting [`isr_timer`] handler
pub trait TimerDevice: Sync {
    /// Acknowledges the tick interrupt and re-arms the next one
    fn ack_and_rearm(&self);

    /// Busy-waits for approximately `us` microseconds
    fn micro_delay(&self, us: u32);
}

/// The timer backend driving the scheduling tick for this boot, set once by whichever of
/// [`Sp804::init`] or [`VirtualTimer::init`] the board chooses
static TIMER: stdos::cell::InitCell<&'static dyn TimerDevice> = stdos::cell::InitCell::new();

/// Counts one tick and preempts the running process, then lets the active backend acknowledge and
/// re-arm the hardware
///
/// Registered as the ISR for whichever interrupt source the active backend fires on.
fn isr_timer(_tf: &mut TrapFrame, _irq: u32) {
    {
        let mut ticks = TICKS.lock();
        *ticks = ticks.wrapping_add(1);
    }
    if let Some(scheduler) = SCHEDULER.get() {
        scheduler.tick();
    }
    TIMER.ack_and_rearm();
}

/// Busy-waits for approximately `us` microseconds using the active timer backend
///
/// # Panics
/// Panics if no timer backend has been initialized yet.
pub fn micro_delay(us: u32) {
    TIMER.micro_delay(us);
}

/// Control register bits shared by both SP804 timers
mod sp804_ctrl {
    pub const ONESHOT: u32 = 1 << 0;
    pub const SIZE_32BIT: u32 = 1 << 1;
    pub const INTEN: u32 = 1 << 5;
    pub const PERIODIC: u32 = 1 << 6;
    pub const ENABLE: u32 = 1 << 7;
}

register_structs! {
    /// One SP804 timer's register block
    Sp804Registers {
        (0x00 => load: ReadWrite<u32>),
        (0x04 => value: ReadWrite<u32>),
        (0x08 => control: ReadWrite<u32>),
        (0x0C => int_clr: ReadWrite<u32>),
        (0x10 => _reserved0),
        (0x14 => @END),
    }
}

/// An SP804 dual timer: one half drives the scheduling tick, the other drives [`micro_delay`]
pub struct Sp804 {
    tick: NonNull<Sp804Registers>,
    delay: NonNull<Sp804Registers>,
}

// SAFETY: both register blocks are memory-mapped device registers, inherently shared, and this
// driver holds no other mutable software-side state
unsafe impl Sync for Sp804 {}
// SAFETY: see above
unsafe impl Send for Sp804 {}

impl Sp804 {
    fn tick(&self) -> &Sp804Registers {
        // SAFETY: constructed from a valid, exclusively-owned pointer in `init`
        unsafe { self.tick.as_ref() }
    }

    fn delay(&self) -> &Sp804Registers {
        // SAFETY: constructed from a valid, exclusively-owned pointer in `init`
        unsafe { self.delay.as_ref() }
    }
}

impl TimerDevice for Sp804 {
    fn ack_and_rearm(&self) {
        // Any write to INTCLR acknowledges the interrupt; the timer is already periodic, so no
        // reload is needed here
        self.tick().int_clr.set(1);
    }

    fn micro_delay(&self, us: u32) {
        use sp804_ctrl::{ENABLE, SIZE_32BIT};
        self.delay().control.set(ENABLE | SIZE_32BIT);
        self.delay().load.set(us);
        while (self.delay().value.get() as i32) > 0 {
            core::hint::spin_loop();
        }
        self.delay().control.set(0);
    }
}

/// Initializes the SP804 pair at `board::TIMER0` (scheduling tick) and `board::TIMER1`
/// (`micro_delay`), arming the tick timer to fire `hz` times per second through `controller`
///
/// # Panics
/// Panics if either base address is misaligned, which cannot happen on `virt`'s fixed memory map.
pub fn init_sp804(hz: u64, controller: &crate::gic::Gic) {
    let tick_ptr = NonNull::new(ptr::from_exposed_addr_mut::<Sp804Registers>(
        board::p2v(board::TIMER0) as usize,
    ))
    .expect("TIMER0 base is never zero");
    let delay_ptr = NonNull::new(ptr::from_exposed_addr_mut::<Sp804Registers>(
        board::p2v(board::TIMER1) as usize,
    ))
    .expect("TIMER1 base is never zero");
    assert!(tick_ptr.as_ptr().is_aligned(), "TIMER0 base is 4-byte aligned");
    assert!(delay_ptr.as_ptr().is_aligned(), "TIMER1 base is 4-byte aligned");

    let sp804 = Sp804 {
        tick: tick_ptr,
        delay: delay_ptr,
    };
    sp804
        .tick()
        .load
        .set(u32::try_from(board::CLK_HZ / hz).unwrap_or(u32::MAX));
    sp804.tick().control.set(
        sp804_ctrl::ENABLE | sp804_ctrl::PERIODIC | sp804_ctrl::SIZE_32BIT | sp804_ctrl::INTEN,
    );

    static HOLDER: stdos::cell::InitCell<Sp804> = stdos::cell::InitCell::new();
    HOLDER.set(sp804);
    TIMER.set(&*HOLDER);
    controller.enable(board::PIC_TIMER01, isr_timer);
}

/// Control bits of `CNTV_CTL_EL0`
mod cntv_ctl {
    pub const ENABLE: u64 = 1 << 0;
    pub const IMASK: u64 = 1 << 1;
}

/// Interval between ticks, in microseconds
const TIMER_INTERVAL_US: u64 = 10_000;

fn read_cntfrq() -> u64 {
    let freq: u64;
    // SAFETY: reading a system register has no side effects
    unsafe {
        asm!("mrs {}, cntfrq_el0", out(reg) freq);
    }
    freq
}

fn read_cntpct() -> u64 {
    let count: u64;
    // SAFETY: reading a system register has no side effects
    unsafe {
        asm!("isb", "mrs {}, cntpct_el0", out(reg) count);
    }
    count
}

fn read_cntv_ctl() -> u64 {
    let ctl: u64;
    // SAFETY: reading a system register has no side effects
    unsafe {
        asm!("mrs {}, cntv_ctl_el0", out(reg) ctl);
    }
    ctl
}

fn write_cntv_ctl(ctl: u64) {
    // SAFETY: `CNTV_CTL_EL0` only affects this core's own virtual timer
    unsafe {
        asm!("msr cntv_ctl_el0, {}", "isb", in(reg) ctl);
    }
}

fn write_cntv_tval(tval: u64) {
    // SAFETY: `CNTV_TVAL_EL0` only affects this core's own virtual timer
    unsafe {
        asm!("msr cntv_tval_el0, {}", "isb", in(reg) tval);
    }
}

/// Reloads the virtual timer to fire again after `next_us` microseconds
fn reload(next_us: u64) {
    let cycles = next_us * (read_cntfrq() / 1_000_000);
    write_cntv_tval(cycles);
}

/// The ARMv8 virtual generic timer, `CNTV_*_EL0`
pub struct VirtualTimer;

impl TimerDevice for VirtualTimer {
    fn ack_and_rearm(&self) {
        write_cntv_ctl(read_cntv_ctl() | cntv_ctl::IMASK);
        reload(TIMER_INTERVAL_US);
        write_cntv_ctl(cntv_ctl::ENABLE);
    }

    fn micro_delay(&self, us: u32) {
        let start = read_cntpct();
        let target_cycles = u64::from(us) * (read_cntfrq() / 1_000_000);
        while read_cntpct().wrapping_sub(start) < target_cycles {
            core::hint::spin_loop();
        }
    }
}

/// Initializes the virtual generic timer to fire every [`TIMER_INTERVAL_US`], routed through
/// `controller`
pub fn init_virtual_timer(controller: &crate::gic::Gic) {
    write_cntv_ctl(cntv_ctl::IMASK);
    reload(TIMER_INTERVAL_US);
    write_cntv_ctl(cntv_ctl::ENABLE);

    static VTIMER: VirtualTimer = VirtualTimer;
    TIMER.set(&VTIMER);
    controller.enable(board::PIC_VTIMER, isr_timer);
}
