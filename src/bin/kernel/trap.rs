//! Exception vector table and synchronous/IRQ dispatch
//!
//! Every trap — a syscall, a user fault, a timer tick — funnels through the 16-entry AArch64
//! vector table built by the `global_asm!` below, which saves a [`TrapFrame`] on the kernel stack
//! and calls into one of the `extern "C"` handlers in this file. `ESR_EL1`'s Exception Class field
//! then picks the specific path.

use crate::collaborators::{KillReason, SCHEDULER};
use crate::percpu::CPU;
use crate::{gic, println};
use bitfield_struct::bitfield;
use core::arch::{asm, global_asm};

pub mod syscall;

/// The registers and mode state saved across a trap, restored before `eret`
///
/// `repr(C)` and exactly 272 bytes (`31 * 8 + 8 + 8 + 8`): the vector table's save/restore macros
/// index into this layout directly, so its field order and width must not change without updating
/// them.
#[repr(C)]
#[derive(Debug)]
pub struct TrapFrame {
    /// `x0`..`x30`, in order
    pub regs: [u64; 31],
    /// The stack pointer in use immediately before the trap (`SP_EL0` for a trap from EL0, or the
    /// pre-trap `SP_EL1` for a trap taken while already in the kernel)
    pub sp: u64,
    /// `ELR_EL1`: the instruction the trapped context will resume at
    pub pc: u64,
    /// `SPSR_EL1`: the processor state the trapped context will resume with
    pub pstate: u64,
}

impl TrapFrame {
    /// Returns the Exception Level the trapped context ran at, decoded from `pstate`'s `M[3:2]`
    /// field (`0` for EL0, `1` for EL1)
    fn from_el1(&self) -> bool {
        self.pstate & 0b1100 != 0
    }
}

/// Exception Class values from `ESR_EL1` this dispatcher acts on
///
/// Kept as plain constants rather than an enum: the field is sparse, and an unmatched value should
/// fall through to a default path instead of being unrepresentable.
mod ec {
    pub const SVC_AARCH64: u8 = 0b010_101;
    pub const INSTRUCTION_ABORT_LOWER_EL: u8 = 0b100_000;
    pub const INSTRUCTION_ABORT_EL1: u8 = 0b100_001;
    pub const DATA_ABORT_LOWER_EL: u8 = 0b100_100;
    pub const DATA_ABORT_EL1: u8 = 0b100_101;
}

/// The decoded form of `ESR_EL1`
#[bitfield(u32)]
struct Esr {
    #[bits(25)]
    iss: u32,
    #[bits(1)]
    il: bool,
    #[bits(6)]
    ec: u8,
}

fn read_esr_el1() -> u32 {
    let esr: u64;
    // SAFETY: reading a system register has no side effects
    unsafe {
        asm!("mrs {}, esr_el1", out(reg) esr);
    }
    esr as u32
}

fn read_far_el1() -> u64 {
    let far: u64;
    // SAFETY: reading a system register has no side effects
    unsafe {
        asm!("mrs {}, far_el1", out(reg) far);
    }
    far
}

/// Prints every field of `tf`, for diagnosing a fault this kernel cannot otherwise recover from
fn dump_trapframe(tf: &TrapFrame) {
    println!("trapframe at {:#p}:", tf);
    println!("  sp     {:#018x}", tf.sp);
    println!("  pc     {:#018x}", tf.pc);
    println!("  pstate {:#018x}", tf.pstate);
    for (i, reg) in tf.regs.iter().enumerate() {
        println!("  x{i:<2}   {reg:#018x}");
    }
}

/// Sets up the exception vector base address for this core
///
/// # Safety
/// Must be called exactly once, before interrupts are unmasked and before any code relies on traps
/// being handled.
pub unsafe fn init() {
    extern "C" {
        static vectors: u8;
    }
    // SAFETY: `vectors` is the `.vectors`-section symbol the `global_asm!` below defines; loading
    // it into `VBAR_EL1` only affects this core's own exception routing
    unsafe {
        asm!(
            "msr vbar_el1, {}",
            "isb",
            in(reg) core::ptr::addr_of!(vectors),
        );
    }
}

/// Dispatches a synchronous exception taken from EL0
extern "C" fn handle_sync_el0(tf: *mut TrapFrame) {
    // SAFETY: `tf` points at the frame the vector entry that called this just built on the kernel
    // stack; it is valid until this function returns and `eret` restores the saved state
    let tf = unsafe { &mut *tf };

    // SAFETY: reading the currently-running process pointer to record where its trapframe lives;
    // the scheduler guarantees it is not concurrently torn down while this core is in the kernel
    if let Some(mut proc) = unsafe { CPU.current_process() } {
        // SAFETY: see above
        unsafe {
            proc.as_mut().tf = tf as *mut TrapFrame;
        }
    }

    let esr = Esr::from(read_esr_el1());
    match esr.ec() {
        ec::SVC_AARCH64 => syscall::dispatch(tf),
        ec::DATA_ABORT_LOWER_EL | ec::INSTRUCTION_ABORT_LOWER_EL => {
            let far = read_far_el1();
            println!("pid {:?}: fault at {far:#018x}, killing", current_pid());
            match SCHEDULER.get() {
                Some(scheduler) => scheduler.kill_current(KillReason::Fault),
                None => panic!("EL0 fault at {far:#018x} with no scheduler registered"),
            }
        }
        other => {
            println!("pid {:?}: unhandled exception ec={other:#x}, killing", current_pid());
            match SCHEDULER.get() {
                Some(scheduler) => scheduler.kill_current(KillReason::Fault),
                None => panic!("unhandled synchronous exception from EL0 with no scheduler registered: ec={other:#x}"),
            }
        }
    }
}

/// Dispatches a synchronous exception taken while already in the kernel
///
/// A correctly functioning kernel should never actually reach most of these: an EL1 data or
/// instruction abort here is a kernel bug, not something to recover from.
extern "C" fn handle_sync_el1h(tf: *mut TrapFrame) -> ! {
    // SAFETY: see `handle_sync_el0`
    let tf = unsafe { &*tf };
    let esr = Esr::from(read_esr_el1());
    dump_trapframe(tf);
    match esr.ec() {
        ec::DATA_ABORT_EL1 | ec::INSTRUCTION_ABORT_EL1 => {
            panic!("kernel abort at {:#018x}", read_far_el1());
        }
        other => panic!("unhandled synchronous exception from EL1: ec={other:#x}"),
    }
}

/// Dispatches an IRQ, from either EL0 or EL1h
extern "C" fn handle_irq(tf: *mut TrapFrame) {
    // SAFETY: see `handle_sync_el0`
    let tf = unsafe { &mut *tf };

    if !tf.from_el1() {
        // SAFETY: see `handle_sync_el0`
        if let Some(mut proc) = unsafe { CPU.current_process() } {
            // SAFETY: see `handle_sync_el0`
            unsafe {
                proc.as_mut().tf = tf as *mut TrapFrame;
            }
        }
    }

    match gic::GIC.get() {
        Some(controller) => controller.dispatch(tf),
        None => println!("IRQ taken with no interrupt controller initialized"),
    }
}

/// Handles an entry no correctly functioning program should ever cause: FIQ, SError, or any
/// `AArch32` vector
extern "C" fn handle_invalid(tf: *mut TrapFrame) -> ! {
    // SAFETY: see `handle_sync_el0`
    let tf = unsafe { &*tf };
    dump_trapframe(tf);
    panic!("unsupported exception vector taken (esr={:#010x})", read_esr_el1());
}

fn current_pid() -> Option<crate::collaborators::Pid> {
    SCHEDULER.get().and_then(|scheduler| scheduler.current())
}

global_asm!(
    include_str!("trap.s"),
    sync_el1h = sym handle_sync_el1h,
    irq_handler = sym handle_irq,
    sync_el0 = sym handle_sync_el0,
    invalid = sym handle_invalid,
);
