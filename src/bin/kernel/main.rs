//! The privileged kernel of the operating system
//!
//! This manages hardware resources at as basic a level as possible: physical pages, page tables,
//! traps and interrupts, and the fixed set of devices QEMU's `virt` machine exposes. Scheduling, a
//! filesystem, and a console line discipline are out of scope — they reach in through the traits
//! in [`collaborators`].

#![no_main]
#![no_std]
#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(clippy::complexity)]
#![warn(clippy::correctness)]
#![warn(clippy::pedantic)]
#![warn(clippy::suspicious)]
#![warn(clippy::perf)]
#![warn(clippy::style)]
#![expect(clippy::blanket_clippy_restriction_lints)]
#![warn(clippy::restriction)]
#![expect(clippy::allow_attributes_without_reason)]
#![expect(clippy::default_numeric_fallback)]
#![expect(clippy::implicit_return)]
#![expect(clippy::inline_asm_x86_intel_syntax)]
#![expect(clippy::question_mark_used)]
#![expect(clippy::semicolon_outside_block)]
#![expect(clippy::separated_literal_suffix)]
#![expect(clippy::mod_module_files)]
#![expect(clippy::shadow_reuse)]
#![expect(clippy::single_call_fn)]
#![expect(clippy::unimplemented)]
#![expect(clippy::unreachable)]
#![expect(clippy::expect_used)]
#![expect(clippy::pub_with_shorthand)]
#![feature(exposed_provenance)]
#![feature(generic_arg_infer)]
#![feature(lint_reasons)]
#![feature(panic_info_message)]
#![feature(pointer_is_aligned)]
#![feature(stdsimd)]
#![feature(strict_provenance)]

use core::arch::asm;
use core::fmt::Write;
use core::hint;
use core::num::NonZeroUsize;
use core::panic::PanicInfo;
use stdos::cell::OnceLock;

mod board;
mod boot;
mod collaborators;
mod gic;
mod intc;
mod mm;
mod percpu;
mod pic;
mod process;
mod spinlock;
mod timer;
mod trap;
mod uart;
mod vm;

use spinlock::SpinLock;
use uart::Uart;

/// The global console UART, set once during boot. Unlike [`stdos::sync::SpinLock`], this is the
/// interrupt-masking [`crate::spinlock::SpinLock`]: trap and IRQ handlers print diagnostics too,
/// so an ordinary lock could deadlock a core against its own interrupt.
static UART: OnceLock<SpinLock<Uart>> = OnceLock::new();

#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        writeln!(&mut $crate::UART.get().expect("UART should be initialized").lock(), $($arg)*).unwrap();
    }};
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        write!(&mut $crate::UART.get().expect("UART should be initialized").lock(), $($arg)*).unwrap();
    }};
}

/// The primary initialization sequence for the kernel, running at EL1 with the MMU and the
/// high-half mapping [`boot`] built already live
///
/// Ordering mirrors the historical reference's `kmain`, trimmed to what this core actually owns:
/// the console first, so every later step can log; then physical memory management; then traps;
/// then the interrupt controller and its timer. Interrupts stay masked until all of that is live,
/// then this core idles, since scheduling a first process is a [`collaborators::Scheduler`]'s job.
extern "C" fn main() -> ! {
    let uart =
        // SAFETY: `board::UART0`'s high-half alias is mapped device memory by the boot-time page
        // tables, `main` runs exactly once, and nothing else touches the UART before this line
        unsafe { Uart::new(NonZeroUsize::new(board::p2v(board::UART0) as usize).expect("UART0 is never zero")) }
            .expect("UART0 is 4-byte aligned");
    UART.set(SpinLock::new("uart", uart))
        .unwrap_or_else(|_| panic!("UART should not already be initialized"));

    println!("starting kernel for AArch64 (QEMU virt)...");

    let kernel_end = {
        extern "C" {
            static end: u8;
        }
        // SAFETY: `end` is the linker symbol marking the first free byte past the kernel image;
        // taking its address never reads through it
        unsafe { core::ptr::addr_of!(end) as usize }
    };
    // SAFETY: the boot-time identity map is live, and nothing else has allocated physical memory
    // yet
    unsafe { mm::init(kernel_end) };

    // SAFETY: runs exactly once, before interrupts are unmasked below
    unsafe { trap::init() };

    gic::init();
    timer::init_virtual_timer(gic::GIC.get().expect("gic::init just initialized this"));

    println!("Starting Kernel");

    // SAFETY: the vector table, GIC, and timer are all live; this is the first point at which a
    // trap could actually fire
    unsafe { asm!("msr daifclr, #2") };

    loop {
        // SAFETY: `wfi` only affects this core's own execution, resuming on the next interrupt
        unsafe { asm!("wfi", options(nomem, nostack)) };
    }
}

/// Panics are unhandled error conditions — diagnosed over the console, then this core halts
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    if let Some(uart) = UART.get() {
        let mut uart = uart.lock();
        let _ = write!(&mut uart, "PANIC occurred");
        if let Some(location) = info.location() {
            let _ = write!(
                &mut uart,
                " (at {}:{}:{})",
                location.file(),
                location.line(),
                location.column()
            );
        }
        if let Some(args) = info.message() {
            let _ = write!(&mut uart, ": {args}");
        }
        let _ = writeln!(&mut uart);
        drop(uart);
    }
    loop {
        hint::spin_loop();
    }
}
