//! The single CPU's state: `ncli`/`intena` bookkeeping for nestable interrupt-masking critical
//! sections, and a pointer to the process currently running on it
//!
//! A real multiprocessor port of this design would anchor one of these per core via `TPIDR_EL1`;
//! since this target is single-CPU, one global instance stands in for the per-CPU area.

use crate::process::Process;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};

/// The state of the only CPU in the system
pub struct Cpu {
    /// Depth of nested [`crate::spinlock::pushcli`] calls
    ncli: AtomicU32,
    /// Whether interrupts were enabled before the outermost `pushcli`
    intena: AtomicBool,
    /// The process currently running on this CPU, if any
    proc: AtomicPtr<Process>,
}

/// The only CPU's state
pub static CPU: Cpu = Cpu::new();

impl Cpu {
    /// Creates a CPU record with no nested critical sections and no running process
    const fn new() -> Self {
        Self {
            ncli: AtomicU32::new(0),
            intena: AtomicBool::new(false),
            proc: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Returns the current nesting depth of `pushcli`/`popcli` pairs
    pub(crate) fn ncli(&self) -> u32 {
        self.ncli.load(Ordering::Relaxed)
    }

    /// Sets the nesting depth
    pub(crate) fn set_ncli(&self, value: u32) {
        self.ncli.store(value, Ordering::Relaxed);
    }

    /// Returns whether interrupts were enabled before the outermost `pushcli`
    pub(crate) fn intena(&self) -> bool {
        self.intena.load(Ordering::Relaxed)
    }

    /// Records whether interrupts were enabled before the outermost `pushcli`
    pub(crate) fn set_intena(&self, value: bool) {
        self.intena.store(value, Ordering::Relaxed);
    }

    /// Returns the process currently running on this CPU, if any
    ///
    /// # Safety
    /// The returned pointer is valid only as long as the scheduler guarantees the referenced
    /// process is not concurrently torn down
    pub unsafe fn current_process(&self) -> Option<ptr::NonNull<Process>> {
        ptr::NonNull::new(self.proc.load(Ordering::Acquire))
    }

    /// Records `process` as the one currently running on this CPU
    ///
    /// # Safety
    /// `process` must outlive its residency as the current process, or be cleared with
    /// `set_current_process(None)` before it is freed
    pub unsafe fn set_current_process(&self, process: Option<ptr::NonNull<Process>>) {
        self.proc.store(
            process.map_or_else(ptr::null_mut, ptr::NonNull::as_ptr),
            Ordering::Release,
        );
    }
}

// SAFETY: all fields are accessed through atomics; this models a genuine per-CPU area for a
// single-CPU target
unsafe impl Sync for Cpu {}
