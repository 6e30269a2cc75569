//! The kernel-side record of a user process's execution state
//!
//! Scheduling policy itself (choosing which process runs next, blocking/waking) is owned by
//! whatever implements [`crate::collaborators::Scheduler`]; this module only holds the state the
//! trap and virtual-memory layers need to touch directly: the address space, the kernel stack, and
//! the saved trapframe.

use crate::collaborators::Pid;
use crate::trap::TrapFrame;
use crate::vm::AddressSpace;

/// Maximum length of a process name, including the trailing nul, matching the historical
/// reference's `proc.h`
pub const PROC_NAME_LEN: usize = 16;

/// A process's kernel-visible state
pub struct Process {
    /// Size of the process's user address space, in bytes
    pub sz: usize,
    /// The process's page table
    pub pgdir: AddressSpace,
    /// Bottom of the process's kernel stack (one page, allocated from the buddy allocator)
    pub kstack: usize,
    /// Saved user-mode register state, restored on return from the next trap
    ///
    /// Null until the process has taken its first trap into the kernel.
    pub tf: *mut TrapFrame,
    /// Set by a handler that wants this process killed at its next convenient check (the next
    /// return to user mode, or the next voluntary yield)
    pub killed: bool,
    /// This process's identifier
    pub pid: Pid,
    /// Human-readable name, for debugging
    pub name: [u8; PROC_NAME_LEN],
}

impl Process {
    /// Builds a process record around an already-constructed address space and kernel stack
    pub fn new(pid: Pid, pgdir: AddressSpace, kstack: usize, name: [u8; PROC_NAME_LEN]) -> Self {
        Self {
            sz: 0,
            pgdir,
            kstack,
            tf: core::ptr::null_mut(),
            killed: false,
            pid,
            name,
        }
    }
}
