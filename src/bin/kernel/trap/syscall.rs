//! System call argument extraction and dispatch
//!
//! The actual system calls (`fork`, `read`, `write`, ...) are out of scope for this core — they
//! belong to whatever is layered on top of it. What belongs here is the mechanism: reading a
//! syscall number and its arguments out of a trapped user register state, validating user pointers
//! against the calling process's address space size, and dispatching to whichever handler an
//! external caller has registered.

use super::TrapFrame;
use crate::percpu::CPU;
use crate::process::Process;
use crate::println;

/// Largest syscall number this table has a slot for, matching the historical reference's
/// `syscall.h`
pub const SYS_FORK: u32 = 1;
pub const SYS_EXIT: u32 = 2;
pub const SYS_WAIT: u32 = 3;
pub const SYS_PIPE: u32 = 4;
pub const SYS_READ: u32 = 5;
pub const SYS_KILL: u32 = 6;
pub const SYS_EXEC: u32 = 7;
pub const SYS_FSTAT: u32 = 8;
pub const SYS_CHDIR: u32 = 9;
pub const SYS_DUP: u32 = 10;
pub const SYS_GETPID: u32 = 11;
pub const SYS_SBRK: u32 = 12;
pub const SYS_SLEEP: u32 = 13;
pub const SYS_UPTIME: u32 = 14;
pub const SYS_OPEN: u32 = 15;
pub const SYS_WRITE: u32 = 16;
pub const SYS_MKNOD: u32 = 17;
pub const SYS_UNLINK: u32 = 18;
pub const SYS_LINK: u32 = 19;
pub const SYS_MKDIR: u32 = 20;
pub const SYS_CLOSE: u32 = 21;

/// Number of slots in the syscall table, one past the highest-numbered syscall above
const NUM_SYSCALLS: usize = 22;

/// A registered system call implementation
///
/// Takes the trapframe of the process that made the call so it can read further arguments via
/// [`argint`]/[`argptr`]/[`argstr`], and returns the value to place in `x0` before resuming user
/// mode.
pub type SyscallHandler = fn(&mut TrapFrame) -> i64;

/// A sparse table of syscall numbers to handlers
pub struct SyscallTable {
    handlers: [Option<SyscallHandler>; NUM_SYSCALLS],
}

impl SyscallTable {
    /// Creates an empty table; every syscall number is unimplemented until [`register`] is called
    ///
    /// [`register`]: SyscallTable::register
    pub const fn new() -> Self {
        Self {
            handlers: [None; NUM_SYSCALLS],
        }
    }

    /// Registers `handler` for `num`
    ///
    /// # Panics
    /// Panics if `num` is zero or exceeds this table's capacity.
    pub fn register(&mut self, num: u32, handler: SyscallHandler) {
        assert!(num != 0, "syscall number 0 is reserved");
        let slot = self
            .handlers
            .get_mut(num as usize)
            .expect("syscall number out of range");
        *slot = Some(handler);
    }
}

impl Default for SyscallTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The syscall table for this boot, filled in by whatever layers a concrete syscall surface on
/// top of this core
pub static SYSCALLS: crate::spinlock::SpinLock<SyscallTable> =
    crate::spinlock::SpinLock::new("syscalls", SyscallTable::new());

/// Reads the syscall number out of `x0`, dispatches to its registered handler, and writes the
/// result back into `x0`
///
/// An unregistered or out-of-range syscall number writes `-1` to `x0`, matching the historical
/// reference's `syscall()`. `SYS_EXEC` is exempted from the `x0` writeback, since a successful
/// `exec` has already overwritten the trapframe with the new program's entry state.
pub fn dispatch(tf: &mut TrapFrame) {
    let num = u32::try_from(tf.regs[0]).unwrap_or(u32::MAX);
    let handler = SYSCALLS.lock().handlers.get(num as usize).copied().flatten();

    match handler {
        Some(handler) => {
            let ret = handler(tf);
            if num != SYS_EXEC {
                tf.regs[0] = ret as u64;
            }
        }
        None => {
            println!("unknown sys call {num}");
            tf.regs[0] = (-1_i64) as u64;
        }
    }
}

/// Returns the process currently making this syscall, if one is running
///
/// Exposed so a registered [`SyscallHandler`] can recover the calling process to pass to
/// [`argptr`]/[`argstr`]/[`fetchint`]/[`fetchstr`].
///
/// # Safety
/// Must only be called from within syscall handling, where the scheduler guarantees the current
/// process is not concurrently torn down.
pub unsafe fn current_process<'proc>() -> Option<&'proc Process> {
    // SAFETY: forwarded from the caller
    unsafe { CPU.current_process() }.map(|proc| {
        // SAFETY: the pointer is valid for as long as this process remains current, guaranteed by
        // the caller
        unsafe { proc.as_ref() }
    })
}

/// Fetches the `n`-th (0-indexed) integer argument, from registers `r1`..`r4`
///
/// # Panics
/// Panics if `n > 3`, matching the historical reference's `argint`.
pub fn argint(tf: &TrapFrame, n: usize) -> i64 {
    assert!(n <= 3, "argint: only 4 integer arguments are supported");
    tf.regs[1 + n] as i64
}

/// Reads an 8-byte integer out of the calling process's user memory at `addr`
///
/// Returns `None` if `[addr, addr + 8)` is not entirely within the process's address space.
///
/// # Safety
/// Must only be called while `TTBR0_EL1` holds the calling process's page table, i.e. from within
/// syscall handling for that process.
pub unsafe fn fetchint(proc: &Process, addr: usize) -> Option<i64> {
    if addr >= proc.sz || addr.checked_add(8)? > proc.sz {
        return None;
    }
    // SAFETY: the bounds check above guarantees `addr` lies within the calling process's mapped
    // user address space, and the caller guarantees that address space is currently active
    Some(unsafe { (addr as *const i64).read_unaligned() })
}

/// Reads a NUL-terminated string out of the calling process's user memory starting at `addr`
///
/// Returns the string's bytes, excluding the terminating NUL. Returns `None` if `addr` is out of
/// range or no NUL byte is found before the end of the process's address space.
///
/// # Safety
/// Must only be called while `TTBR0_EL1` holds the calling process's page table.
pub unsafe fn fetchstr(proc: &Process, addr: usize) -> Option<&[u8]> {
    if addr >= proc.sz {
        return None;
    }
    // SAFETY: `addr < proc.sz` is checked above, and the caller guarantees the calling process's
    // address space is currently active; the scan below stays within `[addr, proc.sz)`
    let bytes = unsafe { core::slice::from_raw_parts(addr as *const u8, proc.sz - addr) };
    let len = bytes.iter().position(|&byte| byte == 0)?;
    Some(&bytes[..len])
}

/// Fetches the `n`-th argument as a user pointer, validating that `[ptr, ptr + size)` lies within
/// the calling process's address space
///
/// # Safety
/// Must only be called while `TTBR0_EL1` holds the calling process's page table.
pub unsafe fn argptr(tf: &TrapFrame, proc: &Process, n: usize, size: usize) -> Option<*mut u8> {
    let addr = usize::try_from(argint(tf, n)).ok()?;
    if addr >= proc.sz || addr.checked_add(size)? > proc.sz {
        return None;
    }
    Some(addr as *mut u8)
}

/// Fetches the `n`-th argument as a NUL-terminated user string
///
/// # Safety
/// Must only be called while `TTBR0_EL1` holds the calling process's page table.
pub unsafe fn argstr(tf: &TrapFrame, proc: &Process, n: usize) -> Option<&[u8]> {
    let addr = usize::try_from(argint(tf, n)).ok()?;
    // SAFETY: forwarded from the caller
    unsafe { fetchstr(proc, addr) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_one_handler() -> SyscallTable {
        let mut table = SyscallTable::new();
        table.register(SYS_GETPID, |_tf| 42);
        table
    }

    #[test]
    fn register_then_lookup_returns_the_handler() {
        let table = table_with_one_handler();
        let handler = table.handlers[SYS_GETPID as usize].expect("handler was just registered");
        let mut tf = zeroed_trapframe();
        assert_eq!(handler(&mut tf), 42);
    }

    #[test]
    fn unregistered_syscall_number_has_no_handler() {
        let table = table_with_one_handler();
        assert!(table.handlers[SYS_FORK as usize].is_none());
    }

    fn zeroed_trapframe() -> TrapFrame {
        TrapFrame {
            regs: [0; 31],
            sp: 0,
            pc: 0,
            pstate: 0,
        }
    }

    #[test]
    fn argint_reads_from_r1_through_r4() {
        let mut tf = zeroed_trapframe();
        tf.regs[1] = 10;
        tf.regs[2] = 20;
        tf.regs[3] = 30;
        tf.regs[4] = 40;
        assert_eq!(argint(&tf, 0), 10);
        assert_eq!(argint(&tf, 1), 20);
        assert_eq!(argint(&tf, 2), 30);
        assert_eq!(argint(&tf, 3), 40);
    }
}
