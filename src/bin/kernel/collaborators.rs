//! Trait boundaries for the parts of a full kernel this core does not implement
//!
//! This workspace's scheduler, file system, and console are out of scope here (they belong to
//! higher layers built on top of this core), but the memory manager, trap dispatcher, and syscall
//! layer all need to call into them. Each is expressed as a small trait so this core can be built
//! and tested without a concrete scheduler or file system behind it.

use stdos::cell::OnceLock;

/// The scheduler registered for this boot, reached by the trap dispatcher and timer tick handler
///
/// Set once during kernel init; there is no concrete scheduler in this core, so every caller goes
/// through this indirection.
pub static SCHEDULER: OnceLock<&'static dyn Scheduler> = OnceLock::new();

/// An inode handle, opaque to this core
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct InodeId(pub u32);

/// Errors a [`FileSystem`] read can report
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FsError {
    /// The requested range is not backed by the inode's contents
    OutOfRange,
    /// The underlying storage failed to service the read
    Io,
}

/// The subset of file-system behavior `loaduvm` depends on
pub trait FileSystem {
    /// Reads up to `dst.len()` bytes starting at `offset` into an inode, returning the number of
    /// bytes actually read
    fn read_inode(&self, inode: InodeId, dst: &mut [u8], offset: u32) -> Result<u32, FsError>;
}

/// A process identifier, opaque to this core
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Pid(pub u32);

/// The subset of scheduler behavior the trap dispatcher depends on
pub trait Scheduler {
    /// Called when the currently running process takes a fault it cannot survive (an EL0 data or
    /// instruction abort with no handler). The scheduler is responsible for tearing the process
    /// down; this core's trap dispatcher does not touch process lifecycle itself.
    fn kill_current(&self, reason: KillReason);

    /// Called on every timer tick, so the scheduler can preempt the running process
    fn tick(&self);

    /// The currently running process's id, if any is running
    fn current(&self) -> Option<Pid>;
}

/// Why the scheduler was asked to kill the running process
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum KillReason {
    /// A data or instruction abort at EL0 with no resolvable cause
    Fault,
    /// A system call requested process termination
    Exit(i32),
}

/// The subset of console behavior this core's diagnostics depend on, distinct from the raw UART
/// driver: this is the line-oriented, possibly-buffered console a full kernel would expose to user
/// processes
pub trait Console {
    /// Writes a single byte, blocking if the underlying transport is not ready
    fn put_byte(&self, byte: u8);
}
