//! Interrupt-masking critical sections and the spinlock built on top of them
//!
//! On a single core there is nothing to spin against; the only thing a lock needs to protect
//! against is an interrupt handler observing a partially-updated structure on the same CPU. So
//! [`pushcli`]/[`popcli`] are the primitive this module really provides, mirroring the historical
//! reference's `arm.c`, and [`SpinLock`] is a thin holding-flag wrapper around them that keeps the
//! nest-then-release discipline in one place rather than requiring every caller to pair `pushcli`
//! and `popcli` by hand.

use crate::percpu::CPU;
use core::arch::asm;
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Reads `DAIF` and reports whether IRQs are currently unmasked
fn int_enabled() -> bool {
    let daif: u64;
    // SAFETY: reading a system register has no side effects
    unsafe {
        asm!("mrs {}, daif", out(reg) daif);
    }
    daif & (1 << 7) == 0
}

/// Masks IRQs unconditionally
fn cli() {
    // SAFETY: `DAIFSET` only affects this core's own interrupt mask
    unsafe {
        asm!("msr daifset, #2");
    }
}

/// Unmasks IRQs unconditionally
fn sti() {
    // SAFETY: `DAIFCLR` only affects this core's own interrupt mask
    unsafe {
        asm!("msr daifclr, #2");
    }
}

/// Masks interrupts, remembering whether they were enabled on entry so a matching [`popcli`]
/// restores the outer state
///
/// Nests: an inner `pushcli`/`popcli` pair does not re-enable interrupts early. Only the
/// outermost `popcli` restores whatever was true before the outermost `pushcli`, exactly as in
/// the historical reference's `pushcli`/`popcli`.
pub fn pushcli() {
    let was_enabled = int_enabled();
    cli();
    if CPU.ncli() == 0 {
        CPU.set_intena(was_enabled);
    }
    CPU.set_ncli(CPU.ncli() + 1);
}

/// Undoes one [`pushcli`]. Once the nesting count returns to zero, interrupts are restored to
/// whatever they were before the outermost `pushcli`.
///
/// # Panics
/// Panics if interrupts are observed enabled here, or if called without a matching outstanding
/// `pushcli` — both indicate a caller bug, matching the historical reference's `popcli`.
pub fn popcli() {
    assert!(!int_enabled(), "popcli: interrupts are enabled");
    let ncli = CPU
        .ncli()
        .checked_sub(1)
        .expect("popcli: no matching pushcli");
    CPU.set_ncli(ncli);
    if ncli == 0 && CPU.intena() {
        sti();
    }
}

/// A mutual-exclusion lock that masks interrupts for the duration of the critical section
///
/// Unlike [`stdos::sync::SpinLock`], acquiring this lock also calls [`pushcli`], so it is safe to
/// use from code a trap handler might itself be invoked from: a handler can never observe this
/// lock half-held by the very code it interrupted.
pub struct SpinLock<T: ?Sized> {
    locked: AtomicBool,
    name: &'static str,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is only ever granted through a held `SpinLockGuard`, which requires
// exclusive possession of `locked`
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates an unlocked lock protecting `data`, identified by `name` for debugging
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            name,
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Acquires the lock, masking interrupts on this CPU until the returned guard is dropped
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        pushcli();
        assert!(!self.holding(), "acquire {}: already held by this CPU", self.name);
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        SpinLockGuard { lock: self }
    }

    /// Returns whether this lock is currently held (by any holder; this target is uniprocessor, so
    /// "by any holder" and "by this CPU" coincide)
    fn holding(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// RAII guard granting access to a [`SpinLock`]'s contents, releasing the lock and restoring the
/// interrupt mask via [`popcli`] on drop
pub struct SpinLockGuard<'lock, T: ?Sized> {
    lock: &'lock SpinLock<T>,
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: holding a `SpinLockGuard` implies exclusive possession of the lock
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding a `SpinLockGuard` implies exclusive possession of the lock
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        popcli();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_grants_exclusive_access() {
        let lock = SpinLock::new("test", 0_u32);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 1);
    }
}
