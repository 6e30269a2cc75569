//! Cells for safely publishing state exactly once, without requiring a runtime lock afterwards

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ops::Deref;
use core::sync::atomic::{AtomicBool, Ordering};

/// A cell that must be initialized (via an `init` sequence in the kernel boot) prior to any
/// accesses
///
/// If possible, use a [`OnceLock`], as that does not require the caller to prove initialization
/// order out of band
#[expect(clippy::module_name_repetitions, reason = "Matches surrounding style")]
pub struct InitCell<T> {
    /// The underlying storage
    cell: UnsafeCell<MaybeUninit<T>>,
    /// Whether `cell` has been written to yet
    is_set: AtomicBool,
}

impl<T> InitCell<T> {
    /// Creates a new empty cell
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: UnsafeCell::new(MaybeUninit::uninit()),
            is_set: AtomicBool::new(false),
        }
    }

    /// Sets the contents of the cell to `value`.
    ///
    /// # Panics
    /// Panics if called more than once.
    pub fn set(&self, value: T) {
        assert!(
            !self.is_set.swap(true, Ordering::AcqRel),
            "Should only write once to an `InitCell`"
        );
        // SAFETY: The assertion above guarantees this is the only writer, and no readers can
        // observe the cell until `is_set` is true
        unsafe { (*self.cell.get()).write(value) };
    }

    /// Returns a reference to the contents, if this has been initialized
    pub fn get(&self) -> Option<&T> {
        if self.is_set.load(Ordering::Acquire) {
            // SAFETY: `is_set` being true means `set` has completed its write
            Some(unsafe { (*self.cell.get()).assume_init_ref() })
        } else {
            None
        }
    }
}

impl<T> Default for InitCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for InitCell<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        assert!(
            self.is_set.load(Ordering::Acquire),
            "Should only access an `InitCell` once it has been initialized"
        );
        // SAFETY: `is_set` being true means `set` has completed its write
        unsafe { (*self.cell.get()).assume_init_ref() }
    }
}

// SAFETY: `InitCell` only provides shared access once set, and by assumption it is only mutably
// set before there are readers
unsafe impl<T: Send> Send for InitCell<T> {}
// SAFETY: see above
unsafe impl<T: Send> Sync for InitCell<T> {}

/// A cell that can be written to at most once, after which it behaves as a plain shared
/// reference. Unlike [`InitCell`], reads before initialization are a recoverable `None` rather
/// than a panic.
pub struct OnceLock<T> {
    /// The underlying storage
    cell: UnsafeCell<MaybeUninit<T>>,
    /// Whether `cell` has been written to yet
    is_set: AtomicBool,
}

impl<T> OnceLock<T> {
    /// Creates a new, empty lock
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: UnsafeCell::new(MaybeUninit::uninit()),
            is_set: AtomicBool::new(false),
        }
    }

    /// Returns a reference to the contents, if this has been initialized
    pub fn get(&self) -> Option<&T> {
        if self.is_set.load(Ordering::Acquire) {
            // SAFETY: `is_set` being true means `set` has completed its write, and no further
            // writes are possible
            Some(unsafe { (*self.cell.get()).assume_init_ref() })
        } else {
            None
        }
    }

    /// Initializes the contents of this lock to `value`
    ///
    /// Returns `Err(value)` if the lock was already initialized
    pub fn set(&self, value: T) -> Result<(), T> {
        if self.is_set.swap(true, Ordering::AcqRel) {
            Err(value)
        } else {
            // SAFETY: The swap above guarantees only one caller observes `false`, and no readers
            // can observe the cell until `is_set` is true
            unsafe { (*self.cell.get()).write(value) };
            Ok(())
        }
    }
}

impl<T> Default for OnceLock<T> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: `OnceLock` only provides shared access once set, and the swap in `set` guarantees
// exclusivity of the write
unsafe impl<T: Send> Send for OnceLock<T> {}
// SAFETY: see above
unsafe impl<T: Send + Sync> Sync for OnceLock<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_cell_reads_back_what_was_set() {
        let cell = InitCell::new();
        cell.set(42);
        assert_eq!(*cell, 42);
    }

    #[test]
    #[should_panic(expected = "only write once")]
    fn init_cell_panics_on_second_set() {
        let cell = InitCell::new();
        cell.set(1);
        cell.set(2);
    }

    #[test]
    #[should_panic(expected = "only access")]
    fn init_cell_panics_on_read_before_set() {
        let cell: InitCell<u32> = InitCell::new();
        let _ = *cell;
    }

    #[test]
    fn once_lock_get_is_none_until_set() {
        let lock = OnceLock::new();
        assert!(lock.get().is_none());
        assert_eq!(lock.set(7), Ok(()));
        assert_eq!(lock.get(), Some(&7));
    }

    #[test]
    fn once_lock_second_set_returns_the_rejected_value() {
        let lock = OnceLock::new();
        lock.set(1).unwrap();
        assert_eq!(lock.set(2), Err(2));
        assert_eq!(lock.get(), Some(&1));
    }
}
