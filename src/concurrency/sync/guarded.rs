//! Cells that pair one value with one lock.
//!
//! Only a single [`read`](ExclusiveGuardedCell::read) or
//! [`write`](ExclusiveGuardedCell::write) call is atomic. Reading a value in
//! one call and writing a derived value in a second call is a classic
//! get-then-set race: another writer may run in between. Do the whole
//! read-modify-write inside one `write` closure instead.
//!
//! The closures run with the lock held, so they must not touch the same cell
//! again (the locks are not reentrant).

use core::cell::UnsafeCell;
use core::fmt;

use super::{MutualExclusionLock, ReaderWriterLock};

/// A value protected by a [`MutualExclusionLock`]. Readers and writers are
/// serialised alike.
pub struct ExclusiveGuardedCell<T> {
    lock: MutualExclusionLock,
    value: UnsafeCell<T>,
}

// SAFETY: the lock hands out at most one reference to `value` at a time.
unsafe impl<T: Send> Send for ExclusiveGuardedCell<T> {}
unsafe impl<T: Send> Sync for ExclusiveGuardedCell<T> {}

impl<T> ExclusiveGuardedCell<T> {
    /// Wraps `value`.
    pub const fn new(value: T) -> Self {
        Self {
            lock: MutualExclusionLock::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Runs `body` with shared access to the value.
    #[inline]
    pub fn read<R>(&self, body: impl FnOnce(&T) -> R) -> R {
        // SAFETY: the lock is held for the whole call.
        self.lock.around(|| body(unsafe { &*self.value.get() }))
    }

    /// Runs `body` with exclusive access to the value and returns its result.
    #[inline]
    pub fn write<R>(&self, body: impl FnOnce(&mut T) -> R) -> R {
        // SAFETY: the lock is held for the whole call.
        self.lock.around(|| body(unsafe { &mut *self.value.get() }))
    }

    /// Stores `value`, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        self.write(|slot| core::mem::replace(slot, value))
    }

    /// Stores `value`. The previous value is dropped after the lock is released.
    pub fn set(&self, value: T) {
        drop(self.replace(value));
    }

    /// Returns a mutable reference without locking; `&mut self` proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Consumes the cell, returning the value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Clone> ExclusiveGuardedCell<T> {
    /// Returns a clone of the current value.
    pub fn get(&self) -> T {
        self.read(T::clone)
    }
}

impl<T: Default> Default for ExclusiveGuardedCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for ExclusiveGuardedCell<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for ExclusiveGuardedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lock.try_guard() {
            Some(_guard) => {
                // SAFETY: the guard holds the lock.
                let value = unsafe { &*self.value.get() };
                f.debug_struct("ExclusiveGuardedCell").field("value", value).finish()
            }
            None => f
                .debug_struct("ExclusiveGuardedCell")
                .field("value", &format_args!("<locked>"))
                .finish(),
        }
    }
}

/// A value protected by a [`ReaderWriterLock`]: concurrent readers, exclusive
/// writers.
pub struct ReadWriteGuardedCell<T> {
    lock: ReaderWriterLock,
    value: UnsafeCell<T>,
}

// SAFETY: readers share `&T` across threads, hence `T: Sync` for `Sync`.
unsafe impl<T: Send> Send for ReadWriteGuardedCell<T> {}
unsafe impl<T: Send + Sync> Sync for ReadWriteGuardedCell<T> {}

impl<T> ReadWriteGuardedCell<T> {
    /// Wraps `value`.
    pub const fn new(value: T) -> Self {
        Self {
            lock: ReaderWriterLock::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Runs `body` with shared access; other readers may run at the same time.
    #[inline]
    pub fn read<R>(&self, body: impl FnOnce(&T) -> R) -> R {
        let _guard = self.lock.read();
        // SAFETY: writers are excluded while the read guard lives.
        body(unsafe { &*self.value.get() })
    }

    /// Runs `body` with exclusive access and returns its result.
    #[inline]
    pub fn write<R>(&self, body: impl FnOnce(&mut T) -> R) -> R {
        let _guard = self.lock.write();
        // SAFETY: the write guard excludes every other reader and writer.
        body(unsafe { &mut *self.value.get() })
    }

    /// Like [`read`](Self::read) but returns `None` instead of blocking.
    pub fn try_read<R>(&self, body: impl FnOnce(&T) -> R) -> Option<R> {
        let _guard = self.lock.try_read()?;
        // SAFETY: as in `read`.
        Some(body(unsafe { &*self.value.get() }))
    }

    /// Like [`write`](Self::write) but returns `None` instead of blocking.
    pub fn try_write<R>(&self, body: impl FnOnce(&mut T) -> R) -> Option<R> {
        let _guard = self.lock.try_write()?;
        // SAFETY: as in `write`.
        Some(body(unsafe { &mut *self.value.get() }))
    }

    /// Stores `value`, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        self.write(|slot| core::mem::replace(slot, value))
    }

    /// Stores `value`. The previous value is dropped after the lock is released.
    pub fn set(&self, value: T) {
        drop(self.replace(value));
    }

    /// Returns a mutable reference without locking.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Consumes the cell, returning the value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Clone> ReadWriteGuardedCell<T> {
    /// Returns a clone of the current value.
    pub fn get(&self) -> T {
        self.read(T::clone)
    }
}

impl<T: Default> Default for ReadWriteGuardedCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for ReadWriteGuardedCell<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadWriteGuardedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_read(|value| format!("{value:?}")) {
            Some(value) => f
                .debug_struct("ReadWriteGuardedCell")
                .field("value", &format_args!("{value}"))
                .finish(),
            None => f
                .debug_struct("ReadWriteGuardedCell")
                .field("value", &format_args!("<locked>"))
                .finish(),
        }
    }
}
