//! A three-state futex mutex.

use core::sync::atomic::{AtomicU32, Ordering};
use crossbeam_utils::Backoff;

use super::{wait_on_u32, wake_one_u32};

/// A non-reentrant blocking mutual-exclusion lock.
///
/// The lock protects no data of its own; pair it with an `UnsafeCell` (see
/// [`ExclusiveGuardedCell`](super::ExclusiveGuardedCell)) or use it to
/// serialise a critical section with [`around`](Self::around).
///
/// Calling [`lock`](Self::lock) again from a thread that already holds the
/// lock deadlocks.
///
/// # States
/// - 0: Unlocked
/// - 1: Locked, no waiters
/// - 2: Locked, waiters may be parked (contended)
pub struct MutualExclusionLock {
    state: AtomicU32,
}

impl MutualExclusionLock {
    const UNLOCKED: u32 = 0;
    const LOCKED: u32 = 1;
    const CONTENDED: u32 = 2;

    /// Creates an unlocked lock.
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(Self::UNLOCKED),
        }
    }

    /// Blocks the calling thread until the lock is acquired.
    #[inline]
    pub fn lock(&self) {
        if self
            .state
            .compare_exchange(Self::UNLOCKED, Self::LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.lock_contended();
        }
    }

    #[cold]
    fn lock_contended(&self) {
        let backoff = Backoff::new();
        while !backoff.is_completed() {
            if self.state.load(Ordering::Relaxed) == Self::UNLOCKED
                && self
                    .state
                    .compare_exchange_weak(
                        Self::UNLOCKED,
                        Self::LOCKED,
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
            {
                return;
            }
            backoff.snooze();
        }

        // Once parked we can no longer tell whether other waiters exist, so
        // the lock is taken in the contended state and unlock always wakes.
        while self.state.swap(Self::CONTENDED, Ordering::Acquire) != Self::UNLOCKED {
            wait_on_u32(&self.state, Self::CONTENDED);
        }
    }

    /// Attempts to acquire the lock without blocking.
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.state
            .compare_exchange(Self::UNLOCKED, Self::LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Releases the lock.
    ///
    /// # Safety
    /// The calling thread must hold the lock through a matching
    /// [`lock`](Self::lock) or successful [`try_lock`](Self::try_lock).
    #[inline]
    pub unsafe fn unlock(&self) {
        let previous = self.state.swap(Self::UNLOCKED, Ordering::Release);
        debug_assert_ne!(previous, Self::UNLOCKED, "unlock of an unlocked MutualExclusionLock");
        if previous == Self::CONTENDED {
            wake_one_u32(&self.state);
        }
    }

    /// Returns `true` if some thread currently holds the lock.
    ///
    /// The answer may be stale by the time it is observed.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != Self::UNLOCKED
    }

    /// Acquires the lock and returns a guard that releases it on drop.
    #[inline]
    pub fn guard(&self) -> MutualExclusionGuard<'_> {
        self.lock();
        MutualExclusionGuard { lock: self }
    }

    /// Acquires the lock without blocking, returning a guard on success.
    #[inline]
    pub fn try_guard(&self) -> Option<MutualExclusionGuard<'_>> {
        self.try_lock().then_some(MutualExclusionGuard { lock: self })
    }

    /// Runs `body` while holding the lock.
    ///
    /// The lock is released on every exit path, including a panic unwinding
    /// out of `body`. Fallible bodies return their `Result` through unchanged.
    #[inline]
    pub fn around<R>(&self, body: impl FnOnce() -> R) -> R {
        let _guard = self.guard();
        body()
    }
}

impl Default for MutualExclusionLock {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for MutualExclusionLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MutualExclusionLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Releases a [`MutualExclusionLock`] when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct MutualExclusionGuard<'a> {
    lock: &'a MutualExclusionLock,
}

impl Drop for MutualExclusionGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: a guard only exists while its lock is held.
        unsafe { self.lock.unlock() };
    }
}
