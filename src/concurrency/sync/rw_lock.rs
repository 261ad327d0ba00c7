//! A writer-preferring reader/writer lock.
//!
//! All state lives in one 32-bit word so that every transition is visible to
//! the address-wait primitive:
//!
//! ```text
//!  31        30          29..16             15..0
//! [HELD] [READERS_PARKED] [writers waiting] [readers]
//! ```
//!
//! New readers stay out while a writer holds the lock or waits for it, so a
//! steady stream of readers cannot starve writers.

use core::sync::atomic::{AtomicU32, Ordering};
use crossbeam_utils::Backoff;

use super::{wait_on_u32, wake_all_u32};

const READ_MASK: u32 = (1 << 16) - 1;
const WRITER_WAITING: u32 = 1 << 16;
const WAIT_MASK: u32 = ((1 << 14) - 1) << 16;
const READERS_PARKED: u32 = 1 << 30;
const WRITE_HELD: u32 = 1 << 31;

#[inline]
fn readable(state: u32) -> bool {
    state & (WRITE_HELD | WAIT_MASK) == 0 && state & READ_MASK < READ_MASK
}

#[inline]
fn writable(state: u32) -> bool {
    state & (WRITE_HELD | READ_MASK) == 0
}

/// A non-reentrant lock admitting many readers or one writer.
///
/// Up to 65534 readers may hold the lock at once; further readers wait. At
/// most 16383 writers park at a time; writers beyond that spin with
/// `yield_now` until the lock is free.
pub struct ReaderWriterLock {
    state: AtomicU32,
}

impl ReaderWriterLock {
    /// Creates an unlocked lock.
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
        }
    }

    /// Acquires shared access, blocking while a writer holds or awaits the lock.
    #[inline]
    pub fn read(&self) -> ReadGuard<'_> {
        if !self.try_acquire_read() {
            self.read_contended();
        }
        ReadGuard { lock: self }
    }

    /// Acquires shared access without blocking.
    #[inline]
    pub fn try_read(&self) -> Option<ReadGuard<'_>> {
        self.try_acquire_read().then_some(ReadGuard { lock: self })
    }

    /// Acquires exclusive access, blocking until all readers and writers leave.
    #[inline]
    pub fn write(&self) -> WriteGuard<'_> {
        if self
            .state
            .compare_exchange(0, WRITE_HELD, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.write_contended();
        }
        WriteGuard { lock: self }
    }

    /// Acquires exclusive access without blocking.
    #[inline]
    pub fn try_write(&self) -> Option<WriteGuard<'_>> {
        let mut state = self.state.load(Ordering::Relaxed);
        while writable(state) {
            match self.state.compare_exchange_weak(
                state,
                state | WRITE_HELD,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(WriteGuard { lock: self }),
                Err(current) => state = current,
            }
        }
        None
    }

    /// Returns `true` if a writer currently holds the lock.
    #[inline]
    pub fn is_write_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) & WRITE_HELD != 0
    }

    /// Returns the number of readers currently holding the lock.
    #[inline]
    pub fn reader_count(&self) -> usize {
        (self.state.load(Ordering::Relaxed) & READ_MASK) as usize
    }

    fn try_acquire_read(&self) -> bool {
        let mut state = self.state.load(Ordering::Relaxed);
        while readable(state) {
            match self.state.compare_exchange_weak(
                state,
                state + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(current) => state = current,
            }
        }
        false
    }

    #[cold]
    fn read_contended(&self) {
        let backoff = Backoff::new();
        loop {
            let state = self.state.load(Ordering::Relaxed);
            if readable(state) {
                if self
                    .state
                    .compare_exchange_weak(state, state + 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return;
                }
                continue;
            }
            if !backoff.is_completed() {
                backoff.snooze();
                continue;
            }
            if state & READERS_PARKED == 0
                && self
                    .state
                    .compare_exchange(
                        state,
                        state | READERS_PARKED,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    )
                    .is_err()
            {
                continue;
            }
            wait_on_u32(&self.state, state | READERS_PARKED);
        }
    }

    #[cold]
    fn write_contended(&self) {
        let backoff = Backoff::new();
        while !backoff.is_completed() {
            if self.try_acquire_write() {
                return;
            }
            backoff.snooze();
        }

        // Announce before parking. A saturated count leaves further writers
        // unannounced: they yield instead of parking, and the announced ones
        // already hold new readers back.
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            if writable(state) {
                match self.state.compare_exchange_weak(
                    state,
                    state | WRITE_HELD,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return,
                    Err(current) => state = current,
                }
                continue;
            }
            if state & WAIT_MASK == WAIT_MASK {
                std::thread::yield_now();
                state = self.state.load(Ordering::Relaxed);
                continue;
            }
            match self.state.compare_exchange_weak(
                state,
                state + WRITER_WAITING,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => state = current,
            }
        }

        loop {
            let state = self.state.load(Ordering::Relaxed);
            if writable(state) {
                if self
                    .state
                    .compare_exchange_weak(
                        state,
                        (state - WRITER_WAITING) | WRITE_HELD,
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    return;
                }
                continue;
            }
            wait_on_u32(&self.state, state);
        }
    }

    fn try_acquire_write(&self) -> bool {
        let state = self.state.load(Ordering::Relaxed);
        writable(state)
            && self
                .state
                .compare_exchange_weak(
                    state,
                    state | WRITE_HELD,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok()
    }

    fn read_unlock(&self) {
        let previous = self.state.fetch_sub(1, Ordering::Release);
        debug_assert_ne!(previous & READ_MASK, 0, "read unlock without a reader");
        let readers = previous & READ_MASK;
        if (readers == 1 && previous & WAIT_MASK != 0) || readers == READ_MASK {
            wake_all_u32(&self.state);
        }
    }

    fn write_unlock(&self) {
        let previous = self
            .state
            .fetch_and(!(WRITE_HELD | READERS_PARKED), Ordering::Release);
        debug_assert_ne!(previous & WRITE_HELD, 0, "write unlock without a writer");
        if previous & (WAIT_MASK | READERS_PARKED) != 0 {
            wake_all_u32(&self.state);
        }
    }
}

impl Default for ReaderWriterLock {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ReaderWriterLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReaderWriterLock")
            .field("readers", &self.reader_count())
            .field("write_locked", &self.is_write_locked())
            .finish()
    }
}

/// Shared access to a [`ReaderWriterLock`], released on drop.
#[must_use = "the read lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    lock: &'a ReaderWriterLock,
}

impl Drop for ReadGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.read_unlock();
    }
}

/// Exclusive access to a [`ReaderWriterLock`], released on drop.
#[must_use = "the write lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: &'a ReaderWriterLock,
}

impl Drop for WriteGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.write_unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn saturated_writer_count_does_not_carry() {
        // Every waiting-writer slot taken and one reader inside.
        let lock = ReaderWriterLock {
            state: AtomicU32::new(WAIT_MASK | 1),
        };

        thread::scope(|s| {
            let writer = s.spawn(|| {
                let _write = lock.write();
                assert!(lock.is_write_locked());
            });
            thread::sleep(Duration::from_millis(20));
            assert_eq!(lock.state.load(Ordering::Relaxed), WAIT_MASK | 1);
            lock.read_unlock();
            writer.join().unwrap();
        });

        assert_eq!(lock.state.load(Ordering::Relaxed), WAIT_MASK);
    }
}
