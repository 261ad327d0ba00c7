//! Blocking locks and the cells built on them.
//!
//! Both locks spin briefly with [`crossbeam_utils::Backoff`] and then park on
//! the operating system's address-wait primitive: `futex` on Linux,
//! `WaitOnAddress` on Windows. Other targets fall back to a yielding spin.

pub mod guarded;
pub mod mutex;
pub mod rw_lock;

pub use guarded::{ExclusiveGuardedCell, ReadWriteGuardedCell};
pub use mutex::{MutualExclusionGuard, MutualExclusionLock};
pub use rw_lock::{ReadGuard, ReaderWriterLock, WriteGuard};

use core::sync::atomic::AtomicU32;
#[cfg(not(windows))]
use core::sync::atomic::Ordering;

#[cfg(windows)]
use windows_sys::Win32::System::Threading::{
    WaitOnAddress, WakeByAddressAll, WakeByAddressSingle, INFINITE,
};

#[cfg(target_os = "linux")]
use libc::{SYS_futex, FUTEX_PRIVATE_FLAG, FUTEX_WAIT, FUTEX_WAKE};

#[cfg(target_os = "linux")]
#[inline]
fn futex_wait(addr: &AtomicU32, expected: u32) {
    // Spurious returns (EINTR, EAGAIN) are fine: every caller re-checks state.
    unsafe {
        libc::syscall(
            SYS_futex,
            addr.as_ptr(),
            FUTEX_WAIT | FUTEX_PRIVATE_FLAG,
            expected,
            core::ptr::null::<libc::timespec>(),
        );
    }
}

#[cfg(target_os = "linux")]
#[inline]
fn futex_wake(addr: &AtomicU32, count: i32) {
    unsafe {
        libc::syscall(SYS_futex, addr.as_ptr(), FUTEX_WAKE | FUTEX_PRIVATE_FLAG, count);
    }
}

/// Wakes all threads waiting on the given address.
#[inline]
pub fn wake_all_u32(addr: &AtomicU32) {
    #[cfg(windows)]
    unsafe {
        WakeByAddressAll(addr.as_ptr().cast());
    }
    #[cfg(target_os = "linux")]
    {
        futex_wake(addr, i32::MAX);
    }
    #[cfg(not(any(windows, target_os = "linux")))]
    {
        let _ = addr;
    }
}

/// Wakes one thread waiting on the given address.
#[inline]
pub fn wake_one_u32(addr: &AtomicU32) {
    #[cfg(windows)]
    unsafe {
        WakeByAddressSingle(addr.as_ptr().cast());
    }
    #[cfg(target_os = "linux")]
    {
        futex_wake(addr, 1);
    }
    #[cfg(not(any(windows, target_os = "linux")))]
    {
        let _ = addr;
    }
}

/// Blocks while the value at `addr` equals `expected`.
///
/// May return spuriously; callers loop on their own condition.
#[inline]
pub fn wait_on_u32(addr: &AtomicU32, expected: u32) {
    #[cfg(windows)]
    unsafe {
        let expected_ptr: *const u32 = &expected;
        WaitOnAddress(
            addr.as_ptr().cast(),
            expected_ptr.cast(),
            core::mem::size_of::<u32>(),
            INFINITE,
        );
    }
    #[cfg(target_os = "linux")]
    {
        if addr.load(Ordering::Relaxed) == expected {
            futex_wait(addr, expected);
        }
    }
    #[cfg(not(any(windows, target_os = "linux")))]
    {
        if addr.load(Ordering::Relaxed) == expected {
            std::thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests;
