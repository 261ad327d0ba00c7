use super::*;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_wait_on_u32_wake() {
    let flag = Arc::new(AtomicU32::new(0));
    let barrier = Arc::new(Barrier::new(2));
    let flag_thread = flag.clone();
    let barrier_thread = barrier.clone();

    let handle = thread::spawn(move || {
        barrier_thread.wait();
        while flag_thread.load(Ordering::SeqCst) == 0 {
            wait_on_u32(&flag_thread, 0);
        }
        flag_thread.load(Ordering::SeqCst)
    });

    barrier.wait();
    flag.store(1, Ordering::SeqCst);
    wake_all_u32(&flag);

    let value = handle.join().unwrap();
    assert_eq!(value, 1);
}

#[test]
fn test_mutex_try_lock_while_held() {
    let lock = MutualExclusionLock::new();
    lock.lock();
    assert!(lock.is_locked());
    assert!(!lock.try_lock());
    unsafe { lock.unlock() };
    assert!(!lock.is_locked());
    assert!(lock.try_lock());
    unsafe { lock.unlock() };
}

#[test]
fn test_mutex_around_releases_on_error() {
    let lock = MutualExclusionLock::new();
    let result: Result<(), &str> = lock.around(|| Err("boom"));
    assert_eq!(result, Err("boom"));
    assert!(!lock.is_locked());
}

#[test]
fn test_mutex_around_releases_on_panic() {
    let lock = MutualExclusionLock::new();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        lock.around(|| panic!("inside critical section"));
    }));
    assert!(outcome.is_err());
    assert!(lock.try_lock());
    unsafe { lock.unlock() };
}

#[test]
fn test_mutex_contention_parks_and_wakes() {
    let lock = MutualExclusionLock::new();
    let inside = AtomicBool::new(false);
    let lock = &lock;
    let inside = &inside;

    thread::scope(|s| {
        let guard = lock.guard();
        s.spawn(move || {
            // Blocks until the main thread drops its guard.
            lock.around(|| inside.store(true, Ordering::SeqCst));
        });
        thread::sleep(Duration::from_millis(50));
        assert!(!inside.load(Ordering::SeqCst));
        drop(guard);
    });

    assert!(inside.load(Ordering::SeqCst));
}

#[test]
fn test_mutex_mutual_exclusion() {
    let lock = MutualExclusionLock::new();
    let occupancy = AtomicUsize::new(0);
    let lock = &lock;
    let occupancy = &occupancy;

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(move || {
                for _ in 0..500 {
                    lock.around(|| {
                        assert_eq!(occupancy.fetch_add(1, Ordering::SeqCst), 0);
                        std::hint::spin_loop();
                        occupancy.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            });
        }
    });
}

#[test]
fn test_rw_lock_readers_share() {
    let lock = ReaderWriterLock::new();
    let first = lock.read();
    let second = lock.try_read().expect("second reader admitted");
    assert_eq!(lock.reader_count(), 2);
    assert!(lock.try_write().is_none());
    drop(first);
    drop(second);
    assert_eq!(lock.reader_count(), 0);
    assert!(lock.try_write().is_some());
}

#[test]
fn test_rw_lock_writer_excludes() {
    let lock = ReaderWriterLock::new();
    let writer = lock.write();
    assert!(lock.is_write_locked());
    assert!(lock.try_read().is_none());
    assert!(lock.try_write().is_none());
    drop(writer);
    assert!(lock.try_read().is_some());
}

#[test]
fn test_rw_lock_blocked_writer_holds_back_new_readers() {
    let lock = ReaderWriterLock::new();
    let lock = &lock;
    let acquired = AtomicBool::new(false);
    let acquired = &acquired;

    thread::scope(|s| {
        let reader = lock.read();
        s.spawn(move || {
            let _writer = lock.write();
            acquired.store(true, Ordering::SeqCst);
        });

        // Wait until the writer has announced itself.
        while lock.try_read().is_some() {
            thread::yield_now();
        }
        assert!(!acquired.load(Ordering::SeqCst));
        drop(reader);
    });

    assert!(acquired.load(Ordering::SeqCst));
    assert!(lock.try_read().is_some());
}

#[test]
fn test_rw_lock_mixed_stress() {
    let lock = ReaderWriterLock::new();
    let writers_inside = AtomicUsize::new(0);
    let readers_inside = AtomicUsize::new(0);
    let lock = &lock;
    let writers_inside = &writers_inside;
    let readers_inside = &readers_inside;

    thread::scope(|s| {
        for i in 0..8 {
            s.spawn(move || {
                for _ in 0..300 {
                    if i % 4 == 0 {
                        let _w = lock.write();
                        assert_eq!(writers_inside.fetch_add(1, Ordering::SeqCst), 0);
                        assert_eq!(readers_inside.load(Ordering::SeqCst), 0);
                        writers_inside.fetch_sub(1, Ordering::SeqCst);
                    } else {
                        let _r = lock.read();
                        readers_inside.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(writers_inside.load(Ordering::SeqCst), 0);
                        readers_inside.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            });
        }
    });
}
