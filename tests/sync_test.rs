use lifeline::{ExclusiveGuardedCell, MutualExclusionLock, ReadWriteGuardedCell, ReaderWriterLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_thousand_writers_increment_exactly_once() {
    let cell = ExclusiveGuardedCell::new(0_u64);

    thread::scope(|s| {
        for _ in 0..1000 {
            s.spawn(|| cell.write(|n| *n += 1));
        }
    });

    assert_eq!(cell.into_inner(), 1000);
}

#[test]
fn test_read_write_cell_readers_run_together() {
    const READERS: usize = 4;
    let cell = ReadWriteGuardedCell::new(vec![1, 2, 3]);
    // Every reader waits for all the others while holding the read lock, so
    // this only finishes if reads really are shared.
    let barrier = Barrier::new(READERS);

    thread::scope(|s| {
        for _ in 0..READERS {
            s.spawn(|| {
                cell.read(|v| {
                    barrier.wait();
                    assert_eq!(v.len(), 3);
                });
            });
        }
    });
}

#[test]
fn test_read_write_cell_try_write_fails_under_read() {
    let cell = ReadWriteGuardedCell::new(String::from("a"));
    cell.read(|_| {
        assert!(cell.try_write(|s| s.push('b')).is_none());
        assert_eq!(cell.try_read(String::len), Some(1));
    });
    assert!(cell.try_write(|s| s.push('b')).is_some());
    assert_eq!(cell.get(), "ab");
}

#[test]
fn test_read_write_cell_writers_are_exclusive() {
    let cell = Arc::new(ReadWriteGuardedCell::new((0_u64, 0_u64)));

    thread::scope(|s| {
        for _ in 0..4 {
            let cell = Arc::clone(&cell);
            s.spawn(move || {
                for _ in 0..500 {
                    cell.write(|(a, b)| {
                        *a += 1;
                        *b += 1;
                    });
                }
            });
        }
        for _ in 0..4 {
            let cell = Arc::clone(&cell);
            s.spawn(move || {
                for _ in 0..500 {
                    cell.read(|(a, b)| assert_eq!(a, b));
                }
            });
        }
    });

    assert_eq!(cell.get(), (2000, 2000));
}

#[test]
fn test_mutex_contention() {
    let lock = MutualExclusionLock::new();
    let inside = AtomicUsize::new(0);
    let total = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..200 {
                    lock.around(|| {
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        total.fetch_add(1, Ordering::Relaxed);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            });
        }
    });

    assert_eq!(total.load(Ordering::Relaxed), 1600);
    assert!(!lock.is_locked());
}

#[test]
fn test_mutex_around_releases_on_error() {
    let lock = MutualExclusionLock::new();
    let result: Result<(), &str> = lock.around(|| Err("failed"));
    assert!(result.is_err());
    assert!(lock.try_lock());
    unsafe { lock.unlock() };
}

#[test]
fn test_blocked_writer_eventually_acquires() {
    let lock = Arc::new(ReaderWriterLock::new());
    let read = lock.read();

    let writer = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            let _write = lock.write();
            assert_eq!(lock.reader_count(), 0);
        })
    };

    thread::sleep(Duration::from_millis(20));
    assert!(!writer.is_finished());
    drop(read);
    writer.join().unwrap();
    assert!(!lock.is_write_locked());
}
