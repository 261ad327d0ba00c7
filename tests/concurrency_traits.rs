use lifeline::{
    ExclusiveGuardedCell, IdentityKey, LifecycleRegistry, MutualExclusionLock, ReadWriteGuardedCell,
    ReaderWriterLock, RegistrationGuard, RegistrationHandle, Tracked, TrackedWeak, WeakBox,
    WeakKeyMap, WeakPairMap, WeakSet, WeakValueMap,
};
use std::cell::Cell;

fn assert_send<T: Send>() {}
fn assert_sync<T: Sync>() {}

#[test]
fn locks_and_cells_are_send_and_sync() {
    assert_send::<MutualExclusionLock>();
    assert_sync::<MutualExclusionLock>();
    assert_send::<ReaderWriterLock>();
    assert_sync::<ReaderWriterLock>();

    // A mutex-guarded cell makes a `Send` value shareable.
    assert_sync::<ExclusiveGuardedCell<Cell<u64>>>();
    assert_send::<ReadWriteGuardedCell<Vec<u8>>>();
    assert_sync::<ReadWriteGuardedCell<Vec<u8>>>();
}

#[test]
fn handles_follow_t_bounds() {
    assert_send::<Tracked<u64>>();
    assert_sync::<Tracked<u64>>();
    assert_send::<TrackedWeak<String>>();
    assert_sync::<TrackedWeak<String>>();
    assert_send::<WeakBox<u64>>();
    assert_send::<IdentityKey>();
    assert_sync::<LifecycleRegistry>();
    assert_send::<RegistrationHandle>();
    assert_send::<RegistrationGuard>();
}

#[test]
fn weak_collections_can_move_between_threads() {
    assert_send::<WeakSet<u64>>();
    assert_sync::<WeakSet<u64>>();
    assert_send::<WeakKeyMap<u64, String>>();
    assert_send::<WeakValueMap<String, u64>>();
    assert_send::<WeakPairMap<u64, u64>>();
}
