//! Self-pruning weak collections.
//!
//! Every collection keeps its entries behind one [`ExclusiveGuardedCell`]
//! shared with the prune callbacks it registers on the
//! [`LifecycleRegistry`](crate::lifecycle::LifecycleRegistry). When a watched
//! object is released, its callback removes the affected entries right away,
//! on the releasing thread.
//!
//! The collections are not meant to be mutated from several threads at once:
//! mutation takes `&mut self`, and shared access across threads goes through
//! an outer [`ExclusiveGuardedCell`] or
//! [`ReadWriteGuardedCell`](crate::concurrency::sync::ReadWriteGuardedCell).
//! The inner lock only serialises the owner against prune callbacks.
//! `len`, `contains` and snapshots taken while another thread is releasing a
//! watched object may or may not reflect that release yet.
//!
//! # Invariants
//! - One registration per watched object per collection (per side for
//!   [`WeakPairMap`]).
//! - Removed entries, and the registration guards they own, are dropped only
//!   after the inner lock is released; callbacks never run under it.
//! - Lock order is inner lock, then registry lock.

pub mod weak_box;
pub mod weak_key_map;
pub mod weak_pair_map;
pub mod weak_set;
pub mod weak_value_map;

pub use weak_box::WeakBox;
pub use weak_key_map::WeakKeyMap;
pub use weak_pair_map::WeakPairMap;
pub use weak_set::{Snapshot, WeakSet};
pub use weak_value_map::WeakValueMap;

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use crate::concurrency::sync::ExclusiveGuardedCell;
use crate::lifecycle::{IdentityKey, RegistrationGuard};

/// Entry storage shared between a collection and its prune callbacks.
type Shared<S> = Arc<ExclusiveGuardedCell<S>>;

/// Builds a prune callback that edits `table` under its lock.
///
/// Whatever `prune` returns is dropped after the lock is released, so removed
/// entries may own strong handles or registration guards. The callback holds
/// the table weakly and does nothing once the collection is gone.
fn prune_with<S, R>(
    table: &Shared<S>,
    prune: impl FnOnce(&mut S) -> R + Send + 'static,
) -> impl FnOnce() + Send + 'static
where
    S: Send + 'static,
    R: 'static,
{
    let table = Arc::downgrade(table);
    move || {
        if let Some(table) = table.upgrade() {
            let retired = table.write(prune);
            drop(retired);
        }
    }
}

/// Removes `identity` from `map` if its entry no longer resolves.
///
/// A prune callback only ever sees its own object dead, but checking keeps a
/// late callback from evicting a live entry.
fn take_dead<E>(
    map: &mut HashMap<IdentityKey, E>,
    identity: IdentityKey,
    is_live: impl FnOnce(&E) -> bool,
) -> Option<E> {
    if map.get(&identity).is_some_and(|entry| !is_live(entry)) {
        map.remove(&identity)
    } else {
        None
    }
}

/// The registration watching one weakly held value, plus the keys whose
/// entries point at it.
struct Watcher<K> {
    keys: HashSet<K>,
    _hook: RegistrationGuard,
}

impl<K: Eq + Hash> Watcher<K> {
    fn new(hook: RegistrationGuard) -> Self {
        Self {
            keys: HashSet::new(),
            _hook: hook,
        }
    }
}

/// Unlinks `key` from the watcher of `value`; returns the watcher once no key
/// refers to the value any more, so the caller can drop it (and cancel its
/// registration) outside the lock.
fn detach<K: Eq + Hash>(
    watchers: &mut HashMap<IdentityKey, Watcher<K>>,
    value: IdentityKey,
    key: &K,
) -> Option<Watcher<K>> {
    let watcher = watchers.get_mut(&value)?;
    watcher.keys.remove(key);
    if watcher.keys.is_empty() {
        watchers.remove(&value)
    } else {
        None
    }
}
