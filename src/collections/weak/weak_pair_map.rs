//! `WeakPairMap`: weak keys and weak values.
//!
//! Each entry is watched from both sides. The key side has one registration
//! per entry; the value side has one registration per distinct value object,
//! shared by every entry pointing at it. Whichever side ends first removes the
//! entry under the table lock; the other side then finds nothing to do. That
//! makes removal exactly-once however the two releases interleave across
//! threads.

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use super::{detach, prune_with, Shared, WeakBox, Watcher};
use crate::concurrency::sync::ExclusiveGuardedCell;
use crate::lifecycle::{
    IdentityKey, LifecycleRegistry, RegistrationGuard, RegistrationToken, Tracked,
};

struct PairEntry<K, V> {
    key: WeakBox<K>,
    value: WeakBox<V>,
    _hook: RegistrationGuard,
}

struct PairTable<K, V> {
    entries: HashMap<IdentityKey, PairEntry<K, V>>,
    watchers: HashMap<IdentityKey, Watcher<IdentityKey>>,
    pruned: u64,
}

impl<K, V> Default for PairTable<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            watchers: HashMap::new(),
            pruned: 0,
        }
    }
}

impl<K, V> PairTable<K, V> {
    fn unlink(
        &mut self,
        key: IdentityKey,
    ) -> Option<(PairEntry<K, V>, Option<Watcher<IdentityKey>>)> {
        let entry = self.entries.remove(&key)?;
        let retired = detach(&mut self.watchers, entry.value.identity(), &key);
        Some((entry, retired))
    }
}

/// A map whose keys and values are both [`Tracked`] objects held weakly.
///
/// An entry disappears when either its key or its value is released. The same
/// object may be a key and a value at once.
///
/// ```rust
/// use lifeline::{Tracked, WeakPairMap};
///
/// let mut owners = WeakPairMap::new();
/// let window = Tracked::new("window");
/// let controller = Tracked::new("controller");
/// owners.insert(&window, &controller);
/// assert_eq!(owners.len(), 1);
///
/// drop(controller);
/// assert!(owners.get(&window).is_none());
/// drop(window);
/// assert_eq!(owners.pruned_count(), 1);
/// ```
pub struct WeakPairMap<K, V> {
    table: Shared<PairTable<K, V>>,
    key_token: RegistrationToken,
    value_token: RegistrationToken,
}

impl<K, V> WeakPairMap<K, V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let table = PairTable {
            entries: HashMap::with_capacity(capacity),
            watchers: HashMap::with_capacity(capacity),
            pruned: 0,
        };
        Self {
            table: Arc::new(ExclusiveGuardedCell::new(table)),
            key_token: RegistrationToken::unique(),
            value_token: RegistrationToken::unique(),
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.table.read(|table| table.entries.len())
    }

    /// Returns `true` if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries removed because their key or value was released.
    pub fn pruned_count(&self) -> u64 {
        self.table.read(|table| table.pruned)
    }

    /// The value stored for `key`, if both are still alive.
    pub fn get(&self, key: &Tracked<K>) -> Option<Tracked<V>> {
        let identity = Tracked::identity(key);
        self.table
            .read(|table| table.entries.get(&identity).and_then(|e| e.value.get()))
    }

    /// Returns `true` if `key` maps to a live value.
    pub fn contains_key(&self, key: &Tracked<K>) -> bool {
        self.contains_identity(Tracked::identity(key))
    }

    /// Returns `true` if a live key with the given identity maps to a live value.
    pub fn contains_identity(&self, identity: IdentityKey) -> bool {
        self.table.read(|table| {
            table
                .entries
                .get(&identity)
                .is_some_and(|e| e.key.is_live() && e.value.is_live())
        })
    }

    /// Removes the entry for `key` and returns its value if still alive.
    pub fn remove(&mut self, key: &Tracked<K>) -> Option<Tracked<V>> {
        let identity = Tracked::identity(key);
        let (entry, retired) = self.table.write(|table| table.unlink(identity))?;
        drop(retired);
        entry.value.get()
    }

    /// Removes every entry and cancels every registration.
    pub fn clear(&mut self) {
        let removed = self.table.write(|table| {
            let pruned = table.pruned;
            core::mem::replace(
                table,
                PairTable {
                    pruned,
                    ..PairTable::default()
                },
            )
        });
        drop(removed);
    }

    /// Snapshot of every entry whose key and value are both alive.
    pub fn entries(&self) -> Vec<(Tracked<K>, Tracked<V>)> {
        // Half-resolved pairs are discarded only after the lock is released:
        // dropping a handle may end its object and run this map's callbacks.
        let resolved: Vec<(Option<Tracked<K>>, Option<Tracked<V>>)> = self.table.read(|table| {
            table
                .entries
                .values()
                .map(|e| (e.key.get(), e.value.get()))
                .collect()
        });
        resolved
            .into_iter()
            .filter_map(|(key, value)| Some((key?, value?)))
            .collect()
    }

    /// Live keys with a live value.
    pub fn keys(&self) -> Vec<Tracked<K>> {
        self.entries().into_iter().map(|(k, _)| k).collect()
    }

    /// Live values with a live key, one per entry.
    pub fn values(&self) -> Vec<Tracked<V>> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    /// Calls `f` for each entry of a snapshot, skipping entries with a side
    /// released before the snapshot was taken. `f` runs without the internal
    /// lock held.
    pub fn for_each(&self, mut f: impl FnMut(&Tracked<K>, &Tracked<V>)) {
        for (key, value) in self.entries() {
            f(&key, &value);
        }
    }
}

impl<K, V> WeakPairMap<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Maps `key` to `value` and returns the previous value if still alive.
    pub fn insert(&mut self, key: &Tracked<K>, value: &Tracked<V>) -> Option<Tracked<V>> {
        let key_id = Tracked::identity(key);
        let value_id = Tracked::identity(value);
        let (previous, retired) = self.table.write(|table| {
            let previous = match table.entries.get_mut(&key_id) {
                Some(entry) => Some(core::mem::replace(&mut entry.value, WeakBox::new(value))),
                None => {
                    table.entries.insert(
                        key_id,
                        PairEntry {
                            key: WeakBox::new(key),
                            value: WeakBox::new(value),
                            _hook: self.watch_key(key),
                        },
                    );
                    None
                }
            };
            let retired = match &previous {
                Some(old) if old.identity() != value_id => {
                    detach(&mut table.watchers, old.identity(), &key_id)
                }
                _ => None,
            };
            table
                .watchers
                .entry(value_id)
                .or_insert_with(|| Watcher::new(self.watch_value(value)))
                .keys
                .insert(key_id);
            (previous, retired)
        });
        drop(retired);
        previous.and_then(|old| old.get())
    }

    /// Subscript-style assignment: `Some` stores, `None` removes.
    pub fn set(&mut self, key: &Tracked<K>, value: Option<&Tracked<V>>) {
        match value {
            Some(value) => drop(self.insert(key, value)),
            None => drop(self.remove(key)),
        }
    }

    fn watch_key(&self, key: &Tracked<K>) -> RegistrationGuard {
        let identity = Tracked::identity(key);
        let prune = prune_with(&self.table, move |table: &mut PairTable<K, V>| {
            if !table.entries.get(&identity).is_some_and(|e| !e.key.is_live()) {
                return None;
            }
            table.pruned += 1;
            trace_event!(%identity, "weak pair map key released");
            table.unlink(identity)
        });
        LifecycleRegistry::global()
            .register(key, self.key_token, prune)
            .into_guard()
    }

    fn watch_value(&self, value: &Tracked<V>) -> RegistrationGuard {
        let identity = Tracked::identity(value);
        let prune = prune_with(&self.table, move |table: &mut PairTable<K, V>| {
            let watcher = table.watchers.remove(&identity)?;
            let pruned: Vec<PairEntry<K, V>> = watcher
                .keys
                .iter()
                .filter_map(|key| table.entries.remove(key))
                .collect();
            table.pruned += pruned.len() as u64;
            trace_event!(%identity, entries = pruned.len(), "weak pair map value released");
            Some((watcher, pruned))
        });
        LifecycleRegistry::global()
            .register(value, self.value_token, prune)
            .into_guard()
    }
}

impl<K, V> Default for WeakPairMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for WeakPairMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries();
        f.debug_map()
            .entries(entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}
