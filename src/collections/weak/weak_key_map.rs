//! `WeakKeyMap`: weak keys, strong values.

use core::fmt;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use super::{prune_with, take_dead, Shared, WeakBox};
use crate::concurrency::sync::ExclusiveGuardedCell;
use crate::lifecycle::{
    IdentityKey, LifecycleRegistry, RegistrationGuard, RegistrationToken, Tracked,
};

struct KeyEntry<K, V> {
    key: WeakBox<K>,
    value: V,
    _hook: RegistrationGuard,
}

type Entries<K, V> = HashMap<IdentityKey, KeyEntry<K, V>>;

/// A map from [`Tracked`] keys, compared by identity, to owned values.
///
/// Keys are not kept alive. When a key's last strong handle is dropped its
/// entry is removed and the value dropped, on the releasing thread.
///
/// Typical use is attaching side data to objects the map does not own:
///
/// ```rust
/// use lifeline::{Tracked, WeakKeyMap};
///
/// let mut labels = WeakKeyMap::new();
/// let widget = Tracked::new(42_u32);
/// labels.insert(&widget, "answer");
/// assert_eq!(labels.get(&widget), Some("answer"));
///
/// drop(widget);
/// assert!(labels.is_empty());
/// ```
pub struct WeakKeyMap<K, V> {
    entries: Shared<Entries<K, V>>,
    token: RegistrationToken,
}

impl<K, V> WeakKeyMap<K, V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(ExclusiveGuardedCell::new(HashMap::with_capacity(capacity))),
            token: RegistrationToken::unique(),
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read(HashMap::len)
    }

    /// Returns `true` if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `key` has an entry.
    pub fn contains_key(&self, key: &Tracked<K>) -> bool {
        let identity = Tracked::identity(key);
        self.entries.read(|entries| entries.contains_key(&identity))
    }

    /// Returns `true` if a live key with the given identity has an entry.
    pub fn contains_identity(&self, identity: IdentityKey) -> bool {
        self.entries
            .read(|entries| entries.get(&identity).is_some_and(|e| e.key.is_live()))
    }

    /// Runs `f` on the value stored for `key` and returns its result.
    ///
    /// Works for any `V`. `f` runs while the internal lock is held, so it must
    /// not use this map or release objects watched by it.
    pub fn get_with<R>(&self, key: &Tracked<K>, f: impl FnOnce(&V) -> R) -> Option<R> {
        let identity = Tracked::identity(key);
        self.entries
            .read(|entries| entries.get(&identity).map(|e| f(&e.value)))
    }

    /// Strong handles to every live key.
    pub fn keys(&self) -> Vec<Tracked<K>> {
        self.entries
            .read(|entries| entries.values().filter_map(|e| e.key.get()).collect())
    }

    /// Removes the entry for `key`, cancelling its prune registration, and
    /// returns its value.
    pub fn remove(&mut self, key: &Tracked<K>) -> Option<V> {
        let identity = Tracked::identity(key);
        let entry = self.entries.write(|entries| entries.remove(&identity))?;
        Some(entry.value)
    }

    /// Removes every entry. Values are dropped after the internal lock is
    /// released.
    pub fn clear(&mut self) {
        let removed = self.entries.write(core::mem::take);
        drop(removed);
    }
}

impl<K, V: Clone> WeakKeyMap<K, V> {
    /// A clone of the value stored for `key`.
    pub fn get(&self, key: &Tracked<K>) -> Option<V> {
        let identity = Tracked::identity(key);
        self.entries
            .read(|entries| entries.get(&identity).map(|e| e.value.clone()))
    }

    /// Snapshot of every entry whose key is still alive.
    pub fn entries(&self) -> Vec<(Tracked<K>, V)> {
        self.entries.read(|entries| {
            entries
                .values()
                .filter_map(|e| Some((e.key.get()?, e.value.clone())))
                .collect()
        })
    }

    /// Clones of the values of every entry whose key is still alive.
    pub fn values(&self) -> Vec<V> {
        self.entries.read(|entries| {
            entries
                .values()
                .filter(|e| e.key.is_live())
                .map(|e| e.value.clone())
                .collect()
        })
    }

    /// Calls `f` for each entry of a snapshot, skipping keys that were
    /// released before the snapshot was taken.
    ///
    /// `f` runs without the internal lock held and may use the map.
    pub fn for_each(&self, mut f: impl FnMut(&Tracked<K>, &V)) {
        for (key, value) in self.entries() {
            f(&key, &value);
        }
    }
}

impl<K: Send + Sync + 'static, V: Send + 'static> WeakKeyMap<K, V> {
    /// Stores `value` for `key` and returns the previous value.
    ///
    /// The first insertion for a key registers its prune callback; later
    /// insertions replace the value and keep the registration.
    pub fn insert(&mut self, key: &Tracked<K>, value: V) -> Option<V> {
        let identity = Tracked::identity(key);
        self.entries.write(|entries| match entries.entry(identity) {
            Entry::Occupied(mut slot) => Some(core::mem::replace(&mut slot.get_mut().value, value)),
            Entry::Vacant(slot) => {
                slot.insert(KeyEntry {
                    key: WeakBox::new(key),
                    value,
                    _hook: self.watch(key),
                });
                None
            }
        })
    }

    /// Subscript-style assignment: `Some` stores, `None` removes.
    pub fn set(&mut self, key: &Tracked<K>, value: Option<V>) {
        match value {
            Some(value) => drop(self.insert(key, value)),
            None => drop(self.remove(key)),
        }
    }

    fn watch(&self, key: &Tracked<K>) -> RegistrationGuard {
        let identity = Tracked::identity(key);
        let prune = prune_with(&self.entries, move |entries: &mut Entries<K, V>| {
            let pruned = take_dead(entries, identity, |e| e.key.is_live());
            if pruned.is_some() {
                trace_event!(%identity, "weak key map entry pruned");
            }
            pruned
        });
        LifecycleRegistry::global()
            .register(key, self.token, prune)
            .into_guard()
    }
}

impl<K, V> Default for WeakKeyMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug + Clone> fmt::Debug for WeakKeyMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries();
        f.debug_map()
            .entries(entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}
