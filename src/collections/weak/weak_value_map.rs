//! `WeakValueMap`: strong keys, weak values.

use core::fmt;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use super::{detach, prune_with, Shared, WeakBox, Watcher};
use crate::concurrency::sync::ExclusiveGuardedCell;
use crate::lifecycle::{
    IdentityKey, LifecycleRegistry, RegistrationGuard, RegistrationToken, Tracked,
};

struct ValueTable<K, V> {
    entries: HashMap<K, WeakBox<V>>,
    /// One registration per distinct value object, with the keys mapping to it.
    watchers: HashMap<IdentityKey, Watcher<K>>,
}

impl<K, V> Default for ValueTable<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            watchers: HashMap::new(),
        }
    }
}

/// A map from owned keys to [`Tracked`] values that it does not keep alive.
///
/// One value object may be stored under several keys. When it is released,
/// every key referring to it is removed.
///
/// Keys are dropped while the map's internal lock is held; a key type whose
/// destructor releases objects watched by the same map would deadlock.
///
/// ```rust
/// use lifeline::{Tracked, WeakValueMap};
///
/// let mut cache = WeakValueMap::new();
/// let page = Tracked::new(vec![0_u8; 16]);
/// cache.insert("index", &page);
/// assert!(cache.get("index").is_some());
///
/// drop(page);
/// assert!(cache.get("index").is_none());
/// assert!(cache.is_empty());
/// ```
pub struct WeakValueMap<K, V> {
    table: Shared<ValueTable<K, V>>,
    token: RegistrationToken,
}

impl<K, V> WeakValueMap<K, V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let table = ValueTable {
            entries: HashMap::with_capacity(capacity),
            watchers: HashMap::with_capacity(capacity),
        };
        Self {
            table: Arc::new(ExclusiveGuardedCell::new(table)),
            token: RegistrationToken::unique(),
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

    /// Removes every entry and cancels every registration.
    pub fn clear(&mut self) {
        let removed = self.table.write(core::mem::take);
        drop(removed);
    }
}

impl<K: Eq + Hash, V> WeakValueMap<K, V> {
    /// The value stored under `key`, if it is still alive.
    pub fn get<Q>(&self, key: &Q) -> Option<Tracked<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table
            .read(|table| table.entries.get(key).and_then(WeakBox::get))
    }

    /// Returns `true` if `key` maps to a live value.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table
            .read(|table| table.entries.get(key).is_some_and(WeakBox::is_live))
    }

    /// Removes `key` and returns its value if it is still alive. The value's
    /// registration is cancelled once no other key refers to it.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<Tracked<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (_key, value, retired) = self.table.write(|table| {
            let (key, value) = table.entries.remove_entry(key)?;
            let retired = detach(&mut table.watchers, value.identity(), &key);
            Some((key, value, retired))
        })?;
        drop(retired);
        value.get()
    }

    /// Strong handles to every live value, one per key.
    pub fn values(&self) -> Vec<Tracked<V>> {
        self.table
            .read(|table| table.entries.values().filter_map(WeakBox::get).collect())
    }
}

impl<K: Eq + Hash + Clone, V> WeakValueMap<K, V> {
    /// Snapshot of every entry whose value is still alive.
    pub fn entries(&self) -> Vec<(K, Tracked<V>)> {
        self.table.read(|table| {
            table
                .entries
                .iter()
                .filter_map(|(k, v)| v.get().map(|v| (k.clone(), v)))
                .collect()
        })
    }

    /// Keys whose value is still alive.
    pub fn keys(&self) -> Vec<K> {
        self.table.read(|table| {
            table
                .entries
                .iter()
                .filter(|(_, v)| v.is_live())
                .map(|(k, _)| k.clone())
                .collect()
        })
    }

    /// Calls `f` for each entry of a snapshot, skipping values released before
    /// the snapshot was taken. `f` runs without the internal lock held.
    pub fn for_each(&self, mut f: impl FnMut(&K, &Tracked<V>)) {
        for (key, value) in self.entries() {
            f(&key, &value);
        }
    }
}

impl<K, V> WeakValueMap<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + Sync + 'static,
{
    /// Stores a weak reference to `value` under `key` and returns the previous
    /// value if it is still alive.
    pub fn insert(&mut self, key: K, value: &Tracked<V>) -> Option<Tracked<V>> {
        let identity = Tracked::identity(value);
        let (previous, retired) = self.table.write(|table| {
            let previous = table.entries.insert(key.clone(), WeakBox::new(value));
            let retired = match &previous {
                Some(old) if old.identity() != identity => {
                    detach(&mut table.watchers, old.identity(), &key)
                }
                _ => None,
            };
            table
                .watchers
                .entry(identity)
                .or_insert_with(|| Watcher::new(self.watch(value)))
                .keys
                .insert(key);
            (previous, retired)
        });
        drop(retired);
        previous.and_then(|old| old.get())
    }

    /// Subscript-style assignment: `Some` stores, `None` removes.
    pub fn set(&mut self, key: K, value: Option<&Tracked<V>>) {
        match value {
            Some(value) => drop(self.insert(key, value)),
            None => drop(self.remove(&key)),
        }
    }

    fn watch(&self, value: &Tracked<V>) -> RegistrationGuard {
        let identity = Tracked::identity(value);
        let prune = prune_with(&self.table, move |table: &mut ValueTable<K, V>| {
            let watcher = table.watchers.remove(&identity)?;
            let pruned: Vec<(K, WeakBox<V>)> = watcher
                .keys
                .iter()
                .filter_map(|key| table.entries.remove_entry(key))
                .collect();
            trace_event!(%identity, keys = pruned.len(), "weak value map entries pruned");
            Some((watcher, pruned))
        });
        LifecycleRegistry::global()
            .register(value, self.token, prune)
            .into_guard()
    }
}

impl<K, V> Default for WeakValueMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for WeakValueMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries();
        f.debug_map()
            .entries(entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_value_prunes_every_key() {
        let mut map = WeakValueMap::new();
        let v = Tracked::new(9_u64);
        map.insert("a", &v);
        map.insert("b", &v);
        map.insert("c", &v);
        assert_eq!(map.len(), 3);
        drop(v);
        assert!(map.is_empty());
    }

    #[test]
    fn replacing_value_detaches_old_watcher() {
        let mut map = WeakValueMap::new();
        let first = Tracked::new(1_u8);
        let second = Tracked::new(2_u8);

        map.insert(1, &first);
        let previous = map.insert(1, &second);
        assert!(previous.is_some_and(|p| Tracked::ptr_eq(&p, &first)));

        // Releasing the old value no longer affects key 1.
        drop(first);
        assert_eq!(map.get(&1).map(|v| *v), Some(2));
        drop(second);
        assert!(map.get(&1).is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn remove_keeps_other_keys_watched() {
        let mut map = WeakValueMap::new();
        let v = Tracked::new("shared");
        map.insert(String::from("x"), &v);
        map.insert(String::from("y"), &v);

        assert!(map.remove("x").is_some());
        assert!(map.remove("x").is_none());
        assert!(map.contains_key("y"));
        drop(v);
        assert!(!map.contains_key("y"));
        assert!(map.is_empty());
    }

    #[test]
    fn with_capacity_starts_empty_and_prunes() {
        let mut map = WeakValueMap::with_capacity(16);
        assert!(map.is_empty());
        let v = Tracked::new('v');
        map.insert(1_u8, &v);
        assert_eq!(map.len(), 1);
        drop(v);
        assert!(map.is_empty());
    }

    #[test]
    fn set_none_removes() {
        let mut map = WeakValueMap::new();
        let v = Tracked::new(0.5_f32);
        map.set(7, Some(&v));
        assert_eq!(map.keys(), vec![7]);
        map.set(7, None);
        assert!(map.is_empty());
    }
}
