//! `WeakSet`: a set of objects held without owning them.

use core::fmt;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{prune_with, take_dead, Shared, WeakBox};
use crate::concurrency::sync::ExclusiveGuardedCell;
use crate::lifecycle::{
    IdentityKey, LifecycleRegistry, RegistrationGuard, RegistrationToken, Tracked,
};

struct Member<T> {
    object: WeakBox<T>,
    _hook: RegistrationGuard,
}

type Members<T> = HashMap<IdentityKey, Member<T>>;

/// A set of [`Tracked`] objects that does not keep them alive.
///
/// Membership is by identity: two distinct objects with equal values are two
/// members. A member disappears as soon as its last strong handle is dropped.
///
/// ```rust
/// use lifeline::{IdentityKey, Tracked, WeakSet};
///
/// let mut observers = WeakSet::new();
/// let a = Tracked::new("observer");
/// let id = IdentityKey::of(&a);
///
/// observers.insert(&a);
/// assert_eq!(observers.len(), 1);
///
/// drop(a);
/// assert_eq!(observers.len(), 0);
/// assert!(!observers.contains_identity(id));
/// ```
pub struct WeakSet<T> {
    members: Shared<Members<T>>,
    token: RegistrationToken,
}

impl<T> WeakSet<T> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty set with room for `capacity` members.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            members: Arc::new(ExclusiveGuardedCell::new(HashMap::with_capacity(capacity))),
            token: RegistrationToken::unique(),
        }
    }

    /// Number of members currently stored.
    pub fn len(&self) -> usize {
        self.members.read(HashMap::len)
    }

    /// Returns `true` if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `object` is a member.
    pub fn contains(&self, object: &Tracked<T>) -> bool {
        let identity = Tracked::identity(object);
        self.members.read(|members| members.contains_key(&identity))
    }

    /// Returns `true` if a live member has the given identity.
    ///
    /// Lets callers ask about an object they no longer hold.
    pub fn contains_identity(&self, identity: IdentityKey) -> bool {
        self.members.read(|members| {
            members
                .get(&identity)
                .is_some_and(|member| member.object.is_live())
        })
    }

    /// Strong handles to every live member, in no particular order.
    pub fn all_objects(&self) -> Vec<Tracked<T>> {
        self.members.read(|members| {
            members
                .values()
                .filter_map(|member| member.object.get())
                .collect()
        })
    }

    /// Iterates over a snapshot of the live members.
    ///
    /// The snapshot holds strong handles, so members it yields stay alive
    /// until the iterator (or the yielded handle) is dropped.
    pub fn iter(&self) -> Snapshot<T> {
        Snapshot {
            objects: self.all_objects().into_iter(),
        }
    }

    /// Removes `object`, cancelling its prune registration. Returns `true` if
    /// it was a member.
    pub fn remove(&mut self, object: &Tracked<T>) -> bool {
        let identity = Tracked::identity(object);
        let removed = self.members.write(|members| members.remove(&identity));
        removed.is_some()
    }

    /// Removes every member.
    pub fn clear(&mut self) {
        let removed = self.members.write(core::mem::take);
        drop(removed);
    }
}

impl<T: Send + Sync + 'static> WeakSet<T> {
    /// Adds `object`. Returns `false` if it was already a member.
    pub fn insert(&mut self, object: &Tracked<T>) -> bool {
        let identity = Tracked::identity(object);
        self.members.write(|members| match members.entry(identity) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(self.member(object));
                true
            }
        })
    }

    /// Builds a member for `object` and registers its prune callback.
    fn member(&self, object: &Tracked<T>) -> Member<T> {
        let identity = Tracked::identity(object);
        let prune = prune_with(&self.members, move |members: &mut Members<T>| {
            let pruned = take_dead(members, identity, |member| member.object.is_live());
            if pruned.is_some() {
                trace_event!(%identity, "weak set member pruned");
            }
            pruned
        });
        let hook = LifecycleRegistry::global().register(object, self.token, prune);
        Member {
            object: WeakBox::new(object),
            _hook: hook.into_guard(),
        }
    }
}

impl<T> Default for WeakSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T: Send + Sync + 'static> Extend<&'a Tracked<T>> for WeakSet<T> {
    /// Adds every object, registering one prune callback per new member.
    fn extend<I: IntoIterator<Item = &'a Tracked<T>>>(&mut self, objects: I) {
        let mut seen = HashSet::new();
        let candidates: Vec<&Tracked<T>> = objects
            .into_iter()
            .filter(|object| seen.insert(Tracked::identity(object)))
            .collect();

        self.members.write(|members| {
            members.reserve(candidates.len());
            for object in candidates {
                if let Entry::Vacant(slot) = members.entry(Tracked::identity(object)) {
                    slot.insert(self.member(object));
                }
            }
        });
    }
}

impl<'a, T: Send + Sync + 'static> FromIterator<&'a Tracked<T>> for WeakSet<T> {
    fn from_iter<I: IntoIterator<Item = &'a Tracked<T>>>(objects: I) -> Self {
        let mut set = Self::new();
        set.extend(objects);
        set
    }
}

impl<'a, T> IntoIterator for &'a WeakSet<T> {
    type Item = Tracked<T>;
    type IntoIter = Snapshot<T>;

    fn into_iter(self) -> Snapshot<T> {
        self.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for WeakSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// A one-shot iterator over strong handles to a collection's live members.
pub struct Snapshot<T> {
    objects: std::vec::IntoIter<Tracked<T>>,
}

impl<T> Iterator for Snapshot<T> {
    type Item = Tracked<T>;

    fn next(&mut self) -> Option<Tracked<T>> {
        self.objects.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.objects.size_hint()
    }
}

impl<T> ExactSizeIterator for Snapshot<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let mut set = WeakSet::new();
        let a = Tracked::new(1);
        assert!(set.insert(&a));
        assert!(!set.insert(&a));
        assert!(!set.insert(&a.clone()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_cancels_registration() {
        let mut set = WeakSet::new();
        let a = Tracked::new(1);
        set.insert(&a);
        let pending = LifecycleRegistry::global().stats().pending;
        assert!(pending >= 1);

        assert!(set.remove(&a));
        assert!(!set.remove(&a));
        assert!(!set.contains(&a));
        assert!(set.is_empty());
    }

    #[test]
    fn clear_drops_members() {
        let mut set = WeakSet::new();
        let objects: Vec<_> = (0..4).map(Tracked::new).collect();
        set.extend(&objects);
        assert_eq!(set.len(), 4);
        set.clear();
        assert!(set.is_empty());
        drop(objects);
        assert!(set.is_empty());
    }

    #[test]
    fn extend_skips_duplicates_in_batch() {
        let a = Tracked::new('a');
        let b = Tracked::new('b');
        let set: WeakSet<char> = [&a, &b, &a].into_iter().collect();
        assert_eq!(set.len(), 2);
        drop(a);
        assert_eq!(set.len(), 1);
        assert!(set.contains(&b));
    }

    #[test]
    fn dropping_set_before_objects_is_quiet() {
        let a = Tracked::new(5);
        let mut set = WeakSet::new();
        set.insert(&a);
        drop(set);
        drop(a);
    }

    #[test]
    fn snapshot_keeps_members_alive_while_held() {
        let mut set = WeakSet::new();
        let a = Tracked::new(String::from("held"));
        set.insert(&a);

        let mut snapshot = set.iter();
        drop(a);
        assert_eq!(set.len(), 1);
        let held = snapshot.next().unwrap();
        assert_eq!(held.as_str(), "held");
        drop(held);
        drop(snapshot);
        assert_eq!(set.len(), 0);
    }
}
