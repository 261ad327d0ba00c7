//! `WeakBox`: a non-owning reference compared by identity.

use core::fmt;
use core::hash::{Hash, Hasher};

use crate::lifecycle::{IdentityKey, Tracked, TrackedWeak};

/// A hashable, non-owning reference to a [`Tracked`] object.
///
/// Equality and hashing use the identity captured at construction, never
/// `T`'s own `PartialEq`: two boxes are equal iff they wrap the same instance
/// (or both wrap nothing). A box keeps comparing equal to its twin after the
/// referent is gone; only [`get`](Self::get) notices.
pub struct WeakBox<T> {
    object: TrackedWeak<T>,
    identity: IdentityKey,
}

impl<T> WeakBox<T> {
    /// Wraps a weak reference to `object`.
    #[inline]
    pub fn new(object: &Tracked<T>) -> Self {
        Self {
            object: Tracked::downgrade(object),
            identity: Tracked::identity(object),
        }
    }

    /// A box wrapping nothing.
    pub fn empty() -> Self {
        let object = TrackedWeak::new();
        let identity = object.identity();
        Self { object, identity }
    }

    /// The object, if it is still alive.
    #[inline]
    pub fn get(&self) -> Option<Tracked<T>> {
        self.object.upgrade()
    }

    /// Returns `true` while the object is alive.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.object.is_live()
    }

    /// Identity of the wrapped object.
    #[inline]
    pub fn identity(&self) -> IdentityKey {
        self.identity
    }

    /// Returns `true` if this box wraps `object`.
    #[inline]
    pub fn refers_to(&self, object: &Tracked<T>) -> bool {
        self.identity == Tracked::identity(object)
    }
}

impl<T> Clone for WeakBox<T> {
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            identity: self.identity,
        }
    }
}

impl<T> PartialEq for WeakBox<T> {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl<T> Eq for WeakBox<T> {}

impl<T> Hash for WeakBox<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl<T> From<&Tracked<T>> for WeakBox<T> {
    fn from(object: &Tracked<T>) -> Self {
        Self::new(object)
    }
}

impl<T> Default for WeakBox<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> fmt::Debug for WeakBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakBox")
            .field("identity", &self.identity)
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_is_identity() {
        let a = Tracked::new(1);
        let b = Tracked::new(1);
        assert_eq!(WeakBox::new(&a), WeakBox::new(&a.clone()));
        assert_ne!(WeakBox::new(&a), WeakBox::new(&b));
        assert_eq!(WeakBox::<i32>::empty(), WeakBox::empty());
        assert_ne!(WeakBox::new(&a), WeakBox::empty());
    }

    #[test]
    fn hash_set_deduplicates_by_instance() {
        let a = Tracked::new("x");
        let b = Tracked::new("x");
        let set: HashSet<_> = [WeakBox::new(&a), WeakBox::new(&a), WeakBox::new(&b)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn get_resolves_until_release() {
        let a = Tracked::new(String::from("live"));
        let boxed = WeakBox::new(&a);
        assert_eq!(boxed.get().as_deref().map(String::as_str), Some("live"));
        assert!(boxed.refers_to(&a));
        drop(a);
        assert!(boxed.get().is_none());
        assert!(!boxed.is_live());
    }
}
