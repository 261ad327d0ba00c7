//! `IdentityKey`: which object, not which value.

use core::fmt;

use super::{Tracked, TrackedWeak};

/// A copyable token naming one object instance.
///
/// Derived from the address of the object's shared allocation. It does not
/// keep the object alive and never changes while the object lives, but a later
/// object may reuse the address once the allocation is freed. Anything keyed
/// by an `IdentityKey` must therefore be scoped to a registration whose
/// lifetime is bounded by the object's, never to the raw key alone.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentityKey(usize);

impl IdentityKey {
    /// Identity of a live tracked object.
    #[inline]
    pub fn of<T>(object: &Tracked<T>) -> Self {
        Tracked::identity(object)
    }

    /// Identity of the object behind a weak handle, live or not.
    #[inline]
    pub fn of_weak<T>(object: &TrackedWeak<T>) -> Self {
        object.identity()
    }

    /// Identity derived from a raw address.
    #[inline]
    pub fn from_ptr<T: ?Sized>(ptr: *const T) -> Self {
        Self(ptr.cast::<()>() as usize)
    }

    /// The underlying address, for diagnostics.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityKey({:#x})", self.0)
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
