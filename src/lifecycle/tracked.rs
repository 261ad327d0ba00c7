//! `Tracked<T>`: a shared handle whose end of life can be observed.

use core::fmt;
use core::ops::Deref;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::{IdentityKey, LifecycleRegistry, RegistrationHandle, RegistrationToken};

/// The shared allocation behind a [`Tracked`] object.
///
/// `armed` is set by the first registration so that objects nobody watches
/// never touch the registry on their way out.
struct Allocation<T> {
    armed: AtomicBool,
    value: T,
}

impl<T> Drop for Allocation<T> {
    fn drop(&mut self) {
        // Runs once the strong count is zero, before `value` is dropped and
        // before the storage is freed: upgrades already fail, so callbacks
        // cannot resurrect the object.
        if *self.armed.get_mut() {
            LifecycleRegistry::global().end_of_life(IdentityKey::from_ptr(self as *const Self));
        }
    }
}

/// An atomically reference-counted object handle with lifecycle hooks.
///
/// Behaves like `Arc<T>`: cloning shares the object, dereferencing yields
/// `&T`. Unlike `Arc<T>`, unrelated code can ask to be told, exactly once,
/// when the last `Tracked` handle to an object is dropped, without touching
/// `T`, through [`LifecycleRegistry::register`] or [`Tracked::on_release`].
///
/// Handle operations are associated functions (`Tracked::identity(&obj)`) so
/// they never shadow methods of `T`.
pub struct Tracked<T> {
    inner: Arc<Allocation<T>>,
}

impl<T> Tracked<T> {
    /// Moves `value` into a new tracked allocation.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Allocation {
                armed: AtomicBool::new(false),
                value,
            }),
        }
    }

    /// Creates a non-owning handle to the same object.
    #[inline]
    pub fn downgrade(this: &Self) -> TrackedWeak<T> {
        TrackedWeak {
            inner: Arc::downgrade(&this.inner),
        }
    }

    /// The object's identity.
    #[inline]
    pub fn identity(this: &Self) -> IdentityKey {
        IdentityKey::from_ptr(Arc::as_ptr(&this.inner))
    }

    /// Returns `true` if both handles refer to the same object.
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    /// Number of strong handles to the object.
    #[inline]
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.inner)
    }

    /// Number of weak handles to the object.
    #[inline]
    pub fn weak_count(this: &Self) -> usize {
        Arc::weak_count(&this.inner)
    }

    /// Runs `callback` once, when the last strong handle to this object is
    /// dropped. Cancel through the returned handle.
    pub fn on_release(
        this: &Self,
        callback: impl FnOnce() + Send + 'static,
    ) -> RegistrationHandle {
        LifecycleRegistry::global().register(this, RegistrationToken::unique(), callback)
    }

    /// Marks the allocation as watched.
    #[inline]
    pub(crate) fn arm(this: &Self) {
        if !this.inner.armed.load(Ordering::Relaxed) {
            this.inner.armed.store(true, Ordering::Release);
        }
    }
}

impl<T> Clone for Tracked<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner.value
    }
}

impl<T> AsRef<T> for Tracked<T> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T> From<T> for Tracked<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: fmt::Display> fmt::Display for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

/// A non-owning handle to a [`Tracked`] object.
pub struct TrackedWeak<T> {
    inner: Weak<Allocation<T>>,
}

impl<T> TrackedWeak<T> {
    /// A handle that refers to nothing; `upgrade` always fails.
    pub const fn new() -> Self {
        Self { inner: Weak::new() }
    }

    /// Returns a strong handle if the object is still alive.
    #[inline]
    pub fn upgrade(&self) -> Option<Tracked<T>> {
        self.inner.upgrade().map(|inner| Tracked { inner })
    }

    /// Returns `true` while at least one strong handle exists.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Identity of the referenced object. Every dangling handle created by
    /// [`TrackedWeak::new`] shares one identity.
    #[inline]
    pub fn identity(&self) -> IdentityKey {
        IdentityKey::from_ptr(self.inner.as_ptr())
    }

    /// Returns `true` if both handles refer to the same allocation.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl<T> Clone for TrackedWeak<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> Default for TrackedWeak<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TrackedWeak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedWeak")
            .field("identity", &self.identity())
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn weak_upgrade_fails_after_release() {
        let object = Tracked::new(vec![1, 2, 3]);
        let weak = Tracked::downgrade(&object);
        assert!(weak.is_live());
        assert_eq!(weak.upgrade().map(|o| o.len()), Some(3));
        drop(object);
        assert!(!weak.is_live());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn on_release_fires_when_last_clone_drops() {
        let fired = Arc::new(AtomicUsize::new(0));
        let object = Tracked::new("payload");
        let copy = object.clone();

        let counter = Arc::clone(&fired);
        let _handle = Tracked::on_release(&object, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        drop(object);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        drop(copy);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_cannot_resurrect() {
        let object = Tracked::new(5_i32);
        let weak = Tracked::downgrade(&object);
        let upgraded = Arc::new(AtomicBool::new(true));

        let seen = Arc::clone(&upgraded);
        let _handle = Tracked::on_release(&object, move || {
            seen.store(weak.upgrade().is_some(), Ordering::SeqCst);
        });
        drop(object);
        assert!(!upgraded.load(Ordering::SeqCst));
    }

    #[test]
    fn dangling_weak_handles_share_identity() {
        let a: TrackedWeak<u8> = TrackedWeak::new();
        let b: TrackedWeak<u8> = TrackedWeak::default();
        assert_eq!(a.identity(), b.identity());
        assert!(!a.is_live());
    }
}
