//! # `lifeline` - Weak References That Clean Up After Themselves
//!
//! Weak references and weak collections that notice when the objects they
//! refer to are released, plus the small lock primitives they are built on.
//!
//! ## Safety Guarantees
//!
//! ### Memory Safety
//! - **No dangling access**: a weak reference resolves to a strong
//!   [`Tracked`] handle or to nothing. It never observes a released object.
//! - **No resurrection**: release callbacks run after every upgrade has
//!   started failing, so no callback can hand out a new strong handle.
//! - **No address confusion**: weak entries keep their allocation's address
//!   reserved until they are removed, and registrations are matched by serial,
//!   so a reused address is never mistaken for the object that left it.
//!
//! ### Concurrency Safety
//! - **Release on any thread**: the last strong handle may be dropped on any
//!   thread. The matching entries are removed on that thread, exactly once.
//! - **No callback under a lock**: the registry never runs or drops a callback
//!   while holding its own lock, so callbacks may release further objects.
//! - **Guarded cells**: [`ExclusiveGuardedCell`] and [`ReadWriteGuardedCell`]
//!   only hand out their value inside a closure, making it impossible to
//!   forget to unlock.
//!
//! ## Architecture
//!
//! 1. **Identity** ([`IdentityKey`]): address-derived key, stable for as long
//!    as any handle to the object exists.
//! 2. **Lifecycle** ([`Tracked`], [`LifecycleRegistry`]): a shared allocation
//!    that reports its release to a process-wide registry of one-shot
//!    callbacks.
//! 3. **Weak collections** ([`WeakBox`], [`WeakSet`], [`WeakKeyMap`],
//!    [`WeakValueMap`], [`WeakPairMap`]): register a prune callback per watched
//!    object and remove entries as soon as it fires.
//! 4. **Synchronization** ([`MutualExclusionLock`], [`ReaderWriterLock`] and
//!    their guarded cells): futex-backed locks used by everything above.
//!
//! ## Example
//!
//! ```rust
//! use lifeline::{Tracked, WeakSet};
//!
//! let mut listeners = WeakSet::new();
//! let a = Tracked::new("a");
//! let b = Tracked::new("b");
//! listeners.insert(&a);
//! listeners.insert(&b);
//!
//! drop(a);
//! assert_eq!(listeners.len(), 1);
//! assert!(listeners.contains(&b));
//! ```
//!
//! ## Features
//!
//! - `tracing`: emit `trace`-level events for registrations, cancellations,
//!   releases and prunes.

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

#[macro_use]
mod macros;

pub mod collections;
pub mod concurrency;
pub mod lifecycle;

pub use collections::{Snapshot, WeakBox, WeakKeyMap, WeakPairMap, WeakSet, WeakValueMap};
pub use concurrency::sync::{
    ExclusiveGuardedCell, MutualExclusionLock, ReadWriteGuardedCell, ReaderWriterLock,
};
pub use lifecycle::{
    IdentityKey, LifecycleRegistry, LifecycleStats, RegistrationGuard, RegistrationHandle,
    RegistrationToken, Tracked, TrackedWeak,
};

// Compile-time assertions for memory layout
const _: () = {
    use core::mem;

    // Handles are one pointer wide.
    assert!(mem::size_of::<Tracked<u64>>() == mem::size_of::<usize>());
    assert!(mem::size_of::<TrackedWeak<u64>>() == mem::size_of::<usize>());
    assert!(mem::size_of::<IdentityKey>() == mem::size_of::<usize>());

    // Both locks are a single futex word.
    assert!(mem::size_of::<MutualExclusionLock>() == mem::size_of::<u32>());
    assert!(mem::size_of::<ReaderWriterLock>() == mem::size_of::<u32>());
};
