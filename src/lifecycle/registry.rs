//! `LifecycleRegistry`: process-wide "tell me once when X goes away".
//!
//! # Lock order
//!
//! The registry's own lock is only ever held around table bookkeeping. No
//! callback runs, and no callback or [`Tracked`] handle is dropped, while it
//! is held. Callers may therefore register or cancel while holding their own
//! locks, as long as their callbacks do not expect to run under those locks.

use core::sync::atomic::{AtomicU64, Ordering};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::{IdentityKey, Tracked};
use crate::concurrency::sync::ExclusiveGuardedCell;

type Callback = Box<dyn FnOnce() + Send + 'static>;

static GLOBAL: OnceLock<LifecycleRegistry> = OnceLock::new();
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Distinguishes independent registrations on the same object.
///
/// Every party watching an object (a collection, a proxy, ...) uses its own
/// token. Registering twice with the same token on the same object replaces
/// the first callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegistrationToken(u64);

impl RegistrationToken {
    /// A token no other call to `unique` will return.
    pub fn unique() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw token value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Names one registration; used to cancel it before it fires.
///
/// Handles compare by registration serial, so a handle never matches a
/// registration made after its object's address was reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegistrationHandle {
    identity: IdentityKey,
    token: RegistrationToken,
    serial: u64,
}

impl RegistrationHandle {
    /// Identity of the watched object.
    pub fn identity(&self) -> IdentityKey {
        self.identity
    }

    /// Token the registration was made with.
    pub fn token(&self) -> RegistrationToken {
        self.token
    }

    /// Cancels through the global registry. See [`LifecycleRegistry::cancel`].
    pub fn cancel(&self) -> bool {
        LifecycleRegistry::global().cancel(self)
    }

    /// Returns `true` until the registration fires or is cancelled.
    pub fn is_pending(&self) -> bool {
        LifecycleRegistry::global().is_pending(self)
    }

    /// Wraps the handle in a guard that cancels it on drop.
    pub fn into_guard(self) -> RegistrationGuard {
        RegistrationGuard { handle: self }
    }
}

/// Cancels its registration when dropped.
#[must_use = "dropping the guard cancels the registration"]
#[derive(Debug)]
pub struct RegistrationGuard {
    handle: RegistrationHandle,
}

impl RegistrationGuard {
    /// The guarded registration.
    pub fn handle(&self) -> RegistrationHandle {
        self.handle
    }

    /// Returns `true` until the registration fires or is cancelled.
    pub fn is_pending(&self) -> bool {
        self.handle.is_pending()
    }

    /// Releases the registration from the guard without cancelling it.
    pub fn disarm(self) -> RegistrationHandle {
        let handle = self.handle;
        core::mem::forget(self);
        handle
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

/// Counters describing registry activity since process start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleStats {
    /// Registrations made, including replacements.
    pub registered: u64,
    /// Callbacks invoked because their object was released.
    pub fired: u64,
    /// Registrations cancelled before firing.
    pub cancelled: u64,
    /// Registrations overwritten by a later one with the same token.
    pub replaced: u64,
    /// Callbacks that panicked while firing. The panic is contained.
    pub panicked: u64,
    /// Registrations waiting to fire.
    pub pending: usize,
}

struct Slot {
    token: RegistrationToken,
    serial: u64,
    callback: Callback,
}

#[derive(Default)]
struct Table {
    hooks: HashMap<IdentityKey, Vec<Slot>>,
    stats: LifecycleStats,
}

/// Registry of one-shot callbacks tied to the end of [`Tracked`] lifetimes.
///
/// There is exactly one instance per process, built on first use; every
/// tracked allocation reports its release to it. All operations are safe to
/// call from any thread.
///
/// Callbacks run on whichever thread drops the last strong handle, after the
/// object became unreachable and before its value is dropped. They should be
/// short and must not block.
pub struct LifecycleRegistry {
    table: ExclusiveGuardedCell<Table>,
    serials: AtomicU64,
}

impl LifecycleRegistry {
    fn new() -> Self {
        Self {
            table: ExclusiveGuardedCell::new(Table::default()),
            serials: AtomicU64::new(1),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::new)
    }

    /// Arranges for `callback` to run once when `object`'s last strong handle
    /// is dropped.
    ///
    /// A previous registration on the same object with the same `token` is
    /// replaced without running. Registrations on one object with different
    /// tokens fire in no particular order.
    pub fn register<T>(
        &self,
        object: &Tracked<T>,
        token: RegistrationToken,
        callback: impl FnOnce() + Send + 'static,
    ) -> RegistrationHandle {
        Tracked::arm(object);
        let identity = Tracked::identity(object);
        let serial = self.serials.fetch_add(1, Ordering::Relaxed);
        let slot = Slot {
            token,
            serial,
            callback: Box::new(callback),
        };

        let replaced = self.table.write(|table| {
            table.stats.registered += 1;
            let slots = table.hooks.entry(identity).or_default();
            if let Some(existing) = slots.iter_mut().find(|s| s.token == token) {
                table.stats.replaced += 1;
                Some(core::mem::replace(existing, slot))
            } else {
                slots.push(slot);
                table.stats.pending += 1;
                None
            }
        });
        drop(replaced);

        trace_event!(%identity, token = token.0, serial, "lifecycle hook registered");
        RegistrationHandle {
            identity,
            token,
            serial,
        }
    }

    /// Removes a registration without running it.
    ///
    /// Returns `false` if it already fired, was cancelled, or was replaced.
    pub fn cancel(&self, handle: &RegistrationHandle) -> bool {
        let removed = self.table.write(|table| {
            let slots = table.hooks.get_mut(&handle.identity)?;
            let index = slots.iter().position(|s| s.serial == handle.serial)?;
            let slot = slots.swap_remove(index);
            if slots.is_empty() {
                table.hooks.remove(&handle.identity);
            }
            table.stats.cancelled += 1;
            table.stats.pending -= 1;
            Some(slot)
        });

        let cancelled = removed.is_some();
        drop(removed);
        if cancelled {
            trace_event!(
                identity = %handle.identity,
                serial = handle.serial,
                "lifecycle hook cancelled"
            );
        }
        cancelled
    }

    /// Returns `true` until the registration fires or is cancelled.
    pub fn is_pending(&self, handle: &RegistrationHandle) -> bool {
        self.table.read(|table| {
            table
                .hooks
                .get(&handle.identity)
                .is_some_and(|slots| slots.iter().any(|s| s.serial == handle.serial))
        })
    }

    /// Number of registrations waiting to fire.
    pub fn len(&self) -> usize {
        self.table.read(|table| table.stats.pending)
    }

    /// Returns `true` if no registration is waiting to fire.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> LifecycleStats {
        self.table.read(|table| table.stats)
    }

    /// Fires and forgets every registration on `identity`.
    ///
    /// Runs inside the allocation's destructor, possibly on a thread that is
    /// already unwinding, so it never panics itself: a panicking callback is
    /// contained, counted in [`LifecycleStats::panicked`] and reported as a
    /// `warn` event, and the remaining callbacks still run.
    pub(crate) fn end_of_life(&self, identity: IdentityKey) {
        let slots = self.table.write(|table| {
            let slots = table.hooks.remove(&identity).unwrap_or_default();
            table.stats.fired += slots.len() as u64;
            table.stats.pending -= slots.len();
            slots
        });
        if slots.is_empty() {
            return;
        }

        trace_event!(%identity, callbacks = slots.len(), "object released, firing lifecycle hooks");
        let mut panicked = 0_u64;
        for slot in slots {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(slot.callback)) {
                panicked += 1;
                warn_event!(
                    %identity,
                    serial = slot.serial,
                    message = panic_message(payload.as_ref()),
                    "lifecycle hook panicked"
                );
                // The payload's own destructor may panic too.
                if let Err(nested) = panic::catch_unwind(AssertUnwindSafe(move || drop(payload))) {
                    core::mem::forget(nested);
                }
            }
        }
        if panicked > 0 {
            self.table.write(|table| table.stats.panicked += panicked);
        }
    }
}

#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl core::fmt::Debug for LifecycleRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LifecycleRegistry")
            .field("stats", &self.stats())
            .finish()
    }
}
