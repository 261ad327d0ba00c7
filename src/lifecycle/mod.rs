//! Object identity and end-of-life notification.
//!
//! A [`Tracked<T>`] is a shared handle (like `Arc<T>`) whose allocation reports
//! its own release to the process-wide [`LifecycleRegistry`]. Code that does
//! not own the object can register a one-shot callback on it without
//! prolonging its life or changing `T`:
//!
//! ```rust
//! use lifeline::Tracked;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! let released = Arc::new(AtomicBool::new(false));
//! let object = Tracked::new(String::from("session"));
//!
//! let flag = Arc::clone(&released);
//! Tracked::on_release(&object, move || flag.store(true, Ordering::SeqCst));
//!
//! drop(object);
//! assert!(released.load(Ordering::SeqCst));
//! ```

pub mod identity;
pub mod registry;
pub mod tracked;

pub use identity::IdentityKey;
pub use registry::{
    LifecycleRegistry, LifecycleStats, RegistrationGuard, RegistrationHandle, RegistrationToken,
};
pub use tracked::{Tracked, TrackedWeak};
