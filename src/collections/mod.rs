//! Collections that hold [`Tracked`](crate::lifecycle::Tracked) objects
//! without keeping them alive.
//!
//! - `weak`: weak references, sets and maps that prune themselves when the
//!   objects they refer to are released.

pub mod weak;

pub use weak::{Snapshot, WeakBox, WeakKeyMap, WeakPairMap, WeakSet, WeakValueMap};
