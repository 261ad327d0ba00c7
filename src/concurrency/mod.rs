//! Concurrency primitives.
//!
//! The locks here are small and futex-backed. The guarded cells pair a lock
//! with the data it protects and only expose that data inside a closure.

pub mod sync;
