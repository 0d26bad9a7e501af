//! Fan-out Layer
//!
//! Turns single-node service calls into group-wide operations.
//!
//! - **Broadcast**: one call per member of the local group snapshot, all in
//!   flight at once, joined when every call has completed or failed. The
//!   outcome is always a pair of disjoint maps keyed by short id; a failing
//!   member never short-circuits the others.
//! - **Routed**: the group's hash strategy picks the single member owning a
//!   key and only that member is called.
//!
//! There is no per-member timeout unless `fanout_timeout_ms` is configured,
//! so by default an unresponsive member stalls the whole broadcast.

pub mod broadcast;

pub use broadcast::{Aggregate, Fanout};
