//! Group Registry
//!
//! Named membership tables (`gid -> {sid -> node}`) kept in each node's
//! memory. There is no durable log and no gossip: groups change only through
//! explicit `put`/`add`/`rem`/`del` calls. The broadcast variants (see
//! `services::groups`) apply an edit locally and then ask every member of
//! the local snapshot to apply it too, so members can diverge when some of
//! those calls fail.

pub mod registry;
pub mod types;

pub use registry::GroupRegistry;
pub use types::{Group, GroupConfig, group_from_value, group_of, group_to_value};
