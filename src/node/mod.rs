//! Node Runtime
//!
//! A node is one addressable process: an axum server answering
//! `PUT /{gid}/{service}/{method}`, a routing table of services, and the
//! [`NodeContext`] that owns everything the services touch.
//!
//! ## Identity
//! - **NID**: content hash of `{ip, port}`; stable for a fixed address.
//! - **SID**: the first five hex chars of the NID, used as the key of group
//!   member maps. Collisions are tolerated (last write wins).
//!
//! ## Reply contract
//! Every method yields an `(error, value)` pair. `local` calls carry a single
//! error or null; group-qualified calls carry the `(errorMap, valueMap)`
//! produced by the fan-out layer. The runtime does not inspect either slot.

pub mod config;
pub mod context;
pub mod routes;
pub mod server;
pub mod types;

pub use config::NodeConfig;
pub use context::{DispatchError, NodeContext};
pub use routes::{Call, MethodFn, Routes, Service};
pub use server::{NodeHandle, start};
pub use types::{
    ALL_GID, LOCAL_GID, Node, NodeId, Reply, SID_LEN, content_hash, from_value, to_value,
};

#[cfg(test)]
mod tests;
