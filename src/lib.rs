//! Distributed Computation Runtime Library
//!
//! Nodes expose services over a single RPC route, organize into groups,
//! share a hash-sharded store and run MapReduce jobs across a group. The
//! binary (`main.rs`) starts one node.
//!
//! ## Architecture Modules
//! Leaves first:
//!
//! - **`codec`**: Self-describing wire form for runtime values, including
//!   shared and cyclic containers and function references.
//! - **`node`**: Node identity, configuration, the per-node runtime context,
//!   the routing table and the axum server.
//! - **`comm`**: Single-target RPC client with validation and bounded
//!   retry/backoff.
//! - **`groups`**: Named membership tables held by each node.
//! - **`fanout`**: Broadcast and key-routed projection of service calls
//!   onto a group.
//! - **`storage`**: Hash placement strategies, local stores and the
//!   group-wide store.
//! - **`mapreduce`**: Map/shuffle/reduce job coordination.
//! - **`services`**: The built-in RPC services tying the above together.

pub mod codec;
pub mod comm;
pub mod error;
pub mod fanout;
pub mod groups;
pub mod mapreduce;
pub mod node;
pub mod services;
pub mod storage;

pub use error::{Result, RpcError};

#[cfg(test)]
pub(crate) mod testing;
