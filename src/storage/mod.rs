//! Distributed Storage Module
//!
//! Hash-sharded key/value storage built on the fan-out layer.
//!
//! ## Core Concepts
//! - **Placement**: `HashStrategy` maps a key to exactly one member of a group
//!   snapshot (naive, consistent or rendezvous hashing over content hashes).
//! - **Local layer**: `LocalStore` keeps values per `(gid, key)`, either in
//!   memory (`mem` service) or as codec-encoded files (`store` service).
//! - **Sharding**: `DistributedStore` resolves the owner and calls its local
//!   store; enumeration asks every member and unions the answers.
//! - **Prefix shards**: `bulk_append` merges index postings into per-prefix
//!   shards instead of rewriting them.
//!
//! Values are not replicated; a membership change leaves existing entries
//! where they were written.

pub mod distributed;
pub mod local;
pub mod partitioner;
pub mod protocol;
pub mod shard;

pub use distributed::DistributedStore;
pub use local::LocalStore;
pub use partitioner::HashStrategy;
pub use protocol::{BulkAppendRequest, MergeStats, Posting, StoreKey};
pub use shard::{PrefixShard, TermRecord};
