//! MapReduce Engine
//!
//! Three strictly sequential phases over a group, built only on the store
//! and the fan-out layer:
//!
//! 1. **Map**: each job key is routed to the member that owns it; that
//!    member reads the stored value and applies the map function, returning
//!    `{emittedKey: value}` pairs.
//! 2. **Shuffle**: each emitted pair is appended to the job-scoped bucket
//!    `reduce@{jobId}/{emittedKey}` in the `{gid}.mr` namespace, on the
//!    member owning the emitted key.
//! 3. **Reduce**: each distinct emitted key is routed to its owner, which
//!    applies the reduce function to the bucket and drops the bucket, even
//!    when the reduce fails.
//!
//! Per-key failures are collected into the report and never stop the job.
//! Only a failing key enumeration aborts it.
//!
//! Map and reduce functions travel as names and resolve against each
//! node's `FunctionRegistry`.

pub mod engine;
pub mod jobs;
pub mod tokenizer;
pub mod types;

pub use engine::{MapReduce, bucket_key, bucket_namespace};
pub use types::{JobError, JobReport, JobSpec, Phase, PhaseProgress, PhaseState};

#[cfg(test)]
mod tests;
