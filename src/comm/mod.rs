//! Communication Client
//!
//! Point-to-point RPC: one `PUT` to `/{gid}/{service}/{method}` on the target
//! node, with the codec-encoded message as body.
//!
//! ## Failure handling
//! - Targets are validated before any I/O; a bad target fails immediately.
//! - Connection-level failures (refused/reset) are retried with a doubling
//!   backoff up to the retry budget. Retries of one call are sequential.
//! - Every other failure (non-success status, undecodable body, timeout) is
//!   surfaced at once.

pub mod client;

pub use client::{CommClient, Remote, RetryPolicy};

#[cfg(test)]
mod tests;
