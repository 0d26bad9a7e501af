use super::types::Node;
use crate::storage::HashStrategy;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_MS: u64 = 500;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Everything a node process needs to start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub ip: String,
    /// `0` asks the OS for a free port.
    pub port: u16,
    /// Root directory of the persistent store.
    pub store_root: PathBuf,
    /// Accept function payloads from peers.
    pub trusted_peers: bool,
    pub retries: u32,
    pub backoff_ms: u64,
    pub request_timeout_ms: u64,
    /// Per-member bound for broadcast calls. `None` waits indefinitely.
    pub fanout_timeout_ms: Option<u64>,
    /// Strategy for groups created without an explicit one.
    pub hash: HashStrategy,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 0,
            store_root: std::env::temp_dir().join("distribution-store"),
            trusted_peers: false,
            retries: DEFAULT_RETRIES,
            backoff_ms: DEFAULT_BACKOFF_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            fanout_timeout_ms: None,
            hash: HashStrategy::default(),
        }
    }
}

impl NodeConfig {
    pub fn node(&self) -> Node {
        Node::new(self.ip.clone(), self.port)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn fanout_timeout(&self) -> Option<Duration> {
        self.fanout_timeout_ms.map(Duration::from_millis)
    }

    /// Command-line arguments that reproduce this config in a child process.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--ip".to_string(),
            self.ip.clone(),
            "--port".to_string(),
            self.port.to_string(),
            "--store-root".to_string(),
            self.store_root.display().to_string(),
            "--retries".to_string(),
            self.retries.to_string(),
            "--backoff-ms".to_string(),
            self.backoff_ms.to_string(),
            "--request-timeout-ms".to_string(),
            self.request_timeout_ms.to_string(),
            "--hash".to_string(),
            self.hash.to_string(),
        ];
        if self.trusted_peers {
            args.push("--trusted-peers".to_string());
        }
        if let Some(ms) = self.fanout_timeout_ms {
            args.push("--fanout-timeout-ms".to_string());
            args.push(ms.to_string());
        }
        args
    }
}
