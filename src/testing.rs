//! Helpers for tests that boot real nodes inside the test process.

use crate::groups::{GroupConfig, group_of};
use crate::node::{self, NodeConfig, NodeHandle};
use crate::storage::HashStrategy;

use std::path::Path;

/// Fast-failing, trusting config rooted at `root`.
pub(crate) fn test_config(root: &Path) -> NodeConfig {
    NodeConfig {
        store_root: root.to_path_buf(),
        trusted_peers: true,
        retries: 1,
        backoff_ms: 10,
        request_timeout_ms: 5_000,
        ..NodeConfig::default()
    }
}

pub(crate) async fn start_node(root: &Path) -> NodeHandle {
    node::start(test_config(root))
        .await
        .expect("node should bind an ephemeral port")
}

/// Boots `n` nodes and installs `gid` with all of them on every node.
pub(crate) async fn start_cluster(n: usize, gid: &str, hash: HashStrategy, root: &Path) -> Vec<NodeHandle> {
    let mut handles = Vec::with_capacity(n);
    for _ in 0..n {
        handles.push(start_node(root).await);
    }
    let members = group_of(handles.iter().map(|h| h.node().clone()));
    for handle in &handles {
        handle
            .ctx
            .groups
            .put(GroupConfig::new(gid).with_hash(hash), members.clone())
            .expect("group should install");
    }
    handles
}

pub(crate) async fn stop_all(handles: Vec<NodeHandle>) {
    for handle in handles {
        let _ = handle.stop().await;
    }
}
