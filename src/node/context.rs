//! Runtime context owned by one node process.
//!
//! Every component receives its collaborators through this object instead of
//! process-wide singletons, so several nodes can live in one process.

use super::config::NodeConfig;
use super::routes::{Call, Routes};
use super::types::{LOCAL_GID, Node, Reply};
use crate::codec::{Codec, FunctionRegistry, Value};
use crate::comm::{CommClient, RetryPolicy};
use crate::error::{Result, RpcError};
use crate::fanout::Fanout;
use crate::groups::GroupRegistry;
use crate::storage::LocalStore;
use crate::{mapreduce, services};

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::watch;

pub struct NodeContext {
    pub node: Node,
    pub config: NodeConfig,
    pub codec: Codec,
    pub routes: Routes,
    pub groups: GroupRegistry,
    pub comm: CommClient,
    /// In-memory store behind the `mem` service.
    pub mem: LocalStore,
    /// Persistent store behind the `store` service.
    pub store: LocalStore,
    started_at: Instant,
    counts: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl NodeContext {
    /// Builds the context for `node` (the bound address, with the real port)
    /// and installs the built-in services.
    pub fn new(config: NodeConfig, node: Node) -> Arc<Self> {
        let functions = FunctionRegistry::new();
        mapreduce::jobs::register_builtin(&functions);
        Self::with_functions(config, node, functions)
    }

    pub fn with_functions(
        config: NodeConfig,
        node: Node,
        functions: Arc<FunctionRegistry>,
    ) -> Arc<Self> {
        let codec = Codec::new(functions, config.trusted_peers);
        let comm = CommClient::new(
            codec.clone(),
            RetryPolicy::new(config.retries, config.backoff()),
            config.request_timeout(),
        );
        let store_dir = config.store_root.join(node.nid().0);
        let routes = Routes::new();
        services::install(&routes);
        let (shutdown, _) = watch::channel(false);

        Arc::new(Self {
            groups: GroupRegistry::new(&node, config.hash),
            mem: LocalStore::memory(codec.clone()),
            store: LocalStore::disk(codec.clone(), store_dir),
            node,
            config,
            codec,
            routes,
            comm,
            started_at: Instant::now(),
            counts: AtomicU64::new(0),
            shutdown,
        })
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        self.codec.functions()
    }

    /// Number of requests served so far.
    pub fn counts(&self) -> u64 {
        self.counts.load(Ordering::Relaxed)
    }

    pub(crate) fn record_request(&self) {
        self.counts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Fan-out handle over the current local snapshot of `gid`.
    pub fn fanout(&self, gid: &str) -> Result<Fanout> {
        Fanout::new(self, gid)
    }

    /// Asks the server to stop accepting requests and drain.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Resolves `/{gid}/{service}/{method}` and runs it.
    ///
    /// Routing failures come back as `Err`; whatever the method produces,
    /// including its own errors, comes back inside the `Reply`. A panicking
    /// method only fails its own request.
    pub async fn dispatch(
        self: &Arc<Self>,
        gid: &str,
        service: &str,
        method: &str,
        args: Vec<Value>,
    ) -> std::result::Result<Reply, DispatchError> {
        if gid != LOCAL_GID && !self.groups.contains(gid) {
            return Err(DispatchError::Route(format!("unknown group '{}'", gid)));
        }
        let svc = self.routes.get(gid, service).ok_or_else(|| {
            DispatchError::Route(format!("unknown service '{}' for gid '{}'", service, gid))
        })?;
        let handler = svc.get_method(method).ok_or_else(|| {
            DispatchError::Route(format!("service '{}' has no method '{}'", service, method))
        })?;

        let call = Call {
            ctx: self.clone(),
            gid: gid.to_string(),
        };
        AssertUnwindSafe(handler(call, args))
            .catch_unwind()
            .await
            .map_err(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "method panicked".to_string());
                DispatchError::Failed(format!("{}.{}: {}", service, method, message))
            })
    }

    /// Runs a method on this node without going through HTTP.
    pub async fn call_local(
        self: &Arc<Self>,
        service: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.dispatch(LOCAL_GID, service, method, args)
            .await
            .map_err(|e| RpcError::Route(e.to_string()))?
            .into_result()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{0}")]
    Route(String),
    #[error("{0}")]
    Failed(String),
}
