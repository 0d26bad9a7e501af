use clap::Parser;
use distribution::node::{self, NodeConfig};
use distribution::storage::HashStrategy;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Runs one node of the cluster.
#[derive(Parser, Debug)]
#[command(name = "distribution-node", version)]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    ip: String,

    /// 0 picks a free port.
    #[arg(long, default_value_t = 0)]
    port: u16,

    #[arg(long)]
    store_root: Option<PathBuf>,

    /// Accept function values from peers.
    #[arg(long)]
    trusted_peers: bool,

    #[arg(long, default_value_t = node::config::DEFAULT_RETRIES)]
    retries: u32,

    #[arg(long, default_value_t = node::config::DEFAULT_BACKOFF_MS)]
    backoff_ms: u64,

    #[arg(long, default_value_t = node::config::DEFAULT_REQUEST_TIMEOUT_MS)]
    request_timeout_ms: u64,

    #[arg(long)]
    fanout_timeout_ms: Option<u64>,

    /// naive, consistent or rendezvous
    #[arg(long, default_value = "naive")]
    hash: HashStrategy,
}

impl From<Args> for NodeConfig {
    fn from(args: Args) -> Self {
        let defaults = NodeConfig::default();
        NodeConfig {
            ip: args.ip,
            port: args.port,
            store_root: args.store_root.unwrap_or(defaults.store_root),
            trusted_peers: args.trusted_peers,
            retries: args.retries,
            backoff_ms: args.backoff_ms,
            request_timeout_ms: args.request_timeout_ms,
            fanout_timeout_ms: args.fanout_timeout_ms,
            hash: args.hash,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = NodeConfig::from(Args::parse());
    tracing::info!("Starting node on {}:{}", config.ip, config.port);
    if config.trusted_peers {
        tracing::warn!("Accepting function payloads from peers");
    }

    let handle = node::start(config).await?;
    tracing::info!("Node ID: {}", handle.node().nid());

    let ctx = handle.ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            ctx.request_shutdown();
        }
    });

    handle.wait().await
}
