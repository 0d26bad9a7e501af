//! `status`: node identity, counters and process lifecycle.

use super::{arg, str_arg};
use crate::codec::Value;
use crate::comm::{Remote, RetryPolicy};
use crate::error::{Result, RpcError};
use crate::node::{Call, Node, NodeConfig, NodeContext, Reply, Service, to_value};

use std::process::Stdio;
use std::time::Duration;

/// Overrides the executable `spawn` launches; defaults to the running binary.
pub const NODE_BIN_ENV: &str = "DISTRIBUTION_NODE_BIN";

const STOP_DELAY: Duration = Duration::from_millis(50);
const SPAWN_READY: RetryPolicy = RetryPolicy {
    retries: 10,
    backoff: Duration::from_millis(100),
};

pub fn local() -> Service {
    Service::new("status")
        .op("get", |call, args| async move { get(&call.ctx, &args) })
        .op("spawn", |call, args| async move {
            spawn(&call.ctx, &arg(&args, 0)).await.map(|node| node.to_value())
        })
        .op("stop", |call, _args| async move { Ok::<_, RpcError>(stop(&call.ctx)) })
}

pub fn group() -> Service {
    Service::new("status")
        .method("get", |call, args| async move {
            match call.ctx.fanout(&call.gid) {
                Ok(fanout) => fanout.broadcast("status", "get", args).await.to_reply(),
                Err(e) => Reply::err(e),
            }
        })
        .method("spawn", |call, args| async move {
            match spawn_into_group(&call, &arg(&args, 0)).await {
                Ok(reply) => reply,
                Err(e) => Reply::err(e),
            }
        })
        .method("stop", |call, _args| async move {
            match call.ctx.fanout(&call.gid) {
                Ok(fanout) => fanout.broadcast("status", "stop", vec![]).await.to_reply(),
                Err(e) => Reply::err(e),
            }
        })
}

fn get(ctx: &NodeContext, args: &[Value]) -> Result<Value> {
    let key = str_arg(args, 0, "key")?;
    Ok(match key.as_str() {
        "nid" => Value::string(ctx.node.nid().0),
        "sid" => Value::string(ctx.node.sid()),
        "ip" => Value::string(ctx.node.ip.clone()),
        "port" => Value::from(ctx.node.port),
        "counts" => Value::from(ctx.counts()),
        "uptime" => Value::from(ctx.uptime_ms()),
        "config" => to_value(&ctx.config),
        other => return Err(RpcError::NotFound(format!("no status entry '{}'", other))),
    })
}

/// Config for a child node: this node's config overlaid with `overrides`.
fn child_config(ctx: &NodeContext, overrides: &Value) -> Result<NodeConfig> {
    let mut config = serde_json::to_value(&ctx.config)
        .map_err(|e| RpcError::Validation(format!("unserializable config: {}", e)))?;
    if !overrides.is_nullish() {
        let serde_json::Value::Object(fields) = overrides.to_json()? else {
            return Err(RpcError::Validation("spawn expects a config object".into()));
        };
        if let serde_json::Value::Object(base) = &mut config {
            base.extend(fields);
        }
    }
    let config: NodeConfig = serde_json::from_value(config)
        .map_err(|e| RpcError::Validation(format!("invalid node config: {}", e)))?;
    if config.port == 0 {
        return Err(RpcError::Validation("spawn needs an explicit port".into()));
    }
    Ok(config)
}

/// Launches a child node process and waits until it answers.
pub async fn spawn(ctx: &NodeContext, overrides: &Value) -> Result<Node> {
    let config = child_config(ctx, overrides)?;
    let node = config.node();
    let exe = match std::env::var_os(NODE_BIN_ENV) {
        Some(path) => path.into(),
        None => std::env::current_exe().map_err(|e| spawn_error(&node, e))?,
    };

    tracing::info!("Spawning node {} from {:?}", node, exe);
    let mut child = tokio::process::Command::new(exe)
        .args(config.to_args())
        .stdin(Stdio::null())
        .spawn()
        .map_err(|e| spawn_error(&node, e))?;

    let watched = node.clone();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => tracing::info!("Node {} exited with {}", watched, status),
            Err(e) => tracing::warn!("Lost track of node {}: {}", watched, e),
        }
    });

    let ready = Remote::new(node.clone(), "status", "get");
    let nid = ctx
        .comm
        .send_with(vec![Value::from("nid")], &ready, SPAWN_READY)
        .await?
        .into_result()?;
    if nid.as_str() != Some(node.nid().0.as_str()) {
        return Err(RpcError::Protocol(format!(
            "{} answered with an unexpected node id",
            node
        )));
    }
    tracing::info!("Node {} ({}) is up", node, node.sid());
    Ok(node)
}

/// Replies with this node, then shuts the server down.
pub fn stop(ctx: &std::sync::Arc<NodeContext>) -> Value {
    tracing::info!("Stop requested for {}", ctx.node);
    let ctx_for_stop = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(STOP_DELAY).await;
        ctx_for_stop.request_shutdown();
    });
    ctx.node.to_value()
}

/// Spawns a node, adds it to `call.gid` everywhere, and hands it the
/// membership. Replies `(errorMap, node)`.
/// Spawns a node and adds it to the context group everywhere; the new node
/// receives the full membership.
async fn spawn_into_group(call: &Call, overrides: &Value) -> Result<Reply> {
    let node = spawn(&call.ctx, overrides).await?;
    let edited = super::groups::add_member(call.clone(), &node).await;
    Ok(Reply::pair(edited.error, node.to_value()))
}

fn spawn_error(node: &Node, e: std::io::Error) -> RpcError {
    RpcError::Application(Value::error(
        "SpawnError",
        &format!("cannot spawn {}: {}", node, e),
    ))
}
