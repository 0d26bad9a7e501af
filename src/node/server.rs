//! HTTP surface of a node.
//!
//! One route, `PUT /{gid}/{service}/{method}`. The body is the codec-encoded
//! argument array and the response body is the codec-encoded
//! `(error, value)` pair. Anything that fails before the method runs gets a
//! non-2xx status with a plain-text diagnostic; the server keeps serving.

use super::config::NodeConfig;
use super::context::{DispatchError, NodeContext};
use super::types::Node;

use anyhow::{Context, Result};
use axum::extract::{Extension, Path};
use axum::http::{StatusCode, Uri};
use axum::{Router, routing::put};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A running node.
pub struct NodeHandle {
    pub ctx: Arc<NodeContext>,
    server: JoinHandle<Result<()>>,
}

impl NodeHandle {
    pub fn node(&self) -> &Node {
        &self.ctx.node
    }

    /// Stops the server and waits until it has drained.
    pub async fn stop(self) -> Result<()> {
        self.ctx.request_shutdown();
        self.wait().await
    }

    /// Waits for the server to finish (after `status.stop` or [`NodeHandle::stop`]).
    pub async fn wait(self) -> Result<()> {
        self.server.await.context("server task panicked")?
    }
}

pub fn router(ctx: Arc<NodeContext>) -> Router {
    Router::new()
        .route("/:gid/:service/:method", put(handle_call))
        .fallback(handle_bad_path)
        .layer(Extension(ctx))
}

/// Binds the listener and starts serving. Binding failures are returned to
/// the caller, which treats them as fatal.
pub async fn start(config: NodeConfig) -> Result<NodeHandle> {
    let listener = TcpListener::bind((config.ip.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.ip, config.port))?;
    let port = listener.local_addr()?.port();
    let node = Node::new(config.ip.clone(), port);
    let ctx = NodeContext::new(config, node);
    Ok(serve(listener, ctx))
}

/// Serves `ctx` on an already bound listener.
pub fn serve(listener: TcpListener, ctx: Arc<NodeContext>) -> NodeHandle {
    let app = router(ctx.clone());
    let mut shutdown = ctx.shutdown_signal();
    let node = ctx.node.clone();

    tracing::info!("Node {} ({}) listening", node, node.sid());

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow_and_update() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
            .context("server error")?;
        tracing::info!("Node {} stopped", node);
        Ok(())
    });

    NodeHandle { ctx, server }
}

async fn handle_call(
    Extension(ctx): Extension<Arc<NodeContext>>,
    Path((gid, service, method)): Path<(String, String, String)>,
    body: String,
) -> (StatusCode, String) {
    ctx.record_request();

    let args = match ctx.codec.decode_args(&body) {
        Ok(args) => args,
        Err(e) => {
            tracing::warn!("Rejected /{}/{}/{}: {}", gid, service, method, e);
            return (StatusCode::BAD_REQUEST, format!("undecodable body: {}", e));
        }
    };

    tracing::debug!(
        "Dispatching /{}/{}/{} with {} arg(s)",
        gid,
        service,
        method,
        args.len()
    );

    let reply = match ctx.dispatch(&gid, &service, &method, args).await {
        Ok(reply) => reply,
        Err(DispatchError::Route(msg)) => {
            tracing::warn!("Routing failed: {}", msg);
            return (StatusCode::NOT_FOUND, msg);
        }
        Err(DispatchError::Failed(msg)) => {
            tracing::error!("Method failed: {}", msg);
            return (StatusCode::INTERNAL_SERVER_ERROR, msg);
        }
    };

    match ctx.codec.encode(&reply.to_value()) {
        Ok(encoded) => (StatusCode::OK, encoded),
        Err(e) => {
            tracing::error!("Failed to encode reply of /{}/{}/{}: {}", gid, service, method, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("unencodable reply: {}", e),
            )
        }
    }
}

async fn handle_bad_path(uri: Uri) -> (StatusCode, String) {
    (
        StatusCode::BAD_REQUEST,
        format!("expected /{{gid}}/{{service}}/{{method}}, got {}", uri.path()),
    )
}
