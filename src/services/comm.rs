//! `comm`: relay calls through this node.

use super::arg;
use crate::codec::Value;
use crate::comm::Remote;
use crate::error::{Result, RpcError};
use crate::node::{Reply, Service};

pub fn local() -> Service {
    Service::new("comm").method("send", |call, args| async move {
        let relay = async {
            let message = message_arg(&arg(&args, 0))?;
            let remote = Remote::from_value(&arg(&args, 1))?;
            call.ctx.comm.send(message, &remote).await
        };
        // The target's reply is handed back as-is.
        relay.await.unwrap_or_else(Reply::err)
    })
}

pub fn group() -> Service {
    Service::new("comm").method("send", |call, args| async move {
        let (message, service, method) = match broadcast_target(&args) {
            Ok(parts) => parts,
            Err(e) => return Reply::err(e),
        };
        match call.ctx.fanout(&call.gid) {
            Ok(fanout) => fanout.broadcast(&service, &method, message).await.to_reply(),
            Err(e) => Reply::err(e),
        }
    })
}

/// `(message, {service, method})` of a group-wide send.
fn broadcast_target(args: &[Value]) -> Result<(Vec<Value>, String, String)> {
    let message = message_arg(&arg(args, 0))?;
    let target = arg(args, 1);
    let field = |name: &str| -> Result<String> {
        target
            .get(name)
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| RpcError::Validation(format!("target is missing '{}'", name)))
    };
    Ok((message, field("service")?, field("method")?))
}

fn message_arg(message: &Value) -> Result<Vec<Value>> {
    match message {
        Value::Undefined | Value::Null => Ok(Vec::new()),
        other => other.as_vec().ok_or_else(|| {
            RpcError::Validation(format!(
                "message must be an argument array, got {}",
                other.type_name()
            ))
        }),
    }
}
