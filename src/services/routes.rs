//! `routes`: inspect and edit the routing table at runtime.

use super::{arg, str_arg};
use crate::codec::{Callable, Value};
use crate::error::{Result, RpcError};
use crate::node::{LOCAL_GID, NodeContext, Reply, Service};

use std::collections::BTreeMap;

pub fn local() -> Service {
    Service::new("routes")
        .op("get", |call, args| async move { get(&call.ctx, &arg(&args, 0)) })
        .op("put", |call, args| async move { put(&call.ctx, &args) })
        .op("rem", |call, args| async move { rem(&call.ctx, &args) })
}

pub fn group() -> Service {
    let broadcast = |method: &'static str| {
        move |call: crate::node::Call, args: Vec<Value>| async move {
            match call.ctx.fanout(&call.gid) {
                Ok(fanout) => fanout.broadcast("routes", method, args).await.to_reply(),
                Err(e) => Reply::err(e),
            }
        }
    };
    Service::new("routes")
        .method("get", broadcast("get"))
        .method("put", broadcast("put"))
        .method("rem", broadcast("rem"))
}

/// Method names of a service, looked up by name or `{service, gid}`.
fn get(ctx: &NodeContext, target: &Value) -> Result<Value> {
    let (service, gid) = match target {
        Value::String(name) => (name.clone(), LOCAL_GID.to_string()),
        Value::Object(_) => {
            let service = target
                .get("service")
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| RpcError::Validation("missing 'service'".into()))?;
            let gid = target
                .get("gid")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| LOCAL_GID.to_string());
            (service, gid)
        }
        Value::Null | Value::Undefined => {
            return Ok(Value::array(
                ctx.routes.local_names().into_iter().map(Value::String).collect(),
            ));
        }
        other => {
            return Err(RpcError::Validation(format!(
                "expected a service name, got {}",
                other.type_name()
            )));
        }
    };
    let found = ctx
        .routes
        .get(&gid, &service)
        .ok_or_else(|| RpcError::NotFound(format!("service '{}' not found in '{}'", service, gid)))?;
    Ok(Value::array(
        found.method_names().into_iter().map(Value::String).collect(),
    ))
}

fn rem(ctx: &NodeContext, args: &[Value]) -> Result<Value> {
    let name = str_arg(args, 0, "name")?;
    let removed = ctx.routes.rem(&name)?;
    Ok(Value::array(
        removed.method_names().into_iter().map(Value::String).collect(),
    ))
}

/// Registers `args[0]`, an object of function values, under `args[1]`.
fn put(ctx: &NodeContext, args: &[Value]) -> Result<Value> {
    let name = str_arg(args, 1, "name")?;
    let members = arg(args, 0).as_map().ok_or_else(|| {
        RpcError::Validation("service must be an object of functions".into())
    })?;

    let mut methods: BTreeMap<String, Callable> = BTreeMap::new();
    for (method, value) in members {
        let callable = value.as_callable().cloned().ok_or_else(|| {
            RpcError::Validation(format!(
                "member '{}' of service '{}' is a {}, not a function",
                method,
                name,
                value.type_name()
            ))
        })?;
        methods.insert(method, callable);
    }

    let service = Service::from_functions(&name, methods);
    let names = service.method_names();
    ctx.routes.put(service)?;
    Ok(Value::array(names.into_iter().map(Value::String).collect()))
}
