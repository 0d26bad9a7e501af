//! `groups`: membership tables.
//!
//! The group variant applies the edit to this node's registry first and
//! then asks every other member of `gid` this node knows, before or after
//! the edit, to apply the same edit. A member added by the edit is first
//! sent the full membership. Members that fail keep their old view; the
//! error map says which.

use super::{arg, str_arg};
use crate::codec::Value;
use crate::error::{Result, RpcError};
use crate::fanout::{Aggregate, Fanout};
use crate::groups::{Group, GroupConfig, group_from_value, group_to_value};
use crate::node::{Call, Node, NodeContext, Reply, Service};

pub fn local() -> Service {
    Service::new("groups")
        .op("get", |call, args| async move { get(&call.ctx, &args) })
        .op("put", |call, args| async move { put(&call.ctx, &args) })
        .op("add", |call, args| async move { add(&call.ctx, &args) })
        .op("rem", |call, args| async move { rem(&call.ctx, &args) })
        .op("del", |call, args| async move { del(&call.ctx, &args) })
}

pub fn group() -> Service {
    Service::new("groups")
        .method("get", |call, args| async move {
            match call.ctx.fanout(&call.gid) {
                Ok(fanout) => fanout.broadcast("groups", "get", args).await.to_reply(),
                Err(e) => Reply::err(e),
            }
        })
        .method("put", |call, args| async move { edit(call, "put", args, put).await })
        .method("add", |call, args| async move { edit(call, "add", args, add).await })
        .method("rem", |call, args| async move { edit(call, "rem", args, rem).await })
        .method("del", |call, args| async move { edit(call, "del", args, del).await })
}

/// Local edit, then the same edit on every other member known here, before
/// or after the edit. Members that joined the context group through this
/// edit first receive its whole membership.
async fn edit(
    call: Call,
    method: &str,
    args: Vec<Value>,
    apply: fn(&NodeContext, &[Value]) -> Result<Value>,
) -> Reply {
    let own_sid = call.ctx.node.sid();
    let before = call.ctx.fanout(&call.gid);
    let own = match apply(&call.ctx, &args) {
        Ok(value) => value,
        Err(e) => return Reply::err(e),
    };
    let after = call.ctx.fanout(&call.gid);

    let old = before.as_ref().map(|f| f.members().clone()).unwrap_or_default();
    let new = after.as_ref().map(|f| f.members().clone()).unwrap_or_default();
    // after a `del` of the context group only the old snapshot is left
    let base = match after.or(before) {
        Ok(fanout) => fanout,
        Err(e) => return Reply::err(e),
    };

    let mut known = old.clone();
    known.extend(new.iter().map(|(sid, node)| (sid.clone(), node.clone())));
    known.remove(&own_sid);
    let joined: Group = known
        .iter()
        .filter(|(sid, _)| !old.contains_key(*sid))
        .map(|(sid, node)| (sid.clone(), node.clone()))
        .collect();
    known.retain(|sid, _| !joined.contains_key(sid));

    let mut aggregate = base
        .clone()
        .with_members(known)
        .broadcast("groups", method, args.clone())
        .await;
    if !joined.is_empty() {
        let handed = hand_over(base, joined, &new, method, args).await;
        aggregate.errors.extend(handed.errors);
        aggregate.values.extend(handed.values);
    }

    if !aggregate.is_ok() {
        tracing::warn!(
            "groups.{} on '{}' did not reach {} member(s)",
            method,
            call.gid,
            aggregate.errors.len()
        );
    }
    aggregate.values.insert(own_sid, own);
    aggregate.to_reply()
}

/// Gives newcomers the context group's membership, then the edit itself.
async fn hand_over(
    base: Fanout,
    joined: Group,
    members: &Group,
    method: &str,
    args: Vec<Value>,
) -> Aggregate {
    let membership = vec![base.config().to_value(), group_to_value(members)];
    let handoff = base
        .clone()
        .with_members(joined.clone())
        .broadcast("groups", "put", membership)
        .await;
    let ready: Group = joined
        .into_iter()
        .filter(|(sid, _)| !handoff.errors.contains_key(sid))
        .collect();
    let mut applied = base
        .with_members(ready)
        .broadcast("groups", method, args)
        .await;
    applied.errors.extend(handoff.errors);
    applied
}

/// `add` on the context group as a group-wide edit.
pub(super) async fn add_member(call: Call, node: &Node) -> Reply {
    let args = vec![Value::string(call.gid.clone()), node.to_value()];
    edit(call, "add", args, add).await
}

fn get(ctx: &NodeContext, args: &[Value]) -> Result<Value> {
    match args.first() {
        None | Some(Value::Null) | Some(Value::Undefined) => Ok(Value::array(
            ctx.groups.gids().into_iter().map(Value::String).collect(),
        )),
        Some(_) => {
            let gid = str_arg(args, 0, "gid")?;
            Ok(group_to_value(&ctx.groups.get(&gid)?))
        }
    }
}

fn put(ctx: &NodeContext, args: &[Value]) -> Result<Value> {
    let config = GroupConfig::from_value(&arg(args, 0))?;
    let members = group_from_value(&arg(args, 1))?;
    Ok(group_to_value(&ctx.groups.put(config, members)?))
}

fn add(ctx: &NodeContext, args: &[Value]) -> Result<Value> {
    let gid = str_arg(args, 0, "gid")?;
    let node = Node::from_value(&arg(args, 1))?;
    Ok(group_to_value(&ctx.groups.add(&gid, node)?))
}

/// Accepts the member's short id or its node record.
fn rem(ctx: &NodeContext, args: &[Value]) -> Result<Value> {
    let gid = str_arg(args, 0, "gid")?;
    let sid = match arg(args, 1) {
        Value::String(sid) => sid,
        node @ Value::Object(_) => Node::from_value(&node)?.sid(),
        other => {
            return Err(RpcError::Validation(format!(
                "expected a node or short id, got {}",
                other.type_name()
            )));
        }
    };
    Ok(group_to_value(&ctx.groups.rem(&gid, &sid)?))
}

fn del(ctx: &NodeContext, args: &[Value]) -> Result<Value> {
    let gid = str_arg(args, 0, "gid")?;
    Ok(group_to_value(&ctx.groups.del(&gid)?))
}
