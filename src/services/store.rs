//! `mem` and `store`: the two key/value services.
//!
//! Both share one implementation; `mem` is backed by the node's in-memory
//! store and `store` by its on-disk one.

use super::arg;
use crate::codec::Value;
use crate::error::{Result, RpcError};
use crate::node::{Call, LOCAL_GID, NodeContext, Reply, Service, to_value};
use crate::storage::shard::shard_namespace;
use crate::storage::{BulkAppendRequest, DistributedStore, LocalStore, MergeStats, PrefixShard, StoreKey};

pub const MEM: &str = "mem";
pub const STORE: &str = "store";

/// The local store behind service `name`.
pub fn backing<'a>(ctx: &'a NodeContext, name: &str) -> &'a LocalStore {
    if name == MEM { &ctx.mem } else { &ctx.store }
}

pub fn local(name: &'static str) -> Service {
    Service::new(name)
        .op("get", move |call, args| async move {
            let key = StoreKey::from_value(args.first(), LOCAL_GID)?;
            let store = backing(&call.ctx, name);
            match &key.key {
                Some(k) => store.get(&key.gid, k).await,
                None => Ok(Value::array(
                    store.keys(&key.gid).await?.into_iter().map(Value::String).collect(),
                )),
            }
        })
        .op("put", move |call, args| async move {
            let value = arg(&args, 0);
            let key = StoreKey::from_value(args.get(1), LOCAL_GID)?;
            backing(&call.ctx, name)
                .put(&key.gid, key.key.as_deref(), value.clone())
                .await?;
            Ok::<_, RpcError>(value)
        })
        .op("del", move |call, args| async move {
            let key = StoreKey::from_value(args.first(), LOCAL_GID)?;
            backing(&call.ctx, name).del(&key.gid, key.require_key()?).await
        })
        .op("append", move |call, args| async move {
            let value = arg(&args, 0);
            let key = StoreKey::from_value(args.get(1), LOCAL_GID)?;
            backing(&call.ctx, name)
                .append(&key.gid, key.require_key()?, value)
                .await
        })
        .op("bulk_append", move |call, args| async move {
            let request = BulkAppendRequest::from_value(&arg(&args, 0))?;
            let stats = bulk_append(backing(&call.ctx, name), request).await?;
            Ok::<_, RpcError>(to_value(&stats))
        })
}

pub fn group(name: &'static str) -> Service {
    Service::new(name)
        .method("get", move |call, args| async move {
            let outcome = async {
                let store = distributed(&call, name)?;
                let key = StoreKey::from_value(args.first(), &call.gid)?;
                Ok::<_, RpcError>(match key.key {
                    Some(k) => Reply::from_result(store.get(&k).await),
                    None => {
                        let (errors, keys) = store.keys().await;
                        let errors = Value::object(
                            errors.into_iter().map(|(sid, e)| (sid, e.to_value())),
                        );
                        Reply::pair(errors, Value::array(keys.into_iter().map(Value::String).collect()))
                    }
                })
            };
            outcome.await.unwrap_or_else(Reply::err)
        })
        .op("put", move |call, args| async move {
            let key = StoreKey::from_value(args.get(1), &call.gid)?;
            distributed(&call, name)?
                .put(arg(&args, 0), key.key.as_deref())
                .await
        })
        .op("del", move |call, args| async move {
            let key = StoreKey::from_value(args.first(), &call.gid)?;
            distributed(&call, name)?.del(key.require_key()?).await
        })
        .op("append", move |call, args| async move {
            let key = StoreKey::from_value(args.get(1), &call.gid)?;
            let bucket = key.require_key()?;
            distributed(&call, name)?
                .append(arg(&args, 0), bucket, bucket)
                .await
        })
        .method("bulk_append", move |call, args| async move {
            let outcome = async {
                let request = BulkAppendRequest::from_value(&arg(&args, 0))?;
                Ok::<_, RpcError>(distributed(&call, name)?.bulk_append(request).await.to_reply())
            };
            outcome.await.unwrap_or_else(Reply::err)
        })
}

fn distributed(call: &Call, name: &str) -> Result<DistributedStore> {
    DistributedStore::new(&call.ctx, &call.gid, name)
}

/// Merges every prefix batch into its shard in `store`.
pub async fn bulk_append(store: &LocalStore, request: BulkAppendRequest) -> Result<MergeStats> {
    let namespace = shard_namespace(request.gid.as_deref().unwrap_or(LOCAL_GID));
    let mut stats = MergeStats::default();
    for (prefix, batch) in request.prefix_batches {
        let mut merged = MergeStats::default();
        store
            .update(&namespace, &prefix, |current| {
                let mut shard = match current {
                    Some(value) => PrefixShard::from_value(&value)?,
                    None => PrefixShard::default(),
                };
                merged = shard.merge(batch);
                Ok(shard.to_value())
            })
            .await?;
        stats.absorb(merged);
    }
    tracing::debug!(
        "Merged {} prefix shard(s) in '{}': {} new, {} refreshed posting(s)",
        stats.prefixes,
        namespace,
        stats.new_postings,
        stats.updated_postings
    );
    Ok(stats)
}
