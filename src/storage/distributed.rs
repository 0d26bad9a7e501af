use super::protocol::{BulkAppendRequest, StoreKey};
use crate::codec::Value;
use crate::comm::Remote;
use crate::error::{Result, RpcError};
use crate::fanout::{Aggregate, Fanout};
use crate::node::{NodeContext, content_hash};

use futures::future::join_all;
use std::collections::BTreeMap;

/// Group-wide view of a `mem` or `store` service: keyed operations go to the
/// key's owner, enumeration goes to every member.
#[derive(Clone)]
pub struct DistributedStore {
    fanout: Fanout,
    service: String,
}

impl DistributedStore {
    pub fn new(ctx: &NodeContext, gid: &str, service: &str) -> Result<Self> {
        Ok(Self {
            fanout: ctx.fanout(gid)?,
            service: service.to_string(),
        })
    }

    pub fn gid(&self) -> &str {
        self.fanout.gid()
    }

    pub fn fanout(&self) -> &Fanout {
        &self.fanout
    }

    fn key_arg(&self, key: &str) -> Value {
        StoreKey::new(Some(key), self.gid()).to_value()
    }

    pub async fn get(&self, key: &str) -> Result<Value> {
        self.fanout
            .route(key, &self.service, "get", vec![self.key_arg(key)])
            .await
    }

    /// Union of every member's local keys plus the members that failed.
    pub async fn keys(&self) -> (BTreeMap<String, RpcError>, Vec<String>) {
        let arg = StoreKey::new(None, self.gid()).to_value();
        let aggregate = self.fanout.broadcast(&self.service, "get", vec![arg]).await;
        let mut keys: Vec<String> = aggregate
            .values
            .values()
            .filter_map(Value::as_vec)
            .flatten()
            .filter_map(|key| key.as_str().map(str::to_string))
            .collect();
        keys.sort();
        keys.dedup();
        (aggregate.errors, keys)
    }

    /// Stores `value` on the owner of `key`. Without a key, the key is the
    /// content hash of the encoded value, derived here so routing and storage
    /// agree on it.
    pub async fn put(&self, value: Value, key: Option<&str>) -> Result<Value> {
        let key = match key {
            Some(key) => key.to_string(),
            None => content_hash(&self.fanout.comm().codec().encode(&value)?),
        };
        self.fanout
            .route(&key, &self.service, "put", vec![value, self.key_arg(&key)])
            .await
    }

    pub async fn del(&self, key: &str) -> Result<Value> {
        self.fanout
            .route(key, &self.service, "del", vec![self.key_arg(key)])
            .await
    }

    /// Appends `value` to `bucket` on the node owning `route_key`.
    pub async fn append(&self, value: Value, bucket: &str, route_key: &str) -> Result<Value> {
        self.append_in(self.gid(), value, bucket, route_key).await
    }

    /// Like [`DistributedStore::append`], but into `namespace` on the owner
    /// instead of the group's own one. Placement still follows this group.
    pub async fn append_in(
        &self,
        namespace: &str,
        value: Value,
        bucket: &str,
        route_key: &str,
    ) -> Result<Value> {
        let key = StoreKey::new(Some(bucket), namespace).to_value();
        self.fanout
            .route(route_key, &self.service, "append", vec![value, key])
            .await
    }

    /// Splits the batches by the owner of each prefix and sends one
    /// `bulk_append` per owner.
    pub async fn bulk_append(&self, request: BulkAppendRequest) -> Aggregate {
        let mut per_owner: BTreeMap<String, (crate::node::Node, BulkAppendRequest)> =
            BTreeMap::new();
        let mut aggregate = Aggregate::default();

        for (prefix, batch) in request.prefix_batches {
            let owner = match self.fanout.owner(&prefix) {
                Ok(owner) => owner,
                Err(e) => {
                    aggregate.errors.insert(prefix, e);
                    continue;
                }
            };
            let (_, slice) = per_owner.entry(owner.sid()).or_insert_with(|| {
                (
                    owner.clone(),
                    BulkAppendRequest {
                        gid: Some(self.gid().to_string()),
                        prefix_batches: BTreeMap::new(),
                    },
                )
            });
            slice.prefix_batches.insert(prefix, batch);
        }

        let comm = self.fanout.comm();
        let calls = per_owner.into_iter().map(|(sid, (node, slice))| async move {
            let remote = Remote::new(node, &self.service, "bulk_append");
            (sid, comm.call(vec![slice.to_value()], &remote).await)
        });
        for (sid, outcome) in join_all(calls).await {
            match outcome {
                Ok(value) => {
                    aggregate.values.insert(sid, value);
                }
                Err(e) => {
                    aggregate.errors.insert(sid, e);
                }
            }
        }
        aggregate
    }
}
