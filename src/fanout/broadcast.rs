use crate::codec::Value;
use crate::comm::{CommClient, Remote};
use crate::error::{Result, RpcError};
use crate::groups::{Group, GroupConfig};
use crate::node::{Node, NodeContext, Reply};

use futures::future::join_all;
use std::collections::BTreeMap;
use std::time::Duration;

/// Per-member outcome of a broadcast. The two maps never share a key.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    pub errors: BTreeMap<String, RpcError>,
    pub values: BTreeMap<String, Value>,
}

impl Aggregate {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_map(&self) -> Value {
        Value::object(self.errors.iter().map(|(sid, e)| (sid.clone(), e.to_value())))
    }

    pub fn value_map(&self) -> Value {
        Value::object(self.values.iter().map(|(sid, v)| (sid.clone(), v.clone())))
    }

    /// `(errorMap, valueMap)`; both maps are present even when empty.
    pub fn to_reply(&self) -> Reply {
        Reply::pair(self.error_map(), self.value_map())
    }

    /// Reads back an `(errorMap, valueMap)` reply of a group-qualified call.
    pub fn from_reply(reply: Reply) -> Self {
        let errors = reply
            .error
            .as_map()
            .unwrap_or_default()
            .into_iter()
            .map(|(sid, e)| (sid, RpcError::from_value(e)))
            .collect();
        let values = reply.value.as_map().unwrap_or_default();
        Self { errors, values }
    }
}

/// Fan-out over one snapshot of a group's membership.
#[derive(Clone)]
pub struct Fanout {
    gid: String,
    config: GroupConfig,
    members: Group,
    comm: CommClient,
    timeout: Option<Duration>,
}

impl Fanout {
    pub fn new(ctx: &NodeContext, gid: &str) -> Result<Self> {
        Ok(Self {
            gid: gid.to_string(),
            config: ctx.groups.config(gid)?,
            members: ctx.groups.get(gid)?,
            comm: ctx.comm.clone(),
            timeout: ctx.config.fanout_timeout(),
        })
    }

    pub fn gid(&self) -> &str {
        &self.gid
    }

    pub fn members(&self) -> &Group {
        &self.members
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// The same group settings over an explicit member set.
    pub fn with_members(mut self, members: Group) -> Self {
        self.members = members;
        self
    }

    /// The same snapshot minus the member with short id `sid`.
    pub fn without(mut self, sid: &str) -> Self {
        self.members.remove(sid);
        self
    }

    pub fn comm(&self) -> &CommClient {
        &self.comm
    }

    /// Calls `service.method(args)` on the local service of every member.
    pub async fn broadcast(&self, service: &str, method: &str, args: Vec<Value>) -> Aggregate {
        let calls = self.members.iter().map(|(sid, node)| {
            let remote = Remote::new(node.clone(), service, method);
            let args = args.clone();
            async move { (sid.clone(), self.send_bounded(args, &remote).await) }
        });

        let mut aggregate = Aggregate::default();
        for (sid, outcome) in join_all(calls).await {
            match outcome.and_then(Reply::into_result) {
                Ok(value) => {
                    aggregate.values.insert(sid, value);
                }
                Err(e) => {
                    tracing::debug!("{}.{} failed on {}: {}", service, method, sid, e);
                    aggregate.errors.insert(sid, e);
                }
            }
        }

        tracing::debug!(
            "Broadcast {}.{} over '{}': {} ok, {} failed",
            service,
            method,
            self.gid,
            aggregate.values.len(),
            aggregate.errors.len()
        );
        aggregate
    }

    /// Member owning `key` under the group's hash strategy.
    pub fn owner(&self, key: &str) -> Result<Node> {
        self.config.hash.owner(key, &self.members).ok_or_else(|| {
            RpcError::Validation(format!("group '{}' has no members to own '{}'", self.gid, key))
        })
    }

    /// Calls `service.method(args)` on the owner of `key` only.
    pub async fn route(
        &self,
        key: &str,
        service: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        let owner = self.owner(key)?;
        tracing::debug!("Routing {}.{} for '{}' to {}", service, method, key, owner);
        self.comm
            .call(args, &Remote::new(owner, service, method))
            .await
    }

    async fn send_bounded(&self, args: Vec<Value>, remote: &Remote) -> Result<Reply> {
        match self.timeout {
            None => self.comm.send(args, remote).await,
            Some(limit) => tokio::time::timeout(limit, self.comm.send(args, remote))
                .await
                .unwrap_or_else(|_| {
                    Err(RpcError::Transport(format!(
                        "{} did not answer within {:?}",
                        remote.node, limit
                    )))
                }),
        }
    }
}
