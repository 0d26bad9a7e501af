use super::types::{Group, GroupConfig};
use crate::error::{Result, RpcError};
use crate::node::{ALL_GID, LOCAL_GID, Node};
use crate::storage::HashStrategy;

use dashmap::DashMap;

#[derive(Debug, Clone)]
struct GroupEntry {
    config: GroupConfig,
    members: Group,
}

/// Local membership tables of one node.
pub struct GroupRegistry {
    groups: DashMap<String, GroupEntry>,
    default_hash: HashStrategy,
}

impl GroupRegistry {
    /// Creates a registry whose `all` group holds only `local`.
    pub fn new(local: &Node, default_hash: HashStrategy) -> Self {
        let groups = DashMap::new();
        let mut members = Group::new();
        members.insert(local.sid(), local.clone());
        groups.insert(
            ALL_GID.to_string(),
            GroupEntry {
                config: GroupConfig::new(ALL_GID).with_hash(default_hash),
                members,
            },
        );
        Self {
            groups,
            default_hash,
        }
    }

    pub fn contains(&self, gid: &str) -> bool {
        self.groups.contains_key(gid)
    }

    pub fn gids(&self) -> Vec<String> {
        let mut gids: Vec<String> = self.groups.iter().map(|e| e.key().clone()).collect();
        gids.sort();
        gids
    }

    pub fn get(&self, gid: &str) -> Result<Group> {
        self.groups
            .get(gid)
            .map(|entry| entry.members.clone())
            .ok_or_else(|| RpcError::NotFound(format!("group '{}' not found", gid)))
    }

    pub fn config(&self, gid: &str) -> Result<GroupConfig> {
        self.groups
            .get(gid)
            .map(|entry| entry.config.clone())
            .ok_or_else(|| RpcError::NotFound(format!("group '{}' not found", gid)))
    }

    /// Replaces the membership of `config.gid` wholesale.
    ///
    /// Members are also merged into `all`.
    pub fn put(&self, config: GroupConfig, members: Group) -> Result<Group> {
        if config.gid.is_empty() || config.gid == LOCAL_GID {
            return Err(RpcError::Validation(format!(
                "'{}' cannot be used as a group id",
                config.gid
            )));
        }
        let gid = config.gid.clone();
        self.groups.insert(
            gid.clone(),
            GroupEntry {
                config,
                members: members.clone(),
            },
        );
        if gid != ALL_GID {
            self.merge_into_all(members.values().cloned());
        }
        tracing::info!("Group '{}' now has {} member(s)", gid, members.len());
        Ok(members)
    }

    /// Adds `node` to `gid`, creating the group with the default strategy
    /// if this node has not heard of it yet.
    pub fn add(&self, gid: &str, node: Node) -> Result<Group> {
        if gid.is_empty() || gid == LOCAL_GID {
            return Err(RpcError::Validation(format!(
                "'{}' cannot be used as a group id",
                gid
            )));
        }
        let members = {
            let mut entry = self
                .groups
                .entry(gid.to_string())
                .or_insert_with(|| GroupEntry {
                    config: GroupConfig::new(gid).with_hash(self.default_hash),
                    members: Group::new(),
                });
            entry.members.insert(node.sid(), node.clone());
            entry.members.clone()
        };
        if gid != ALL_GID {
            self.merge_into_all(std::iter::once(node.clone()));
        }
        tracing::debug!("Added {} to group '{}'", node, gid);
        Ok(members)
    }

    /// Removes the member with short id `sid`. Removing an absent member is
    /// not an error.
    pub fn rem(&self, gid: &str, sid: &str) -> Result<Group> {
        let mut entry = self
            .groups
            .get_mut(gid)
            .ok_or_else(|| RpcError::NotFound(format!("group '{}' not found", gid)))?;
        if entry.members.remove(sid).is_some() {
            tracing::debug!("Removed {} from group '{}'", sid, gid);
        }
        Ok(entry.members.clone())
    }

    /// Drops the group and returns its last membership.
    pub fn del(&self, gid: &str) -> Result<Group> {
        if gid == ALL_GID {
            return Err(RpcError::Validation("the 'all' group cannot be deleted".into()));
        }
        self.groups
            .remove(gid)
            .map(|(_, entry)| entry.members)
            .ok_or_else(|| RpcError::NotFound(format!("group '{}' not found", gid)))
    }

    fn merge_into_all(&self, nodes: impl Iterator<Item = Node>) {
        if let Some(mut all) = self.groups.get_mut(ALL_GID) {
            for node in nodes {
                all.members.insert(node.sid(), node);
            }
        }
    }
}
