use crate::codec::Value;
use crate::error::{Result, RpcError};
use crate::node::{Node, from_value};
use crate::storage::HashStrategy;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Membership of one group, keyed by short id.
pub type Group = BTreeMap<String, Node>;

/// Per-group settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub gid: String,
    #[serde(default)]
    pub hash: HashStrategy,
}

impl GroupConfig {
    pub fn new(gid: impl Into<String>) -> Self {
        Self {
            gid: gid.into(),
            hash: HashStrategy::default(),
        }
    }

    pub fn with_hash(mut self, hash: HashStrategy) -> Self {
        self.hash = hash;
        self
    }

    /// Accepts either a bare gid string or `{gid, hash}`.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(gid) => Ok(Self::new(gid.clone())),
            Value::Object(_) => from_value(value),
            other => Err(RpcError::Validation(format!(
                "group config must be a gid or {{gid, hash}}, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::object([
            ("gid", Value::string(self.gid.clone())),
            ("hash", Value::string(self.hash.to_string())),
        ])
    }
}

/// Builds a group from a list of nodes, keying each by its short id.
/// On a short-id collision the later node wins.
pub fn group_of(nodes: impl IntoIterator<Item = Node>) -> Group {
    nodes.into_iter().map(|node| (node.sid(), node)).collect()
}

pub fn group_to_value(group: &Group) -> Value {
    Value::object(group.iter().map(|(sid, node)| (sid.clone(), node.to_value())))
}

/// Parses `{sid: node}`; the given sids are kept as-is.
pub fn group_from_value(value: &Value) -> Result<Group> {
    if value.is_nullish() {
        return Ok(Group::new());
    }
    let entries = value.as_map().ok_or_else(|| {
        RpcError::Validation(format!("group must be an object, got {}", value.type_name()))
    })?;
    entries
        .iter()
        .map(|(sid, node)| Ok((sid.clone(), Node::from_value(node)?)))
        .collect()
}
