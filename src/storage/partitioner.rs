//! Key placement.
//!
//! Every strategy is a pure function of `(kid, member NIDs)`: writer and
//! reader derive the same owner independently, with no directory lookup.

use crate::groups::Group;
use crate::node::{Node, NodeId, content_hash};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashStrategy {
    /// `kid mod N` over lexicographically sorted NIDs.
    #[default]
    Naive,
    /// First NID clockwise from `kid` on the ring.
    Consistent,
    /// Member with the highest `hash(kid ++ nid)`.
    Rendezvous,
}

impl HashStrategy {
    /// Picks the owner of `kid` among `nids`. `None` only when `nids` is empty.
    pub fn pick(&self, kid: &NodeId, nids: &[NodeId]) -> Option<NodeId> {
        match self {
            HashStrategy::Naive => naive_hash(kid, nids),
            HashStrategy::Consistent => consistent_hash(kid, nids),
            HashStrategy::Rendezvous => rendezvous_hash(kid, nids),
        }
    }

    /// Resolves the member of `group` that owns `key`.
    pub fn owner(&self, key: &str, group: &Group) -> Option<Node> {
        let kid = key_id(key);
        let nids: Vec<NodeId> = group.values().map(Node::nid).collect();
        let owner = self.pick(&kid, &nids)?;
        group.values().find(|node| node.nid() == owner).cloned()
    }
}

impl fmt::Display for HashStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HashStrategy::Naive => "naive",
            HashStrategy::Consistent => "consistent",
            HashStrategy::Rendezvous => "rendezvous",
        })
    }
}

impl FromStr for HashStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "naive" => Ok(HashStrategy::Naive),
            "consistent" => Ok(HashStrategy::Consistent),
            "rendezvous" => Ok(HashStrategy::Rendezvous),
            other => Err(format!("unknown hash strategy '{}'", other)),
        }
    }
}

/// Key id: content hash of the key.
pub fn key_id(key: &str) -> NodeId {
    NodeId(content_hash(key))
}

/// `hex mod n` over the full 256-bit id, without precision loss.
fn hex_mod(hex: &str, n: usize) -> usize {
    hex.chars()
        .filter_map(|c| c.to_digit(16))
        .fold(0usize, |acc, digit| (acc * 16 + digit as usize) % n)
}

fn sorted(nids: &[NodeId]) -> Vec<NodeId> {
    let mut sorted = nids.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
}

pub fn naive_hash(kid: &NodeId, nids: &[NodeId]) -> Option<NodeId> {
    let nids = sorted(nids);
    if nids.is_empty() {
        return None;
    }
    Some(nids[hex_mod(&kid.0, nids.len())].clone())
}

/// Ids are equal-length lowercase hex, so string order is numeric order.
pub fn consistent_hash(kid: &NodeId, nids: &[NodeId]) -> Option<NodeId> {
    let ring = sorted(nids);
    ring.iter()
        .find(|nid| *nid >= kid)
        .or_else(|| ring.first())
        .cloned()
}

pub fn rendezvous_hash(kid: &NodeId, nids: &[NodeId]) -> Option<NodeId> {
    sorted(nids)
        .into_iter()
        .max_by_key(|nid| content_hash(&format!("{}{}", kid.0, nid.0)))
}
