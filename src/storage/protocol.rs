//! Argument shapes accepted by the `mem` and `store` services.
//!
//! Every keyed method takes the key as its last argument, either a bare
//! string, `null`, or `{key, gid}`.

use crate::codec::Value;
use crate::error::{Result, RpcError};
use crate::node::{LOCAL_GID, from_value};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parsed `key` / `{key, gid}` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKey {
    pub key: Option<String>,
    pub gid: String,
}

impl StoreKey {
    pub fn new(key: Option<&str>, gid: &str) -> Self {
        Self {
            key: key.map(str::to_string),
            gid: gid.to_string(),
        }
    }

    /// `default_gid` applies when the argument does not name one.
    pub fn from_value(value: Option<&Value>, default_gid: &str) -> Result<Self> {
        let gid = default_gid.to_string();
        match value {
            None | Some(Value::Null) | Some(Value::Undefined) => Ok(Self { key: None, gid }),
            Some(Value::String(key)) => Ok(Self {
                key: Some(key.clone()),
                gid,
            }),
            Some(obj @ Value::Object(_)) => {
                let key = match obj.get("key") {
                    None | Some(Value::Null) | Some(Value::Undefined) => None,
                    Some(Value::String(key)) => Some(key),
                    Some(other) => {
                        return Err(RpcError::Validation(format!(
                            "key must be a string, got {}",
                            other.type_name()
                        )));
                    }
                };
                let gid = match obj.get("gid") {
                    Some(Value::String(gid)) => gid,
                    _ => gid,
                };
                Ok(Self { key, gid })
            }
            Some(other) => Err(RpcError::Validation(format!(
                "key must be a string or {{key, gid}}, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::object([
            ("key", self.key.clone().into()),
            ("gid", Value::string(self.gid.clone())),
        ])
    }

    pub fn require_key(&self) -> Result<&str> {
        self.key
            .as_deref()
            .ok_or_else(|| RpcError::Validation("a key is required".into()))
    }
}

impl Default for StoreKey {
    fn default() -> Self {
        Self::new(None, LOCAL_GID)
    }
}

/// One document's entry under a term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub document: String,
    #[serde(default)]
    pub frequency: u64,
    /// Extra per-posting fields (title, positions, ...) kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// term -> postings
pub type TermBatch = BTreeMap<String, Vec<Posting>>;

/// Payload of `bulk_append`: prefix -> term -> postings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkAppendRequest {
    #[serde(default)]
    pub gid: Option<String>,
    #[serde(rename = "prefixBatches", default)]
    pub prefix_batches: BTreeMap<String, TermBatch>,
}

impl BulkAppendRequest {
    pub fn from_value(value: &Value) -> Result<Self> {
        from_value(value)
    }

    pub fn to_value(&self) -> Value {
        crate::node::to_value(self)
    }
}

/// What one `bulk_append` did on the node that ran it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    pub prefixes: u64,
    pub terms: u64,
    pub new_postings: u64,
    pub updated_postings: u64,
}

impl MergeStats {
    pub fn absorb(&mut self, other: MergeStats) {
        self.prefixes += other.prefixes;
        self.terms += other.terms;
        self.new_postings += other.new_postings;
        self.updated_postings += other.updated_postings;
    }
}
