use crate::codec::Value;
use crate::error::{Result, RpcError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex chars kept in a short id.
pub const SID_LEN: usize = 5;

/// Gid that bypasses group lookup and fan-out.
pub const LOCAL_GID: &str = "local";

/// Group every node belongs to.
pub const ALL_GID: &str = "all";

/// SHA-256 of `input`, lowercase hex.
pub fn content_hash(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Full node identifier: content hash of the node's address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn short(&self) -> String {
        self.0.chars().take(SID_LEN).collect()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An addressable runtime process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Node {
    pub ip: String,
    pub port: u16,
}

impl Node {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    pub fn nid(&self) -> NodeId {
        let canonical = serde_json::json!({ "ip": self.ip, "port": self.port });
        NodeId(content_hash(&canonical.to_string()))
    }

    pub fn sid(&self) -> String {
        self.nid().short()
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }

    pub fn to_value(&self) -> Value {
        Value::object([
            ("ip", Value::string(self.ip.clone())),
            ("port", Value::from(self.port)),
        ])
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        from_value(value).map_err(|e| RpcError::Validation(format!("invalid node: {}", e)))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Deserializes a plain (acyclic, function-free) value into a typed DTO.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T> {
    let json = value.to_json()?;
    serde_json::from_value(json).map_err(|e| RpcError::Validation(e.to_string()))
}

/// Serializes a typed DTO into a value.
pub fn to_value<T: Serialize>(data: &T) -> Value {
    serde_json::to_value(data)
        .map(Value::from_json)
        .unwrap_or(Value::Null)
}

/// The `(error, value)` pair every method produces.
///
/// For `local` calls `error` is a single error value or null. For group
/// calls the fan-out layer fills both slots with maps keyed by short id.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub error: Value,
    pub value: Value,
}

impl Reply {
    pub fn ok(value: impl Into<Value>) -> Self {
        Self {
            error: Value::Null,
            value: value.into(),
        }
    }

    pub fn err(error: RpcError) -> Self {
        Self {
            error: error.to_value(),
            value: Value::Null,
        }
    }

    pub fn pair(error: Value, value: Value) -> Self {
        Self { error, value }
    }

    pub fn from_result(result: Result<Value>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(e) => Self::err(e),
        }
    }

    /// An empty error map (a fan-out where nobody failed) is not an error.
    pub fn is_err(&self) -> bool {
        match &self.error {
            Value::Object(_) => self.error.as_map().is_some_and(|m| !m.is_empty()),
            other => !other.is_nullish(),
        }
    }

    pub fn into_result(self) -> Result<Value> {
        if self.is_err() {
            Err(RpcError::from_value(self.error))
        } else {
            Ok(self.value)
        }
    }

    pub fn to_value(&self) -> Value {
        Value::pair(self.error.clone(), self.value.clone())
    }

    /// Interprets a decoded response body: a two-element array is taken as
    /// the `(error, value)` pair, anything else as a bare value.
    pub fn from_value(value: Value) -> Self {
        match value.as_vec() {
            Some(items) if items.len() == 2 => {
                let mut items = items.into_iter();
                let error = items.next().unwrap_or(Value::Null);
                let value = items.next().unwrap_or(Value::Null);
                Self { error, value }
            }
            _ => Self::ok(value),
        }
    }
}
