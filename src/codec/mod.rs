//! Value Codec
//!
//! Bidirectional mapping between runtime [`Value`]s and the self-describing
//! JSON wire form carried in every request and response body.
//!
//! ## Reference identity
//! The encoder keeps a per-call map from container identity to a generated
//! id. A container seen twice in the same call is emitted once and then
//! referenced with a `register` unit, so shared and cyclic graphs encode in
//! finite space and decode back into the same shape. Identity is never
//! shared across calls: two encodings of one value decode to distinct
//! containers.
//!
//! ## Function payloads
//! `function` units carry a registered name and resolve through the node's
//! [`FunctionRegistry`]. Decoding them is only allowed when the codec is
//! built for trusted peers; only trusted peers should exchange messages
//! that contain functions. `native` units resolve against a fixed table of
//! built-ins and are always accepted.

pub mod functions;
pub mod value;
mod wire;


pub use functions::{FunctionRegistry, NATIVE_NAMES, native};
pub use value::{CallFn, Callable, ErrorValue, Shared, Value};

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use thiserror::Error;

use value::{addr, read, write};
use wire::Wire;

#[derive(Error, Debug, Clone)]
pub enum CodecError {
    #[error("corrupt wire data: {0}")]
    Corrupt(String),

    #[error("unsupported type: {0}")]
    Unsupported(String),

    #[error("function '{0}' rejected: peer is not trusted")]
    Untrusted(String),

    #[error("function evaluation failed: {0}")]
    Function(String),
}

#[derive(Clone)]
pub struct Codec {
    functions: Arc<FunctionRegistry>,
    trusted: bool,
}

impl Codec {
    pub fn new(functions: Arc<FunctionRegistry>, trusted: bool) -> Self {
        Self { functions, trusted }
    }

    /// A codec with an empty registry that rejects function payloads.
    pub fn untrusted() -> Self {
        Self::new(FunctionRegistry::new(), false)
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    pub fn encode(&self, value: &Value) -> Result<String, CodecError> {
        let mut encoder = Encoder {
            codec: self,
            ids: HashMap::new(),
            next_id: 0,
        };
        let wire = encoder.encode(value)?;
        serde_json::to_string(&wire).map_err(|e| CodecError::Unsupported(e.to_string()))
    }

    pub fn decode(&self, wire: &str) -> Result<Value, CodecError> {
        let wire: Wire =
            serde_json::from_str(wire).map_err(|e| CodecError::Corrupt(e.to_string()))?;
        let mut decoder = Decoder {
            codec: self,
            registered: HashMap::new(),
        };
        decoder.decode(wire)
    }

    /// Decodes a request body into an argument list. An empty body is an
    /// empty list; a non-array payload becomes a single argument.
    pub fn decode_args(&self, body: &str) -> Result<Vec<Value>, CodecError> {
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let value = self.decode(body)?;
        Ok(match value.as_vec() {
            Some(items) => items,
            None => vec![value],
        })
    }
}

struct Encoder<'a> {
    codec: &'a Codec,
    ids: HashMap<usize, u64>,
    next_id: u64,
}

impl Encoder<'_> {
    fn fresh_id(&mut self, key: usize) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(key, id);
        id
    }

    fn encode(&mut self, value: &Value) -> Result<Wire, CodecError> {
        Ok(match value {
            Value::Undefined => Wire::Undefined,
            Value::Null => Wire::Null,
            Value::Bool(b) => Wire::Boolean(*b),
            Value::Number(n) => Wire::Number(n.to_string()),
            Value::String(s) => Wire::String(s.clone()),
            Value::Date(ms) => Wire::Date(*ms),
            Value::Error(err) => Wire::Error {
                name: err.name.clone(),
                message: err.message.clone(),
                cause: match &err.cause {
                    Some(cause) => Some(Box::new(self.encode(cause)?)),
                    None => None,
                },
            },
            Value::Array(items) => {
                let key = addr(items);
                if let Some(id) = self.ids.get(&key) {
                    return Ok(Wire::Register(*id));
                }
                let id = self.fresh_id(key);
                let snapshot = read(items).clone();
                let elements = snapshot
                    .iter()
                    .map(|item| self.encode(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Wire::Array { id, elements }
            }
            Value::Object(map) => {
                let key = addr(map);
                if let Some(id) = self.ids.get(&key) {
                    return Ok(Wire::Register(*id));
                }
                let id = self.fresh_id(key);
                let snapshot = read(map).clone();
                let mut entries = Vec::with_capacity(snapshot.len());
                for (k, v) in snapshot.iter() {
                    entries.push((k.clone(), self.encode(v)?));
                }
                Wire::Object { id, entries }
            }
            Value::Function(callable) => {
                if !self.codec.functions.has_function(callable.name()) {
                    return Err(CodecError::Unsupported(format!(
                        "function '{}' is not registered",
                        callable.name()
                    )));
                }
                Wire::Function(callable.name().to_string())
            }
            Value::Native(callable) => {
                if !NATIVE_NAMES.contains(&callable.name()) {
                    return Err(CodecError::Unsupported(format!(
                        "'{}' is not a known native",
                        callable.name()
                    )));
                }
                Wire::Native(callable.name().to_string())
            }
        })
    }
}

struct Decoder<'a> {
    codec: &'a Codec,
    registered: HashMap<u64, Value>,
}

impl Decoder<'_> {
    fn register(&mut self, id: u64, value: Value) -> Result<(), CodecError> {
        if self.registered.insert(id, value).is_some() {
            return Err(CodecError::Corrupt(format!("duplicate container id {}", id)));
        }
        Ok(())
    }

    fn decode(&mut self, wire: Wire) -> Result<Value, CodecError> {
        Ok(match wire {
            Wire::Undefined => Value::Undefined,
            Wire::Null => Value::Null,
            Wire::Boolean(b) => Value::Bool(b),
            Wire::Number(text) => Value::Number(
                text.parse::<f64>()
                    .map_err(|_| CodecError::Corrupt(format!("bad number '{}'", text)))?,
            ),
            Wire::String(s) => Value::String(s),
            Wire::Date(ms) => Value::Date(ms),
            Wire::Error {
                name,
                message,
                cause,
            } => {
                let cause = match cause {
                    Some(cause) => Some(self.decode(*cause)?),
                    None => None,
                };
                Value::Error(Arc::new(ErrorValue {
                    name,
                    message,
                    cause,
                }))
            }
            Wire::Array { id, elements } => {
                let shared: Shared<Vec<Value>> = Arc::new(RwLock::new(Vec::new()));
                self.register(id, Value::Array(shared.clone()))?;
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.decode(element)?);
                }
                *write(&shared) = items;
                Value::Array(shared)
            }
            Wire::Object { id, entries } => {
                let shared: Shared<BTreeMap<String, Value>> =
                    Arc::new(RwLock::new(BTreeMap::new()));
                self.register(id, Value::Object(shared.clone()))?;
                let mut map = BTreeMap::new();
                for (k, v) in entries {
                    map.insert(k, self.decode(v)?);
                }
                *write(&shared) = map;
                Value::Object(shared)
            }
            Wire::Function(name) => {
                if !self.codec.trusted {
                    return Err(CodecError::Untrusted(name));
                }
                self.codec
                    .functions
                    .get(&name)
                    .ok_or_else(|| CodecError::Function(format!("unknown function '{}'", name)))?
            }
            Wire::Native(name) => native(&name)
                .ok_or_else(|| CodecError::Corrupt(format!("unknown native '{}'", name)))?,
            Wire::Register(id) => self
                .registered
                .get(&id)
                .cloned()
                .ok_or_else(|| CodecError::Corrupt(format!("dangling reference {}", id)))?,
        })
    }
}
