//! Function Registry
//!
//! Maps names to Rust closures so map/reduce code can travel between
//! trusted peers as a name instead of source text. Nodes only accept
//! function values whose name is registered locally, which keeps the set
//! of executable payloads closed.

use super::value::{CallFn, Callable, Value};

use dashmap::DashMap;
use std::sync::Arc;

pub struct FunctionRegistry {
    functions: DashMap<String, CallFn>,
}

impl FunctionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            functions: DashMap::new(),
        })
    }

    /// Registers `f` under `name`, replacing any previous entry.
    pub fn register<F>(&self, name: &str, f: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(f));
        tracing::debug!("Registered function: {}", name);
    }

    /// Returns a function value bound to the registered closure.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.callable(name).map(Value::Function)
    }

    pub fn callable(&self, name: &str) -> Option<Callable> {
        self.functions
            .get(name)
            .map(|entry| Callable::new(name, entry.value().clone()))
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn list_functions(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self {
            functions: DashMap::new(),
        }
    }
}

/// Names of the built-ins every node understands.
pub const NATIVE_NAMES: [&str; 5] = ["identity", "length", "sum", "concat", "keys"];

/// Resolves a built-in by name.
pub fn native(name: &str) -> Option<Value> {
    let f: CallFn = match name {
        "identity" => Arc::new(|args: Vec<Value>| -> Result<Value, Value> {
            Ok(args.into_iter().next().unwrap_or(Value::Undefined))
        }),
        "length" => Arc::new(|args: Vec<Value>| -> Result<Value, Value> {
            match args.first() {
                Some(Value::String(s)) => Ok(Value::from(s.chars().count())),
                Some(v @ Value::Array(_)) => Ok(Value::from(v.as_vec().unwrap_or_default().len())),
                Some(v @ Value::Object(_)) => Ok(Value::from(v.as_map().unwrap_or_default().len())),
                _ => Err(Value::error("TypeError", "length expects a string, array or object")),
            }
        }),
        "sum" => Arc::new(|args: Vec<Value>| -> Result<Value, Value> {
            let items = if matches!(args.first(), Some(Value::Array(_))) {
                args[0].as_vec().unwrap_or_default()
            } else {
                args
            };
            items
                .iter()
                .map(|v| {
                    v.as_f64()
                        .ok_or_else(|| Value::error("TypeError", "sum expects numbers"))
                })
                .sum::<Result<f64, Value>>()
                .map(Value::Number)
        }),
        "concat" => Arc::new(|args: Vec<Value>| -> Result<Value, Value> {
            let mut out = Vec::new();
            for arg in args {
                match arg.as_vec() {
                    Some(items) => out.extend(items),
                    None => out.push(arg),
                }
            }
            Ok(Value::array(out))
        }),
        "keys" => Arc::new(|args: Vec<Value>| -> Result<Value, Value> {
            match args.first().and_then(Value::as_map) {
                Some(map) => Ok(Value::array(map.into_keys().map(Value::String).collect())),
                None => Err(Value::error("TypeError", "keys expects an object")),
            }
        }),
        _ => return None,
    };
    Some(Value::Native(Callable::new(name, f)))
}
