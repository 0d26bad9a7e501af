//! Runtime values exchanged between nodes.
//!
//! Arrays and objects are shared, interior-mutable containers so a value
//! graph may contain cycles and several references to the same container.
//! Cloning a container value clones the handle, not the contents.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::CodecError;

pub type Shared<T> = Arc<RwLock<T>>;

/// Signature shared by registered functions and natives.
pub type CallFn = Arc<dyn Fn(Vec<Value>) -> Result<Value, Value> + Send + Sync>;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    Error(Arc<ErrorValue>),
    Array(Shared<Vec<Value>>),
    Object(Shared<BTreeMap<String, Value>>),
    /// A job function resolved through the node's function registry.
    Function(Callable),
    /// A well-known built-in referenced by name.
    Native(Callable),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
    pub cause: Option<Value>,
}

/// A named callable. The name is what travels over the wire.
#[derive(Clone)]
pub struct Callable {
    name: String,
    f: CallFn,
}

impl Callable {
    pub fn new(name: impl Into<String>, f: CallFn) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: Vec<Value>) -> Result<Value, Value> {
        (self.f)(args)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function: {}]", self.name)
    }
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn addr<T>(shared: &Shared<T>) -> usize {
    Arc::as_ptr(shared) as *const () as usize
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(RwLock::new(items)))
    }

    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect::<BTreeMap<_, _>>();
        Value::Object(Arc::new(RwLock::new(map)))
    }

    pub fn empty_object() -> Self {
        Value::Object(Arc::new(RwLock::new(BTreeMap::new())))
    }

    pub fn error(name: &str, message: &str) -> Self {
        Value::Error(Arc::new(ErrorValue {
            name: name.to_string(),
            message: message.to_string(),
            cause: None,
        }))
    }

    pub fn error_with_cause(name: &str, message: &str, cause: Value) -> Self {
        Value::Error(Arc::new(ErrorValue {
            name: name.to_string(),
            message: message.to_string(),
            cause: Some(cause),
        }))
    }

    /// `(error, value)` pair as sent in every response body.
    pub fn pair(error: Value, value: Value) -> Self {
        Value::array(vec![error, value])
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Snapshot of an array's elements.
    pub fn as_vec(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(read(items).clone()),
            _ => None,
        }
    }

    /// Snapshot of an object's entries.
    pub fn as_map(&self) -> Option<BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(read(map).clone()),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Value::Function(c) | Value::Native(c) => Some(c),
            _ => None,
        }
    }

    /// Member lookup on objects.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(map) => read(map).get(key).cloned(),
            _ => None,
        }
    }

    /// Inserts into an object; no-op on anything else.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        if let Value::Object(map) = self {
            write(map).insert(key.into(), value);
        }
    }

    /// Appends to an array; no-op on anything else.
    pub fn push(&self, value: Value) {
        if let Value::Array(items) = self {
            write(items).push(value);
        }
    }

    /// True when both values are the same container (reference identity).
    pub fn same_ref(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Error(_) => "error",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Native(_) => "native",
        }
    }

    /// Converts plain JSON data into a value.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                Value::object(map.into_iter().map(|(k, v)| (k, Value::from_json(v))))
            }
        }
    }

    /// Converts to plain JSON data, the bridge used by typed service DTOs.
    ///
    /// Fails on cycles and callables, which have no JSON form.
    pub fn to_json(&self) -> Result<serde_json::Value, CodecError> {
        self.to_json_inner(&mut Vec::new())
    }

    fn to_json_inner(&self, stack: &mut Vec<usize>) -> Result<serde_json::Value, CodecError> {
        use serde_json::Value as Json;
        Ok(match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            // integral numbers go out as JSON integers so typed DTOs with
            // integer fields deserialize
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Json::from(*n as i64),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Date(ms) => Json::from(*ms),
            Value::Error(err) => serde_json::json!({
                "name": err.name,
                "message": err.message,
            }),
            Value::Array(items) => {
                let id = addr(items);
                if stack.contains(&id) {
                    return Err(CodecError::Unsupported("cyclic value has no JSON form".into()));
                }
                stack.push(id);
                let out = read(items)
                    .iter()
                    .map(|v| v.to_json_inner(stack))
                    .collect::<Result<Vec<_>, _>>()?;
                stack.pop();
                Json::Array(out)
            }
            Value::Object(map) => {
                let id = addr(map);
                if stack.contains(&id) {
                    return Err(CodecError::Unsupported("cyclic value has no JSON form".into()));
                }
                stack.push(id);
                let mut out = serde_json::Map::new();
                for (k, v) in read(map).iter() {
                    out.insert(k.clone(), v.to_json_inner(stack)?);
                }
                stack.pop();
                Json::Object(out)
            }
            Value::Function(c) | Value::Native(c) => {
                return Err(CodecError::Unsupported(format!(
                    "function '{}' has no JSON form",
                    c.name()
                )));
            }
        })
    }

    fn deep_eq(&self, other: &Value, seen: &mut HashSet<(usize, usize)>) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => {
                a.name == b.name
                    && a.message == b.message
                    && match (&a.cause, &b.cause) {
                        (None, None) => true,
                        (Some(x), Some(y)) => x.deep_eq(y, seen),
                        _ => false,
                    }
            }
            (Value::Array(a), Value::Array(b)) => {
                if Arc::ptr_eq(a, b) || !seen.insert((addr(a), addr(b))) {
                    return true;
                }
                let (a, b) = (read(a).clone(), read(b).clone());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.deep_eq(y, seen))
            }
            (Value::Object(a), Value::Object(b)) => {
                if Arc::ptr_eq(a, b) || !seen.insert((addr(a), addr(b))) {
                    return true;
                }
                let (a, b) = (read(a).clone(), read(b).clone());
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.deep_eq(vb, seen))
            }
            (Value::Function(a), Value::Function(b)) | (Value::Native(a), Value::Native(b)) => {
                a.name() == b.name()
            }
            _ => false,
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, stack: &mut Vec<usize>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Date(ms) => write!(f, "Date({})", ms),
            Value::Error(err) => write!(f, "{}: {}", err.name, err.message),
            Value::Array(items) => {
                let id = addr(items);
                if stack.contains(&id) {
                    return write!(f, "[Circular]");
                }
                stack.push(id);
                write!(f, "[")?;
                for (i, item) in read(items).iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.render(f, stack)?;
                }
                stack.pop();
                write!(f, "]")
            }
            Value::Object(map) => {
                let id = addr(map);
                if stack.contains(&id) {
                    return write!(f, "[Circular]");
                }
                stack.push(id);
                write!(f, "{{")?;
                for (i, (k, v)) in read(map).iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: ", k)?;
                    v.render(f, stack)?;
                }
                stack.pop();
                write!(f, "}}")
            }
            Value::Function(c) => write!(f, "[Function: {}]", c.name()),
            Value::Native(c) => write!(f, "[Native: {}]", c.name()),
        }
    }
}

impl PartialEq for Value {
    /// Deep structural equality; terminates on cyclic graphs.
    fn eq(&self, other: &Self) -> bool {
        self.deep_eq(other, &mut HashSet::new())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, &mut Vec::new())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, &mut Vec::new())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}
