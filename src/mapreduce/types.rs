use crate::codec::{FunctionRegistry, Value};
use crate::error::{Result, RpcError};
use crate::node::{Reply, to_value};
use crate::services::store::{MEM, STORE};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Map,
    Shuffle,
    Reduce,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Map => "map",
            Phase::Shuffle => "shuffle",
            Phase::Reduce => "reduce",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseState {
    #[default]
    Pending,
    Running,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub state: PhaseState,
    pub processed: u64,
    pub total: u64,
    pub errors: u64,
}

impl PhaseProgress {
    pub fn start(&mut self, total: usize) {
        self.state = PhaseState::Running;
        self.total = total as u64;
    }

    pub fn succeeded(&mut self) {
        self.processed += 1;
    }

    pub fn failed(&mut self) {
        self.processed += 1;
        self.errors += 1;
    }

    pub fn finish(&mut self) {
        self.state = PhaseState::Completed;
    }
}

/// What to run. `map`/`reduce` are names in the function registry.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    /// `None` runs over every key the group's store holds.
    pub keys: Option<Vec<String>>,
    pub map: String,
    pub reduce: String,
    /// `store` or `mem`.
    pub service: String,
}

impl JobSpec {
    pub fn new(map: &str, reduce: &str) -> Self {
        Self {
            keys: None,
            map: map.to_string(),
            reduce: reduce.to_string(),
            service: STORE.to_string(),
        }
    }

    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn in_memory(mut self) -> Self {
        self.service = MEM.to_string();
        self
    }

    /// Parses `{keys?, map, reduce, service?}`. `map` and `reduce` may be
    /// function values or names; either way they must be registered here.
    pub fn from_value(value: &Value, functions: &FunctionRegistry) -> Result<Self> {
        let keys = match value.get("keys") {
            None | Some(Value::Null) | Some(Value::Undefined) => None,
            Some(list) => {
                let items = list
                    .as_vec()
                    .ok_or_else(|| RpcError::Validation("'keys' must be an array".into()))?;
                let keys = items
                    .iter()
                    .map(|k| {
                        k.as_str().map(str::to_string).ok_or_else(|| {
                            RpcError::Validation("job keys must be strings".into())
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Some(keys)
            }
        };
        let service = match value.get("service") {
            None | Some(Value::Null) | Some(Value::Undefined) => STORE.to_string(),
            Some(Value::String(s)) if s == STORE || s == MEM => s,
            Some(other) => {
                return Err(RpcError::Validation(format!(
                    "job service must be '{}' or '{}', got {}",
                    STORE, MEM, other
                )));
            }
        };
        Ok(Self {
            keys,
            map: function_name(value.get("map"), functions, "map")?,
            reduce: function_name(value.get("reduce"), functions, "reduce")?,
            service,
        })
    }

    pub fn to_value(&self) -> Value {
        Value::object([
            (
                "keys",
                self.keys
                    .as_ref()
                    .map(|keys| Value::array(keys.iter().map(|k| Value::string(k.clone())).collect()))
                    .unwrap_or(Value::Undefined),
            ),
            ("map", Value::string(self.map.clone())),
            ("reduce", Value::string(self.reduce.clone())),
            ("service", Value::string(self.service.clone())),
        ])
    }
}

fn function_name(value: Option<Value>, functions: &FunctionRegistry, role: &str) -> Result<String> {
    let name = match &value {
        Some(Value::String(name)) => name.clone(),
        Some(Value::Function(callable)) => callable.name().to_string(),
        _ => {
            return Err(RpcError::Validation(format!(
                "job needs a '{}' function",
                role
            )));
        }
    };
    if !functions.has_function(&name) {
        return Err(RpcError::Validation(format!(
            "{} function '{}' is not registered",
            role, name
        )));
    }
    Ok(name)
}

#[derive(Debug, Clone)]
pub struct JobError {
    pub phase: Phase,
    pub key: String,
    pub error: RpcError,
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub id: String,
    /// emitted key -> reduce result
    pub results: BTreeMap<String, Value>,
    pub errors: Vec<JobError>,
    pub map: PhaseProgress,
    pub shuffle: PhaseProgress,
    pub reduce: PhaseProgress,
}

impl JobReport {
    pub fn new(id: String) -> Self {
        Self {
            id,
            results: BTreeMap::new(),
            errors: Vec::new(),
            map: PhaseProgress::default(),
            shuffle: PhaseProgress::default(),
            reduce: PhaseProgress::default(),
        }
    }

    pub fn phase_mut(&mut self, phase: Phase) -> &mut PhaseProgress {
        match phase {
            Phase::Map => &mut self.map,
            Phase::Shuffle => &mut self.shuffle,
            Phase::Reduce => &mut self.reduce,
        }
    }

    pub fn fail(&mut self, phase: Phase, key: &str, error: RpcError) {
        tracing::warn!("{} failed for '{}': {}", phase, key, error);
        self.phase_mut(phase).failed();
        self.errors.push(JobError {
            phase,
            key: key.to_string(),
            error,
        });
    }

    /// `{"phase:key": error}`; repeats of a label get `#2`, `#3`, ...
    pub fn error_map(&self) -> Value {
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        Value::object(self.errors.iter().map(|e| {
            let label = format!("{}:{}", e.phase, e.key);
            let count = seen.entry(label.clone()).or_insert(0);
            *count += 1;
            let label = match *count {
                1 => label,
                n => format!("{}#{}", label, n),
            };
            (label, e.error.to_value())
        }))
    }

    pub fn results_value(&self) -> Value {
        Value::object(self.results.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    pub fn to_value(&self) -> Value {
        Value::object([
            ("id", Value::string(self.id.clone())),
            ("results", self.results_value()),
            (
                "phases",
                Value::object([
                    ("map", to_value(&self.map)),
                    ("shuffle", to_value(&self.shuffle)),
                    ("reduce", to_value(&self.reduce)),
                ]),
            ),
        ])
    }

    /// `(errorMap, report)`
    pub fn to_reply(&self) -> Reply {
        Reply::pair(self.error_map(), self.to_value())
    }
}
