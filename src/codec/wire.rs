//! Self-describing wire form.
//!
//! Every unit is `{"type": <tag>, "value": <payload>}`. Containers carry a
//! per-call `id`; a later `register` unit with that id stands for the same
//! container, which is how shared and cyclic references survive encoding.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub(crate) enum Wire {
    Undefined,
    Null,
    Boolean(bool),
    /// Rendered with `f64`'s shortest round-trip form so NaN and the
    /// infinities survive JSON.
    Number(String),
    String(String),
    Date(i64),
    Error {
        name: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<Box<Wire>>,
    },
    Array {
        id: u64,
        elements: Vec<Wire>,
    },
    Object {
        id: u64,
        entries: Vec<(String, Wire)>,
    },
    Function(String),
    Native(String),
    Register(u64),
}
