//! Built-in Services
//!
//! RPC adapters that expose the runtime's components under
//! `/{gid}/{service}/{method}`. Every service comes in two variants:
//!
//! - **local** (`/local/...`): acts on this node only and answers a single
//!   `(error, value)`.
//! - **group** (`/{gid}/...`): projects the call onto the members of `gid`
//!   through the fan-out layer. Broadcast methods answer
//!   `(errorMap, valueMap)` keyed by short id; key-routed methods answer the
//!   owner's `(error, value)`.
//!
//! `install` registers both variants as built-ins, which cannot be removed
//! or replaced at runtime.

pub mod comm;
pub mod groups;
pub mod mr;
pub mod routes;
pub mod status;
pub mod store;


use crate::codec::Value;
use crate::error::{Result, RpcError};
use crate::node::Routes;

/// Names of the built-in services.
pub const BUILTIN: [&str; 7] = ["status", "routes", "comm", "groups", "mem", "store", "mr"];

pub fn install(routes: &Routes) {
    let local = [
        status::local(),
        routes::local(),
        comm::local(),
        groups::local(),
        store::local(store::MEM),
        store::local(store::STORE),
        mr::local(),
    ];
    for service in local {
        let name = service.name().to_string();
        if let Err(e) = routes.put(service.builtin()) {
            tracing::error!("Failed to install service {}: {}", name, e);
        }
    }

    let group = [
        status::group(),
        routes::group(),
        comm::group(),
        groups::group(),
        store::group(store::MEM),
        store::group(store::STORE),
        mr::group(),
    ];
    for service in group {
        routes.put_group(service.builtin());
    }
}

/// Positional argument, `undefined` when absent.
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

pub(crate) fn str_arg(args: &[Value], index: usize, name: &str) -> Result<String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(RpcError::Validation(format!(
            "'{}' must be a string, got {}",
            name,
            other.type_name()
        ))),
        None => Err(RpcError::Validation(format!("missing argument '{}'", name))),
    }
}
