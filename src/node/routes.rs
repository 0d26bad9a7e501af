//! Routing Table
//!
//! Services are explicit tables from method name to a boxed async function
//! sharing one call signature. Local services answer `/local/...`; group
//! services answer `/{gid}/...` for every gid this node knows and receive
//! that gid through [`Call`].

use super::context::NodeContext;
use super::types::{LOCAL_GID, Reply};
use crate::codec::{Callable, Value};
use crate::error::{Result, RpcError};

use dashmap::DashMap;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

/// Invocation context handed to every method.
#[derive(Clone)]
pub struct Call {
    pub ctx: Arc<NodeContext>,
    pub gid: String,
}

pub type MethodFn = Arc<dyn Fn(Call, Vec<Value>) -> BoxFuture<'static, Reply> + Send + Sync>;

pub struct Service {
    name: String,
    methods: BTreeMap<String, MethodFn>,
    builtin: bool,
}

impl Service {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            methods: BTreeMap::new(),
            builtin: false,
        }
    }

    pub(crate) fn builtin(mut self) -> Self {
        self.builtin = true;
        self
    }

    /// Adds a method. The closure's future is boxed so methods with
    /// different future types fit in one table.
    pub fn method<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(Call, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        let method: MethodFn =
            Arc::new(move |call: Call, args: Vec<Value>| Box::pin(handler(call, args)) as BoxFuture<'static, Reply>);
        self.methods.insert(name.to_string(), method);
        self
    }

    /// Adds a method that yields a single result; `Err` lands in the error
    /// slot of the reply.
    pub fn op<F, Fut>(self, name: &str, handler: F) -> Self
    where
        F: Fn(Call, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.method(name, move |call, args| {
            let fut = handler(call, args);
            async move { Reply::from_result(fut.await) }
        })
    }

    /// Builds a service whose methods are function values, e.g. received
    /// through `routes.put`.
    pub fn from_functions(name: &str, functions: BTreeMap<String, Callable>) -> Self {
        functions
            .into_iter()
            .fold(Service::new(name), |service, (method, callable)| {
                service.method(&method, move |_call, args| {
                    let callable = callable.clone();
                    async move {
                        match callable.call(args) {
                            Ok(value) => Reply::ok(value),
                            Err(error) => Reply::pair(error, Value::Null),
                        }
                    }
                })
            })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    pub fn get_method(&self, method: &str) -> Option<MethodFn> {
        self.methods.get(method).cloned()
    }

    pub fn method_names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }
}

/// Per-node routing table.
pub struct Routes {
    local: DashMap<String, Arc<Service>>,
    group: DashMap<String, Arc<Service>>,
}

impl Routes {
    pub fn new() -> Self {
        Self {
            local: DashMap::new(),
            group: DashMap::new(),
        }
    }

    /// Registers (or replaces) a local service under its own name.
    pub fn put(&self, service: Service) -> Result<()> {
        if let Some(existing) = self.local.get(service.name())
            && existing.is_builtin()
            && !service.is_builtin()
        {
            return Err(RpcError::Validation(format!(
                "built-in service '{}' cannot be replaced",
                service.name()
            )));
        }
        tracing::info!("Registered service: {}", service.name());
        self.local.insert(service.name().to_string(), Arc::new(service));
        Ok(())
    }

    pub fn put_group(&self, service: Service) {
        self.group.insert(service.name().to_string(), Arc::new(service));
    }

    pub fn rem(&self, name: &str) -> Result<Arc<Service>> {
        match self.local.get(name) {
            None => return Err(RpcError::NotFound(format!("service '{}' not found", name))),
            Some(service) if service.is_builtin() => {
                return Err(RpcError::Validation(format!(
                    "built-in service '{}' cannot be removed",
                    name
                )));
            }
            Some(_) => {}
        }
        self.local
            .remove(name)
            .map(|(_, service)| service)
            .ok_or_else(|| RpcError::NotFound(format!("service '{}' not found", name)))
    }

    /// Looks up the service answering `/{gid}/{service}`. Whether a non-local
    /// gid is known is checked by the caller.
    pub fn get(&self, gid: &str, service: &str) -> Option<Arc<Service>> {
        let table = if gid == LOCAL_GID {
            &self.local
        } else {
            &self.group
        };
        table.get(service).map(|entry| entry.value().clone())
    }

    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.local.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for Routes {
    fn default() -> Self {
        Self::new()
    }
}
