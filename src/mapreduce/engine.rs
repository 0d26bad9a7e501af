use super::types::{JobReport, JobSpec, Phase};
use crate::codec::{Callable, Value};
use crate::error::{Result, RpcError};
use crate::node::{NodeContext, from_value, to_value};
use crate::services::store::backing;
use crate::storage::DistributedStore;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Store key of the shuffle bucket for `key` in job `job_id`.
pub fn bucket_key(job_id: &str, key: &str) -> String {
    format!("reduce@{}/{}", job_id, key)
}

/// Namespace holding the shuffle buckets of jobs over `gid`, kept apart from
/// the keys jobs enumerate.
pub fn bucket_namespace(gid: &str) -> String {
    format!("{}.mr", gid)
}

/// Work item of `mr.map` on the member owning `key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapTask {
    pub gid: String,
    pub key: String,
    pub service: String,
}

/// Work item of `mr.reduce` on the member owning `key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceTask {
    pub gid: String,
    pub key: String,
    pub bucket: String,
    pub service: String,
}

/// Job coordinator. Runs on whichever node received `mr.exec`.
pub struct MapReduce {
    ctx: Arc<NodeContext>,
    gid: String,
}

impl MapReduce {
    pub fn new(ctx: Arc<NodeContext>, gid: &str) -> Self {
        Self {
            ctx,
            gid: gid.to_string(),
        }
    }

    pub async fn exec(&self, spec: JobSpec) -> Result<JobReport> {
        let store = DistributedStore::new(&self.ctx, &self.gid, &spec.service)?;
        let keys = match &spec.keys {
            Some(keys) => keys.clone(),
            None => {
                let (errors, keys) = store.keys().await;
                if let Some((sid, e)) = errors.into_iter().next() {
                    return Err(RpcError::Application(Value::error(
                        "JobAbortedError",
                        &format!("key enumeration failed on {}: {}", sid, e),
                    )));
                }
                keys
            }
        };

        let mut report = JobReport::new(Uuid::new_v4().to_string());
        tracing::info!(
            "Job {} on '{}': {} key(s), map={}, reduce={}",
            report.id,
            self.gid,
            keys.len(),
            spec.map,
            spec.reduce
        );

        let emitted = self.map_phase(&store, &spec, &keys, &mut report).await;
        let reduce_keys = self.shuffle_phase(&store, emitted, &mut report).await;
        self.reduce_phase(&store, &spec, reduce_keys, &mut report).await;

        tracing::info!(
            "Job {} finished: {} result(s), {} error(s)",
            report.id,
            report.results.len(),
            report.errors.len()
        );
        Ok(report)
    }

    async fn map_phase(
        &self,
        store: &DistributedStore,
        spec: &JobSpec,
        keys: &[String],
        report: &mut JobReport,
    ) -> Vec<(String, Value)> {
        report.map.start(keys.len());
        let fanout = store.fanout();
        let calls = keys.iter().map(|key| {
            let task = to_value(&MapTask {
                gid: self.gid.clone(),
                key: key.clone(),
                service: spec.service.clone(),
            });
            let args = vec![task, Value::string(spec.map.clone())];
            async move { (key, fanout.route(key, "mr", "map", args).await) }
        });

        let mut emitted = Vec::new();
        for (key, outcome) in join_all(calls).await {
            match outcome.and_then(|output| emitted_pairs(&output)) {
                Ok(pairs) => {
                    report.map.succeeded();
                    emitted.extend(pairs);
                }
                Err(e) => report.fail(Phase::Map, key, e),
            }
        }
        report.map.finish();
        tracing::info!(
            "Job {} map: {}/{} key(s), {} pair(s) emitted",
            report.id,
            report.map.processed - report.map.errors,
            report.map.total,
            emitted.len()
        );
        emitted
    }

    async fn shuffle_phase(
        &self,
        store: &DistributedStore,
        emitted: Vec<(String, Value)>,
        report: &mut JobReport,
    ) -> BTreeSet<String> {
        report.shuffle.start(emitted.len());
        let job_id = report.id.clone();
        let namespace = bucket_namespace(&self.gid);
        let calls = emitted.into_iter().map(|(key, value)| {
            let bucket = bucket_key(&job_id, &key);
            let namespace = namespace.as_str();
            async move {
                let outcome = store.append_in(namespace, value, &bucket, &key).await;
                (key, outcome)
            }
        });

        let mut reduce_keys = BTreeSet::new();
        for (key, outcome) in join_all(calls).await {
            match outcome {
                Ok(_) => {
                    report.shuffle.succeeded();
                    reduce_keys.insert(key);
                }
                Err(e) => report.fail(Phase::Shuffle, &key, e),
            }
        }
        report.shuffle.finish();
        tracing::info!(
            "Job {} shuffle: {} bucket(s)",
            report.id,
            reduce_keys.len()
        );
        reduce_keys
    }

    async fn reduce_phase(
        &self,
        store: &DistributedStore,
        spec: &JobSpec,
        keys: BTreeSet<String>,
        report: &mut JobReport,
    ) {
        report.reduce.start(keys.len());
        let fanout = store.fanout();
        let job_id = report.id.clone();
        let calls = keys.into_iter().map(|key| {
            let task = to_value(&ReduceTask {
                gid: self.gid.clone(),
                key: key.clone(),
                bucket: bucket_key(&job_id, &key),
                service: spec.service.clone(),
            });
            let args = vec![task, Value::string(spec.reduce.clone())];
            async move {
                let outcome = fanout.route(&key, "mr", "reduce", args).await;
                (key, outcome)
            }
        });

        for (key, outcome) in join_all(calls).await {
            match outcome {
                Ok(result) => {
                    report.reduce.succeeded();
                    report.results.insert(key, result);
                }
                Err(e) => report.fail(Phase::Reduce, &key, e),
            }
        }
        report.reduce.finish();
    }
}

/// Flattens map output (`[{k: v}, ...]`, a single `{k: v}`, or nothing)
/// into pairs.
pub fn emitted_pairs(output: &Value) -> Result<Vec<(String, Value)>> {
    match output {
        Value::Null | Value::Undefined => Ok(Vec::new()),
        Value::Object(_) => Ok(output.as_map().unwrap_or_default().into_iter().collect()),
        Value::Array(_) => {
            let mut pairs = Vec::new();
            for item in output.as_vec().unwrap_or_default() {
                let entries = item.as_map().ok_or_else(|| {
                    RpcError::Validation(format!(
                        "map must emit {{key: value}} objects, got {}",
                        item.type_name()
                    ))
                })?;
                pairs.extend(entries);
            }
            Ok(pairs)
        }
        other => Err(RpcError::Validation(format!(
            "map must emit an array of {{key: value}} objects, got {}",
            other.type_name()
        ))),
    }
}

fn resolve(ctx: &NodeContext, function: &Value) -> Result<Callable> {
    match function {
        Value::String(name) => ctx.functions().callable(name).ok_or_else(|| {
            RpcError::Validation(format!("function '{}' is not registered", name))
        }),
        Value::Function(callable) => Ok(callable.clone()),
        other => Err(RpcError::Validation(format!(
            "expected a function or its name, got {}",
            other.type_name()
        ))),
    }
}

/// `mr.map` on the owner: apply the map function to the stored value.
pub async fn map_local(ctx: &NodeContext, task: &Value, function: &Value) -> Result<Value> {
    let task: MapTask = from_value(task)?;
    let map = resolve(ctx, function)?;
    let value = backing(ctx, &task.service).get(&task.gid, &task.key).await?;
    map.call(vec![Value::string(task.key), value])
        .map_err(RpcError::Application)
}

/// `mr.reduce` on the owner: reduce the bucket, then drop it whether or not
/// the reduce succeeded.
pub async fn reduce_local(ctx: &NodeContext, task: &Value, function: &Value) -> Result<Value> {
    let task: ReduceTask = from_value(task)?;
    let store = backing(ctx, &task.service);
    let namespace = bucket_namespace(&task.gid);
    let bucket = store.get(&namespace, &task.bucket).await?;

    let result = resolve(ctx, function).and_then(|reduce| {
        let values = bucket.as_vec().unwrap_or_else(|| vec![bucket.clone()]);
        reduce
            .call(vec![Value::string(task.key.clone()), Value::array(values)])
            .map_err(RpcError::Application)
    });
    if let Err(e) = store.del(&namespace, &task.bucket).await {
        tracing::warn!("Could not drop bucket {}: {}", task.bucket, e);
    }
    result
}
