//! `mr`: MapReduce workers (local) and coordinator (group).

use super::arg;
use crate::mapreduce::engine::{map_local, reduce_local};
use crate::mapreduce::{JobSpec, MapReduce};
use crate::node::{Reply, Service};

pub fn local() -> Service {
    Service::new("mr")
        .op("map", |call, args| async move {
            map_local(&call.ctx, &arg(&args, 0), &arg(&args, 1)).await
        })
        .op("reduce", |call, args| async move {
            reduce_local(&call.ctx, &arg(&args, 0), &arg(&args, 1)).await
        })
}

pub fn group() -> Service {
    Service::new("mr").method("exec", |call, args| async move {
        let spec = match JobSpec::from_value(&arg(&args, 0), call.ctx.functions()) {
            Ok(spec) => spec,
            Err(e) => return Reply::err(e),
        };
        match MapReduce::new(call.ctx.clone(), &call.gid).exec(spec).await {
            Ok(report) => report.to_reply(),
            Err(e) => Reply::err(e),
        }
    })
}
