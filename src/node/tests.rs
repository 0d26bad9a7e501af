//! Node Module Tests
//!
//! ## Test Scopes
//! - **Identity**: NID/SID are pure functions of the address.
//! - **Routing table**: built-in protection, runtime services.
//! - **Server**: status codes for bad paths, verbs, bodies and routes;
//!   `(error, value)` replies; panics confined to one request.

#[cfg(test)]
mod tests {
    use crate::codec::Value;
    use crate::comm::Remote;
    use crate::error::RpcError;
    use crate::node::{Node, NodeConfig, Reply, Routes, SID_LEN, Service};
    use crate::testing::start_node;
    use std::collections::BTreeMap;

    // ============================================================
    // IDENTITY
    // ============================================================

    #[test]
    fn test_nid_and_sid_are_pure() {
        let a = Node::new("127.0.0.1", 8080);
        let b = Node::new("127.0.0.1", 8080);

        assert_eq!(a.nid(), b.nid());
        assert_eq!(a.nid(), a.nid());
        assert_eq!(a.sid(), b.sid());
        assert_eq!(a.nid().0.len(), 64);
        assert_eq!(a.sid().len(), SID_LEN);
        assert!(a.nid().0.starts_with(&a.sid()));
    }

    #[test]
    fn test_nid_depends_on_both_fields() {
        let base = Node::new("127.0.0.1", 8080);
        assert_ne!(base.nid(), Node::new("127.0.0.1", 8081).nid());
        assert_ne!(base.nid(), Node::new("127.0.0.2", 8080).nid());
    }

    #[test]
    fn test_node_value_roundtrip() {
        let node = Node::new("10.0.0.7", 7070);
        assert_eq!(Node::from_value(&node.to_value()).unwrap(), node);
        assert!(matches!(
            Node::from_value(&Value::string("10.0.0.7:7070")),
            Err(RpcError::Validation(_))
        ));
    }

    #[test]
    fn test_reply_pair_interpretation() {
        let pair = Value::pair(Value::Null, Value::Number(5.0));
        assert_eq!(Reply::from_value(pair).into_result().unwrap(), Value::Number(5.0));

        let bare = Reply::from_value(Value::string("plain"));
        assert_eq!(bare.value, Value::string("plain"));
        assert!(!bare.is_err());

        let failed = Reply::err(RpcError::NotFound("k".into()));
        assert!(failed.into_result().unwrap_err().is_not_found());

        let quiet_fanout = Reply::pair(Value::empty_object(), Value::empty_object());
        assert!(!quiet_fanout.is_err());
    }

    #[test]
    fn test_config_args_mention_every_flag() {
        let config = NodeConfig {
            port: 9000,
            trusted_peers: true,
            fanout_timeout_ms: Some(250),
            ..NodeConfig::default()
        };
        let args = config.to_args();
        for flag in ["--ip", "--port", "--store-root", "--trusted-peers", "--fanout-timeout-ms", "--hash"] {
            assert!(args.iter().any(|a| a == flag), "missing {}", flag);
        }
        assert!(!NodeConfig::default().to_args().contains(&"--trusted-peers".to_string()));
    }

    // ============================================================
    // ROUTING TABLE
    // ============================================================

    #[test]
    fn test_builtin_services_cannot_be_removed_or_replaced() {
        let routes = Routes::new();
        crate::services::install(&routes);

        assert!(matches!(routes.rem("status"), Err(RpcError::Validation(_))));
        assert!(matches!(
            routes.put(Service::new("store")),
            Err(RpcError::Validation(_))
        ));
        assert!(matches!(routes.rem("missing"), Err(RpcError::NotFound(_))));
        for name in crate::services::BUILTIN {
            assert!(routes.get("local", name).is_some(), "local {}", name);
            assert!(routes.get("some-group", name).is_some(), "group {}", name);
        }
    }

    #[test]
    fn test_runtime_service_register_and_remove() {
        let routes = Routes::new();
        let service = Service::new("echo").op("say", |_call, args| async move {
            Ok::<_, RpcError>(args.into_iter().next().unwrap_or(Value::Undefined))
        });

        routes.put(service).unwrap();
        assert_eq!(routes.get("local", "echo").unwrap().method_names(), vec!["say"]);

        routes.rem("echo").unwrap();
        assert!(routes.get("local", "echo").is_none());
    }

    // ============================================================
    // SERVER
    // ============================================================

    #[tokio::test]
    async fn test_status_get_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let handle = start_node(dir.path()).await;
        let node = handle.node().clone();
        let remote = Remote::new(node.clone(), "status", "get");

        let nid = handle.ctx.comm.call(vec![Value::from("nid")], &remote).await.unwrap();
        let port = handle.ctx.comm.call(vec![Value::from("port")], &remote).await.unwrap();
        let missing = handle.ctx.comm.call(vec![Value::from("heap")], &remote).await;

        assert_eq!(nid, Value::string(node.nid().0));
        assert_eq!(port, Value::from(node.port));
        assert!(missing.unwrap_err().is_not_found());
        assert!(handle.ctx.counts() >= 3);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_requests_get_client_errors() {
        let dir = tempfile::tempdir().unwrap();
        let handle = start_node(dir.path()).await;
        let base = handle.node().base_url();
        let http = reqwest::Client::new();

        // missing method segment
        let short = http.put(format!("{}/local/status", base)).send().await.unwrap();
        assert_eq!(short.status(), 400);

        // wrong verb
        let get = http.get(format!("{}/local/status/get", base)).send().await.unwrap();
        assert_eq!(get.status(), 405);

        // undecodable body
        let garbage = http
            .put(format!("{}/local/status/get", base))
            .body("{not wire")
            .send()
            .await
            .unwrap();
        assert_eq!(garbage.status(), 400);

        // unknown service, method and group
        for path in ["/local/nope/get", "/local/status/nope", "/ghost/status/get"] {
            let resp = http.put(format!("{}{}", base, path)).send().await.unwrap();
            assert_eq!(resp.status(), 404, "{}", path);
        }

        // still serving afterwards
        let ok = http.put(format!("{}/local/routes/get", base)).send().await.unwrap();
        assert_eq!(ok.status(), 200);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_panicking_method_fails_only_its_request() {
        // ARRANGE
        let dir = tempfile::tempdir().unwrap();
        let handle = start_node(dir.path()).await;
        handle
            .ctx
            .routes
            .put(Service::new("boom").method("now", |_call, args| async move {
                if args.is_empty() {
                    panic!("kaboom");
                }
                Reply::ok(Value::Null)
            }))
            .unwrap();
        let comm = &handle.ctx.comm;

        // ACT
        let failed = comm
            .call(vec![], &Remote::new(handle.node().clone(), "boom", "now"))
            .await;
        let after = comm
            .call(
                vec![Value::from("sid")],
                &Remote::new(handle.node().clone(), "status", "get"),
            )
            .await;

        // ASSERT
        assert!(matches!(failed, Err(RpcError::Protocol(msg)) if msg.contains("500")));
        assert_eq!(after.unwrap(), Value::string(handle.node().sid()));

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_routes_put_installs_function_service() {
        // ARRANGE: a service made of registered function values
        let dir = tempfile::tempdir().unwrap();
        let handle = start_node(dir.path()).await;
        handle.ctx.functions().register("greet", |args| {
            let who = args.first().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
            Ok(Value::string(format!("hello {}", who)))
        });
        let greet = handle.ctx.functions().get("greet").unwrap();
        let service = Value::object(BTreeMap::from([("hi".to_string(), greet)]));
        let node = handle.node().clone();
        let comm = &handle.ctx.comm;

        // ACT
        comm.call(
            vec![service, Value::from("greeter")],
            &Remote::new(node.clone(), "routes", "put"),
        )
        .await
        .unwrap();
        let answer = comm
            .call(vec![Value::from("ada")], &Remote::new(node.clone(), "greeter", "hi"))
            .await
            .unwrap();
        let methods = comm
            .call(vec![Value::from("greeter")], &Remote::new(node.clone(), "routes", "get"))
            .await
            .unwrap();

        // ASSERT
        assert_eq!(answer, Value::string("hello ada"));
        assert_eq!(methods, Value::array(vec![Value::string("hi")]));

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_status_stop_replies_then_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let handle = start_node(dir.path()).await;
        let node = handle.node().clone();

        let reply = handle
            .ctx
            .comm
            .call(vec![], &Remote::new(node.clone(), "status", "stop"))
            .await
            .unwrap();

        assert_eq!(Node::from_value(&reply).unwrap(), node);
        handle.wait().await.unwrap();
    }
}
