//! Comm Module Tests
//!
//! ## Test Scopes
//! - **Validation**: malformed targets fail before any I/O.
//! - **Transport**: refused connections are retried, then surfaced.
//! - **Protocol**: non-success statuses are surfaced without retry.
//! - **Replies**: `(error, value)` pairs and bare bodies.
//! - **Relay**: the `comm.send` service forwards calls.

#[cfg(test)]
mod tests {
    use crate::codec::{Codec, Value};
    use crate::comm::{CommClient, Remote, RetryPolicy};
    use crate::error::RpcError;
    use crate::node::Node;
    use crate::testing::start_node;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn client(retries: u32, backoff_ms: u64) -> CommClient {
        CommClient::new(
            Codec::untrusted(),
            RetryPolicy::new(retries, Duration::from_millis(backoff_ms)),
            Duration::from_secs(5),
        )
    }

    async fn closed_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    // ============================================================
    // VALIDATION
    // ============================================================

    #[tokio::test]
    async fn test_invalid_targets_fail_without_io() {
        // ARRANGE: a slow retry policy that would be noticeable if used
        let comm = client(5, 1_000);
        let targets = [
            Remote::new(Node::new("", 8080), "status", "get"),
            Remote::new(Node::new("127.0.0.1", 0), "status", "get"),
            Remote::new(Node::new("127.0.0.1", 8080), "", "get"),
            Remote::new(Node::new("127.0.0.1", 8080), "status", ""),
        ];

        for target in targets {
            // ACT
            let started = Instant::now();
            let result = comm.send(vec![], &target).await;

            // ASSERT
            assert!(matches!(result, Err(RpcError::Validation(_))), "{:?}", target);
            assert!(started.elapsed() < Duration::from_millis(500));
        }
    }

    #[test]
    fn test_remote_from_value_reports_missing_fields() {
        let complete = Value::object([
            ("node", Node::new("127.0.0.1", 9000).to_value()),
            ("service", Value::string("status")),
            ("method", Value::string("get")),
        ]);
        let remote = Remote::from_value(&complete).unwrap();
        assert_eq!(remote.path(), "/local/status/get");

        let no_method = Value::object([
            ("node", Node::new("127.0.0.1", 9000).to_value()),
            ("service", Value::string("status")),
        ]);
        assert!(matches!(
            Remote::from_value(&no_method),
            Err(RpcError::Validation(msg)) if msg.contains("method")
        ));

        let no_node = Value::object([("service", Value::string("status"))]);
        assert!(Remote::from_value(&no_node).is_err());
    }

    #[test]
    fn test_remote_path_uses_gid() {
        let remote = Remote::new(Node::new("127.0.0.1", 1), "store", "get").with_gid("g1");
        assert_eq!(remote.path(), "/g1/store/get");
        assert_eq!(remote.gid(), "g1");
    }

    // ============================================================
    // TRANSPORT / PROTOCOL
    // ============================================================

    #[tokio::test]
    async fn test_refused_connection_retries_then_transport_error() {
        // ARRANGE
        let port = closed_port().await;
        let comm = client(2, 20);
        let remote = Remote::new(Node::new("127.0.0.1", port), "status", "get");

        // ACT
        let started = Instant::now();
        let result = comm.send(vec![Value::from("nid")], &remote).await;

        // ASSERT: two sleeps of 20ms and 40ms happened before giving up
        assert!(matches!(result, Err(RpcError::Transport(_))));
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_dropped_connection_retries_then_transport_error() {
        // ARRANGE: a peer that accepts and hangs up without answering
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        let server = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        });
        let comm = client(2, 10);
        let remote = Remote::new(Node::new("127.0.0.1", port), "status", "get");

        // ACT
        let result = comm.send(vec![Value::from("nid")], &remote).await;

        // ASSERT: a lost connection is a transport failure and is retried
        assert!(matches!(result, Err(RpcError::Transport(_))));
        assert!(accepted.load(Ordering::SeqCst) >= 3);
        server.abort();
    }

    #[tokio::test]
    async fn test_error_status_is_protocol_error() {
        let dir = tempfile::tempdir().unwrap();
        let handle = start_node(dir.path()).await;
        let remote = Remote::new(handle.node().clone(), "nope", "get");

        let result = handle.ctx.comm.send(vec![], &remote).await;

        assert!(matches!(result, Err(RpcError::Protocol(msg)) if msg.contains("404")));
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_bare_body_is_taken_as_value() {
        // ARRANGE: a peer that answers with a bare encoded value
        let body = Codec::untrusted().encode(&Value::string("bare")).unwrap();
        let app = axum::Router::new().route(
            "/local/echo/get",
            axum::routing::put(move || {
                let body = body.clone();
                async move { body }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        // ACT
        let reply = client(0, 0)
            .send(vec![], &Remote::new(Node::new("127.0.0.1", port), "echo", "get"))
            .await
            .unwrap();

        // ASSERT
        assert!(!reply.is_err());
        assert_eq!(reply.value, Value::string("bare"));
    }

    #[tokio::test]
    async fn test_application_error_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let handle = start_node(dir.path()).await;
        let remote = Remote::new(handle.node().clone(), "mem", "get");

        let reply = handle
            .ctx
            .comm
            .send(vec![Value::from("never-put")], &remote)
            .await
            .unwrap();

        assert!(reply.is_err());
        assert!(reply.into_result().unwrap_err().is_not_found());
        handle.stop().await.unwrap();
    }

    // ============================================================
    // RELAY
    // ============================================================

    #[tokio::test]
    async fn test_comm_send_relays_through_a_peer() {
        // ARRANGE: A relays to B
        let dir = tempfile::tempdir().unwrap();
        let a = start_node(dir.path()).await;
        let b = start_node(dir.path()).await;
        let target = Value::object([
            ("node", b.node().to_value()),
            ("service", Value::string("status")),
            ("method", Value::string("get")),
        ]);

        // ACT
        let sid = a
            .ctx
            .comm
            .call(
                vec![Value::array(vec![Value::from("sid")]), target],
                &Remote::new(a.node().clone(), "comm", "send"),
            )
            .await
            .unwrap();

        // ASSERT
        assert_eq!(sid, Value::string(b.node().sid()));
        a.stop().await.unwrap();
        b.stop().await.unwrap();
    }
}
