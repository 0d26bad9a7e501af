//! MapReduce Module Tests
//!
//! ## Test Scopes
//! - **Built-in jobs**: tokenizer, letter/word counts, postings.
//! - **Engine**: end-to-end jobs over a live cluster, per-key failures,
//!   enumeration aborts and bucket cleanup.
//! - **RPC**: `mr.exec` through the group route.

#[cfg(test)]
mod tests {
    use crate::codec::Value;
    use crate::comm::Remote;
    use crate::error::RpcError;
    use crate::mapreduce::engine::emitted_pairs;
    use crate::mapreduce::jobs::{
        LETTERS_MAP, POSTINGS_MAP, POSTINGS_REDUCE, SUM_REDUCE, WORDS_MAP,
    };
    use crate::mapreduce::tokenizer::{term_frequencies, tokenize};
    use crate::mapreduce::{JobReport, JobSpec, MapReduce, Phase, PhaseState, bucket_namespace};
    use crate::node::NodeHandle;
    use crate::storage::{DistributedStore, HashStrategy};
    use crate::testing::{start_cluster, stop_all};
    use std::collections::BTreeMap;

    async fn seed(handle: &NodeHandle, service: &str, docs: &[(&str, &str)]) {
        let store = DistributedStore::new(&handle.ctx, "g", service).unwrap();
        for (key, text) in docs {
            store.put(Value::string(*text), Some(*key)).await.unwrap();
        }
    }

    fn numbers(entries: &[(&str, f64)]) -> BTreeMap<String, Value> {
        entries
            .iter()
            .map(|(k, n)| (k.to_string(), Value::Number(*n)))
            .collect()
    }

    // ============================================================
    // TOKENIZER / BUILT-IN JOB TESTS
    // ============================================================

    #[test]
    fn test_tokenize_keeps_long_words_lowercased() {
        let words = tokenize("The cat, the WHALE; an ox and the whale!");
        assert_eq!(words, vec!["the", "cat", "the", "whale", "and", "the", "whale"]);
    }

    #[test]
    fn test_term_frequencies() {
        let counts = term_frequencies("Call me Ishmael. Call me later, Ishmael");
        assert_eq!(counts["call"], 2);
        assert_eq!(counts["ishmael"], 2);
        assert_eq!(counts["later"], 1);
        assert!(!counts.contains_key("me"));
    }

    #[test]
    fn test_emitted_pairs_shapes() {
        let list = Value::array(vec![
            Value::object([("a", Value::Number(1.0))]),
            Value::object([("b", Value::Number(2.0)), ("c", Value::Number(3.0))]),
        ]);
        let pairs = emitted_pairs(&list).unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0], ("a".to_string(), Value::Number(1.0)));

        let single = Value::object([("x", Value::string("y"))]);
        assert_eq!(emitted_pairs(&single).unwrap().len(), 1);
        assert!(emitted_pairs(&Value::Null).unwrap().is_empty());

        assert!(matches!(
            emitted_pairs(&Value::Number(4.0)),
            Err(RpcError::Validation(_))
        ));
        assert!(matches!(
            emitted_pairs(&Value::array(vec![Value::string("loose")])),
            Err(RpcError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_builtin_functions_are_registered() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = start_cluster(1, "g", HashStrategy::Naive, dir.path()).await;
        let functions = cluster[0].ctx.functions();

        let letters = functions.callable(LETTERS_MAP).unwrap();
        let out = letters
            .call(vec![Value::string("k"), Value::string("a b")])
            .unwrap();
        assert_eq!(out.as_vec().unwrap().len(), 2);

        let sum = functions.callable(SUM_REDUCE).unwrap();
        let total = sum
            .call(vec![
                Value::string("k"),
                Value::array(vec![Value::Number(1.0), Value::Number(2.5)]),
            ])
            .unwrap();
        assert_eq!(total, Value::Number(3.5));
        assert!(
            sum.call(vec![Value::string("k"), Value::array(vec![Value::string("x")])])
                .is_err()
        );

        stop_all(cluster).await;
    }

    #[tokio::test]
    async fn test_postings_reduce_orders_by_frequency() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = start_cluster(1, "g", HashStrategy::Naive, dir.path()).await;
        let reduce = cluster[0].ctx.functions().callable(POSTINGS_REDUCE).unwrap();
        let posting = |doc: &str, f: f64| {
            Value::object([("document", Value::string(doc)), ("frequency", Value::Number(f))])
        };

        let out = reduce
            .call(vec![
                Value::string("whale"),
                Value::array(vec![posting("d2", 1.0), posting("d1", 4.0), posting("d3", 1.0)]),
            ])
            .unwrap();

        assert_eq!(out.get("df"), Some(Value::Number(3.0)));
        let order: Vec<String> = out
            .get("postings")
            .and_then(|p| p.as_vec())
            .unwrap()
            .iter()
            .map(|p| p.get("document").unwrap().as_str().unwrap().to_string())
            .collect();
        assert_eq!(order, vec!["d1", "d2", "d3"]);

        stop_all(cluster).await;
    }

    // ============================================================
    // ENGINE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_letter_count_over_cluster() {
        // ARRANGE
        let dir = tempfile::tempdir().unwrap();
        let cluster = start_cluster(3, "g", HashStrategy::Consistent, dir.path()).await;
        seed(&cluster[0], "store", &[("d1", "aab"), ("d2", "abb")]).await;

        // ACT
        let report = MapReduce::new(cluster[1].ctx.clone(), "g")
            .exec(JobSpec::new(LETTERS_MAP, SUM_REDUCE).with_keys(["d1", "d2"]))
            .await
            .unwrap();

        // ASSERT
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.results, numbers(&[("a", 3.0), ("b", 3.0)]));
        assert_eq!(report.map.total, 2);
        assert_eq!(report.shuffle.total, 6);
        assert_eq!(report.reduce.processed, 2);
        for phase in [report.map, report.shuffle, report.reduce] {
            assert_eq!(phase.state, PhaseState::Completed);
        }

        // buckets are gone, inputs are untouched
        let mut stored = Vec::new();
        for handle in &cluster {
            assert!(handle.ctx.store.keys(&bucket_namespace("g")).await.unwrap().is_empty());
            stored.extend(handle.ctx.store.keys("g").await.unwrap());
        }
        stored.sort();
        assert_eq!(stored, vec!["d1", "d2"]);
        let store = DistributedStore::new(&cluster[2].ctx, "g", "store").unwrap();
        assert_eq!(store.get("d1").await.unwrap(), Value::string("aab"));

        stop_all(cluster).await;
    }

    #[tokio::test]
    async fn test_job_over_all_stored_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = start_cluster(3, "g", HashStrategy::Rendezvous, dir.path()).await;
        seed(
            &cluster[0],
            "mem",
            &[
                ("m1", "the whale and the sea"),
                ("m2", "the sea"),
                ("m3", "whale"),
            ],
        )
        .await;

        let report = MapReduce::new(cluster[2].ctx.clone(), "g")
            .exec(JobSpec::new(WORDS_MAP, SUM_REDUCE).in_memory())
            .await
            .unwrap();

        assert!(report.errors.is_empty());
        assert_eq!(report.map.total, 3);
        assert_eq!(
            report.results,
            numbers(&[("and", 1.0), ("sea", 2.0), ("the", 3.0), ("whale", 2.0)])
        );
        stop_all(cluster).await;
    }

    #[test]
    fn test_error_map_keeps_repeated_failures() {
        // ARRANGE: the same key fails twice in one phase
        let mut report = JobReport::new("job".into());
        report.fail(Phase::Shuffle, "k", RpcError::Transport("first".into()));
        report.fail(Phase::Shuffle, "k", RpcError::Transport("second".into()));
        report.fail(Phase::Reduce, "k", RpcError::Transport("third".into()));

        // ACT
        let errors = report.error_map().as_map().unwrap();

        // ASSERT
        assert_eq!(errors.len(), 3);
        assert!(errors.contains_key("shuffle:k"));
        assert!(errors.contains_key("shuffle:k#2"));
        assert!(errors.contains_key("reduce:k"));
    }

    #[tokio::test]
    async fn test_missing_key_fails_only_that_key() {
        // ARRANGE
        let dir = tempfile::tempdir().unwrap();
        let cluster = start_cluster(2, "g", HashStrategy::Naive, dir.path()).await;
        seed(&cluster[0], "store", &[("d1", "aab")]).await;

        // ACT
        let report = MapReduce::new(cluster[0].ctx.clone(), "g")
            .exec(JobSpec::new(LETTERS_MAP, SUM_REDUCE).with_keys(["d1", "ghost"]))
            .await
            .unwrap();

        // ASSERT
        assert_eq!(report.results, numbers(&[("a", 2.0), ("b", 1.0)]));
        assert_eq!(report.errors.len(), 1);
        let failure = &report.errors[0];
        assert_eq!(failure.phase, Phase::Map);
        assert_eq!(failure.key, "ghost");
        assert!(failure.error.is_not_found());
        assert_eq!(report.map.errors, 1);
        assert_eq!(report.map.processed, 2);

        let errors = report.error_map().as_map().unwrap();
        assert!(errors.contains_key("map:ghost"));

        stop_all(cluster).await;
    }

    #[tokio::test]
    async fn test_reduce_failures_are_reported_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = start_cluster(2, "g", HashStrategy::Naive, dir.path()).await;
        seed(&cluster[0], "store", &[("d1", "whale whale sea")]).await;

        // postings are objects, which sum.reduce refuses
        let report = MapReduce::new(cluster[1].ctx.clone(), "g")
            .exec(JobSpec::new(POSTINGS_MAP, SUM_REDUCE).with_keys(["d1"]))
            .await
            .unwrap();

        assert!(report.results.is_empty());
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().all(|e| e.phase == Phase::Reduce));
        assert!(
            report
                .errors
                .iter()
                .all(|e| matches!(e.error, RpcError::Application(_)))
        );
        stop_all(cluster).await;
    }

    #[tokio::test]
    async fn test_failed_reduce_leaves_no_buckets_behind() {
        // ARRANGE: a job whose every reduce fails
        let dir = tempfile::tempdir().unwrap();
        let cluster = start_cluster(2, "g", HashStrategy::Naive, dir.path()).await;
        seed(&cluster[0], "store", &[("d1", "whale whale sea")]).await;
        let failed = MapReduce::new(cluster[0].ctx.clone(), "g")
            .exec(JobSpec::new(POSTINGS_MAP, SUM_REDUCE).with_keys(["d1"]))
            .await
            .unwrap();
        assert_eq!(failed.errors.len(), 2);

        // ASSERT: enumeration sees only the seeded documents
        let store = DistributedStore::new(&cluster[1].ctx, "g", "store").unwrap();
        let (errors, keys) = store.keys().await;
        assert!(errors.is_empty());
        assert_eq!(keys, vec!["d1"]);
        for handle in &cluster {
            assert!(handle.ctx.store.keys(&bucket_namespace("g")).await.unwrap().is_empty());
        }

        // ACT: a keyless job afterwards maps documents only
        let report = MapReduce::new(cluster[1].ctx.clone(), "g")
            .exec(JobSpec::new(WORDS_MAP, SUM_REDUCE))
            .await
            .unwrap();

        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.map.total, 1);
        assert_eq!(report.results, numbers(&[("sea", 1.0), ("whale", 2.0)]));
        stop_all(cluster).await;
    }

    #[tokio::test]
    async fn test_inverted_index_job() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = start_cluster(3, "g", HashStrategy::Consistent, dir.path()).await;
        seed(
            &cluster[0],
            "store",
            &[("moby", "whale whale whale ship"), ("odyssey", "ship sea ship")],
        )
        .await;

        let report = MapReduce::new(cluster[0].ctx.clone(), "g")
            .exec(JobSpec::new(POSTINGS_MAP, POSTINGS_REDUCE).with_keys(["moby", "odyssey"]))
            .await
            .unwrap();

        assert!(report.errors.is_empty());
        let ship = &report.results["ship"];
        assert_eq!(ship.get("df"), Some(Value::Number(2.0)));
        let first = ship.get("postings").and_then(|p| p.as_vec()).unwrap()[0].clone();
        assert_eq!(first.get("document"), Some(Value::string("odyssey")));
        assert_eq!(
            report.results["whale"].get("df"),
            Some(Value::Number(1.0))
        );
        stop_all(cluster).await;
    }

    #[tokio::test]
    async fn test_enumeration_failure_aborts_job() {
        // ARRANGE: one member is down
        let dir = tempfile::tempdir().unwrap();
        let mut cluster = start_cluster(3, "g", HashStrategy::Naive, dir.path()).await;
        let down = cluster.pop().unwrap();
        down.stop().await.unwrap();

        // ACT
        let result = MapReduce::new(cluster[0].ctx.clone(), "g")
            .exec(JobSpec::new(LETTERS_MAP, SUM_REDUCE))
            .await;

        // ASSERT
        match result {
            Err(RpcError::Application(Value::Error(e))) => assert_eq!(e.name, "JobAbortedError"),
            other => panic!("expected an aborted job, got {:?}", other.map(|r| r.id)),
        }
        stop_all(cluster).await;
    }

    #[tokio::test]
    async fn test_unknown_group_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = start_cluster(1, "g", HashStrategy::Naive, dir.path()).await;

        let result = MapReduce::new(cluster[0].ctx.clone(), "nope")
            .exec(JobSpec::new(LETTERS_MAP, SUM_REDUCE).with_keys(["k"]))
            .await;

        assert!(result.unwrap_err().is_not_found());
        stop_all(cluster).await;
    }

    // ============================================================
    // JOB PARSING / RPC TESTS
    // ============================================================

    #[tokio::test]
    async fn test_job_spec_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = start_cluster(1, "g", HashStrategy::Naive, dir.path()).await;
        let functions = cluster[0].ctx.functions();

        // function values are accepted and reduced to their names
        let spec = Value::object([
            ("map", functions.get(LETTERS_MAP).unwrap()),
            ("reduce", Value::string(SUM_REDUCE)),
            ("keys", Value::array(vec![Value::string("d1")])),
            ("service", Value::string("mem")),
        ]);
        let parsed = JobSpec::from_value(&spec, functions).unwrap();
        assert_eq!(
            parsed,
            JobSpec::new(LETTERS_MAP, SUM_REDUCE)
                .with_keys(["d1"])
                .in_memory()
        );
        assert_eq!(JobSpec::from_value(&parsed.to_value(), functions).unwrap(), parsed);

        let unregistered = Value::object([
            ("map", Value::string("nobody.map")),
            ("reduce", Value::string(SUM_REDUCE)),
        ]);
        assert!(matches!(
            JobSpec::from_value(&unregistered, functions),
            Err(RpcError::Validation(_))
        ));

        let bad_service = Value::object([
            ("map", Value::string(LETTERS_MAP)),
            ("reduce", Value::string(SUM_REDUCE)),
            ("service", Value::string("disk")),
        ]);
        assert!(JobSpec::from_value(&bad_service, functions).is_err());

        stop_all(cluster).await;
    }

    #[tokio::test]
    async fn test_exec_over_rpc() {
        // ARRANGE
        let dir = tempfile::tempdir().unwrap();
        let cluster = start_cluster(3, "g", HashStrategy::Naive, dir.path()).await;
        seed(&cluster[0], "store", &[("d1", "aab"), ("d2", "abb")]).await;
        let remote = Remote::new(cluster[2].node().clone(), "mr", "exec").with_gid("g");
        let spec = JobSpec::new(LETTERS_MAP, SUM_REDUCE).with_keys(["d1", "d2"]);

        // ACT
        let reply = cluster[0]
            .ctx
            .comm
            .send(vec![spec.to_value()], &remote)
            .await
            .unwrap();

        // ASSERT
        assert!(!reply.is_err());
        assert_eq!(reply.error, Value::empty_object());
        let results = reply.value.get("results").unwrap();
        assert_eq!(results.get("a"), Some(Value::Number(3.0)));
        assert_eq!(results.get("b"), Some(Value::Number(3.0)));
        let map = reply
            .value
            .get("phases")
            .and_then(|p| p.get("map"))
            .unwrap();
        assert_eq!(map.get("state"), Some(Value::string("completed")));

        stop_all(cluster).await;
    }
}
