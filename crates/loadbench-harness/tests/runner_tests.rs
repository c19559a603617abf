//! End-to-end runner tests against the in-memory store

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{catalog, seeded_store, BASE_KEYSPACE, SCHEMA};
use loadbench_core::{
    CoreError, ExportFormat, LoadPattern, LoadbenchConfig, QueryCatalog, QueryType, StoreSession,
};
use loadbench_harness::{
    is_snapshot_of, planned_duration, BenchmarkRunner, MetricsExport, RunPhase,
};
use loadbench_store::{MemoryConnector, MemoryStore};

fn test_config(dir: &Path) -> LoadbenchConfig {
    let schema_file = dir.join("schema.cql");
    std::fs::write(&schema_file, SCHEMA).unwrap();

    let mut config = LoadbenchConfig::default();
    config.store.keyspace = BASE_KEYSPACE.to_string();
    config.store.simulated_latency_us = 200;
    config.benchmark.concurrency = 4;
    config.benchmark.duration_seconds = 1.2;
    config.benchmark.warmup_seconds = 0.2;
    config.benchmark.cooldown_seconds = 0.1;
    config.benchmark.snapshot_before_benchmark = true;
    config.benchmark.schema_file = schema_file;
    config.metrics.collection_interval = 0.5;
    config.metrics.output_dir = dir.join("results");
    config
}

fn runner(config: LoadbenchConfig, store: &MemoryStore) -> BenchmarkRunner {
    BenchmarkRunner::new(
        config,
        catalog(),
        Arc::new(MemoryConnector::new(store.clone())),
    )
    .unwrap()
}

fn snapshots(keyspaces: &[String]) -> Vec<&String> {
    keyspaces
        .iter()
        .filter(|k| is_snapshot_of(BASE_KEYSPACE, k))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_run_against_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let mut runner = runner(test_config(dir.path()), &store);

    let summary = runner
        .run_until(std::future::pending::<()>())
        .await
        .unwrap();

    assert!(!summary.interrupted);
    assert_eq!(summary.windows, 3);
    assert!(summary.stats.total_queries > 0);
    assert!(summary.stats.total_errors > 0, "always_fails should be recorded");
    assert!(summary.stats.error_rate > 0.0 && summary.stats.error_rate < 1.0);
    assert!(summary.stats.by_type.contains_key(&QueryType::Select));
    assert!(!summary.stats.by_type.contains_key(&QueryType::Update));
    assert_eq!(
        summary.executor.total_executions as usize,
        summary.stats.total_queries + summary.stats.total_errors
    );

    // Deletes ran against the snapshot, which is gone again.
    let snapshot = summary.snapshot_keyspace.clone().unwrap();
    assert!(summary.snapshot_dropped);
    assert!(snapshots(&store.list_keyspaces().await.unwrap()).is_empty());
    assert_eq!(store.row_count(BASE_KEYSPACE, "trade").unwrap(), 10);
    assert!(is_snapshot_of(BASE_KEYSPACE, &snapshot));

    assert_eq!(runner.phase(), RunPhase::Closed);
    assert_eq!(runner.collector().unwrap().time_series().len(), 3);

    assert_eq!(summary.exported.len(), 2);
    for path in &summary.exported {
        assert!(path.exists(), "{} missing", path.display());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_json_export_round_trips_summary() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let mut config = test_config(dir.path());
    config.metrics.export_format = vec![ExportFormat::Json];
    config.benchmark.load_pattern = LoadPattern::RampUp;
    let mut runner = runner(config, &store);

    let summary = runner
        .run_until(std::future::pending::<()>())
        .await
        .unwrap();
    assert_eq!(summary.exported.len(), 1);

    let text = std::fs::read_to_string(&summary.exported[0]).unwrap();
    let export: MetricsExport = serde_json::from_str(&text).unwrap();

    assert_eq!(export.summary.total_queries, summary.stats.total_queries);
    assert_eq!(export.summary.total_errors, summary.stats.total_errors);
    assert!((export.summary.avg_latency_ms - summary.stats.avg_latency_ms).abs() < 1e-9);
    assert_eq!(export.time_series.len(), 3);
    assert!(export.per_query.contains_key("get_customer"));
    assert!(!export.per_query.contains_key("always_fails"));
    assert!(export.errors.iter().all(|e| e.query_id == "always_fails"));

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    for key in ["summary", "time_series", "per_query", "errors"] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interrupt_still_exports_and_tears_down() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let mut config = test_config(dir.path());
    config.benchmark.duration_seconds = 60.0;
    let mut runner = runner(config, &store);

    let started = Instant::now();
    let summary = runner
        .run_until(tokio::time::sleep(Duration::from_millis(800)))
        .await
        .unwrap();

    assert!(summary.interrupted);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(summary.stats.total_queries > 0);
    assert!(summary.windows >= 1);
    assert!(summary.snapshot_dropped);
    assert!(snapshots(&store.list_keyspaces().await.unwrap()).is_empty());
    assert!(summary.exported.iter().all(|p| p.exists()));
    assert_eq!(runner.phase(), RunPhase::Closed);
}

#[tokio::test]
async fn test_cleanup_disabled_keeps_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let mut config = test_config(dir.path());
    config.benchmark.cleanup_benchmark_keyspace = false;
    config.benchmark.duration_seconds = 0.3;
    config.benchmark.warmup_seconds = 0.0;
    config.benchmark.cooldown_seconds = 0.0;
    let mut runner = runner(config, &store);

    let summary = runner
        .run_until(std::future::pending::<()>())
        .await
        .unwrap();

    assert!(!summary.snapshot_dropped);
    let keyspaces = store.list_keyspaces().await.unwrap();
    assert_eq!(snapshots(&keyspaces).len(), 1);
    assert_eq!(
        snapshots(&keyspaces)[0],
        summary.snapshot_keyspace.as_ref().unwrap()
    );
}

#[tokio::test]
async fn test_run_without_snapshot_targets_base_keyspace() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let mut config = test_config(dir.path());
    config.benchmark.snapshot_before_benchmark = false;
    config.benchmark.duration_seconds = 0.5;
    config.benchmark.warmup_seconds = 0.0;
    config.benchmark.cooldown_seconds = 0.0;
    let mut runner = runner(config, &store);

    let summary = runner
        .run_until(std::future::pending::<()>())
        .await
        .unwrap();

    assert!(summary.snapshot_keyspace.is_none());
    assert!(snapshots(&store.list_keyspaces().await.unwrap()).is_empty());
    // Deletes hit the base keyspace directly.
    assert!(store.row_count(BASE_KEYSPACE, "trade").unwrap() < 10);
}

#[tokio::test]
async fn test_dry_run_executes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let config = test_config(dir.path());
    let output_dir = config.metrics.output_dir.clone();
    let mut runner = runner(config, &store);
    let seeded_ops = store.operation_count();

    let report = runner.dry_run().await.unwrap();

    assert_eq!(report.available_queries, 3);
    assert_eq!(report.keyspace.as_deref(), Some(BASE_KEYSPACE));
    assert_eq!(report.queries_by_type[&QueryType::Select], 1);
    assert_eq!(store.operation_count(), seeded_ops);
    assert!(!output_dir.exists());
    assert_eq!(runner.phase(), RunPhase::Closed);
}

#[tokio::test]
async fn test_dry_run_requires_queries() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let mut runner = BenchmarkRunner::new(
        test_config(dir.path()),
        QueryCatalog::new(),
        Arc::new(MemoryConnector::new(store)),
    )
    .unwrap();

    assert!(matches!(
        runner.dry_run().await,
        Err(CoreError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_connection_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::new();
    let mut runner = runner(test_config(dir.path()), &store);

    let err = runner
        .run_until(std::future::pending::<()>())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Connection { .. }));
    assert!(err.is_fatal());
    assert_eq!(runner.phase(), RunPhase::Disconnected);
    assert!(runner.session().is_none());
}

#[tokio::test]
async fn test_snapshot_failure_aborts_before_measuring() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let mut config = test_config(dir.path());
    config.benchmark.schema_file = dir.path().join("missing.cql");
    let mut runner = runner(config, &store);
    let seeded_ops = store.operation_count();

    let err = runner
        .run_until(std::future::pending::<()>())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Snapshot { .. }));
    assert!(snapshots(&store.list_keyspaces().await.unwrap()).is_empty());
    assert_eq!(store.operation_count(), seeded_ops);
    assert!(runner.collector().is_none());
    assert_eq!(runner.phase(), RunPhase::Closed);
}

#[test]
fn test_planned_duration_spans_every_phase() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let planned = planned_duration(&config);
    assert!((planned.as_secs_f64() - 1.5).abs() < 1e-3);

    let mut config = test_config(dir.path());
    config.benchmark.warmup_seconds = 0.0;
    config.benchmark.cooldown_seconds = 0.0;
    let planned = planned_duration(&config);
    assert!((planned.as_secs_f64() - 1.2).abs() < 1e-3);

    let mut config = test_config(dir.path());
    config.benchmark.duration_seconds = 1.5e19;
    config.benchmark.warmup_seconds = 1.5e19;
    assert!(config.validate().is_ok());
    assert_eq!(planned_duration(&config), Duration::MAX);
}

#[test]
fn test_invalid_config_rejected_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.benchmark.concurrency = 0;

    let result = BenchmarkRunner::new(
        config,
        catalog(),
        Arc::new(MemoryConnector::new(MemoryStore::new())),
    );
    assert!(matches!(result, Err(CoreError::Configuration(_))));
}

#[tokio::test]
async fn test_runner_cannot_be_reused() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let mut runner = runner(test_config(dir.path()), &store);
    runner.dry_run().await.unwrap();

    assert!(matches!(
        runner.run_until(std::future::pending::<()>()).await,
        Err(CoreError::InvalidState { .. })
    ));
}
