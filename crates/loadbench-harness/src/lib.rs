//! Test-execution core for loadbench.
//!
//! - [`concurrency`]: time-shaped worker pool driven by a [`LoadPattern`]
//! - [`metrics`]: latency/throughput collection and JSON/CSV export
//! - [`workload`]: distribution-weighted query selection
//! - [`executor`]: timed execution of catalog queries
//! - [`snapshot`]: ephemeral snapshot keyspaces for isolated runs
//! - [`runner`]: the benchmark state machine tying it all together

pub mod concurrency;
pub mod executor;
pub mod metrics;
pub mod runner;
pub mod snapshot;
pub mod workload;

pub use concurrency::{ConcurrencyManager, LoadPattern, PatternClock};
pub use executor::{ExecutorSummary, QueryExecutor};
pub use metrics::{
    format_summary, percentile, AggregateStats, BucketStats, IntervalMetrics, MetricsCollector,
    MetricsExport, QueryStats,
};
pub use runner::{planned_duration, BenchmarkRunner, DryRunReport, RunPhase, RunSummary};
pub use snapshot::{
    cleanup_stale_snapshots, drop_snapshot_keyspace, is_snapshot_of, snapshot_keyspace,
    snapshot_name, split_schema_statements, SnapshotReport,
};
pub use workload::WorkloadSelector;
