//! Benchmark orchestration.
//!
//! [`BenchmarkRunner`] drives one run through its phases:
//!
//! ```text
//! Disconnected -> Connected -> [SnapshotCreated] -> Initialized -> Warmup
//!     -> Measuring -> Cooldown -> Exported -> [TornDown] -> Closed
//! ```
//!
//! Failures up to and including snapshot creation abort the run. Individual
//! query failures during measurement are recorded as errors and the run
//! continues. An interrupt during warmup or measurement skips straight to
//! cooldown, export and teardown so partial results are kept.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use tokio::time::Instant;

use loadbench_core::{
    Connector, CoreError, CoreResult, ExportFormat, LoadbenchConfig, QueryCatalog,
    QueryDefinition, QueryType, StoreSession,
};

use crate::concurrency::{ConcurrencyManager, PatternClock};
use crate::executor::{ExecutorSummary, QueryExecutor};
use crate::metrics::{AggregateStats, MetricsCollector};
use crate::snapshot::{drop_snapshot_keyspace, snapshot_keyspace, snapshot_name};
use crate::workload::WorkloadSelector;

/// Lifecycle state of a [`BenchmarkRunner`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunPhase {
    Disconnected,
    Connected,
    SnapshotCreated,
    Initialized,
    Warmup,
    Measuring,
    Cooldown,
    Exported,
    TornDown,
    Closed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::SnapshotCreated => "snapshot_created",
            Self::Initialized => "initialized",
            Self::Warmup => "warmup",
            Self::Measuring => "measuring",
            Self::Cooldown => "cooldown",
            Self::Exported => "exported",
            Self::TornDown => "torn_down",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Result of [`BenchmarkRunner::dry_run`].
#[derive(Debug, Clone, PartialEq)]
pub struct DryRunReport {
    pub keyspace: Option<String>,
    pub available_queries: usize,
    pub queries_by_type: BTreeMap<QueryType, usize>,
}

/// Result of a completed (or interrupted) run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stats: AggregateStats,
    pub executor: ExecutorSummary,
    /// Number of measurement windows executed.
    pub windows: usize,
    pub interrupted: bool,
    pub snapshot_keyspace: Option<String>,
    pub snapshot_dropped: bool,
    pub exported: Vec<PathBuf>,
}

struct Components {
    executor: Arc<QueryExecutor>,
    collector: Arc<MetricsCollector>,
    manager: ConcurrencyManager,
}

/// Runs a benchmark against a store reached through a [`Connector`].
pub struct BenchmarkRunner {
    config: LoadbenchConfig,
    catalog: QueryCatalog,
    connector: Arc<dyn Connector>,
    session: Option<Arc<dyn StoreSession>>,
    snapshot: Option<String>,
    collector: Option<Arc<MetricsCollector>>,
    phase: RunPhase,
}

impl BenchmarkRunner {
    /// Create a runner. The configuration is validated before anything else.
    pub fn new(
        config: LoadbenchConfig,
        catalog: QueryCatalog,
        connector: Arc<dyn Connector>,
    ) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            catalog,
            connector,
            session: None,
            snapshot: None,
            collector: None,
            phase: RunPhase::Disconnected,
        })
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn config(&self) -> &LoadbenchConfig {
        &self.config
    }

    /// Session opened by [`connect`](Self::connect), if any.
    pub fn session(&self) -> Option<&Arc<dyn StoreSession>> {
        self.session.as_ref()
    }

    /// Collector of the last run, kept for inspection after it finishes.
    pub fn collector(&self) -> Option<&Arc<MetricsCollector>> {
        self.collector.as_ref()
    }

    fn advance(&mut self, next: RunPhase) {
        debug_assert!(next >= self.phase, "phase {} -> {}", self.phase, next);
        tracing::debug!(from = %self.phase, to = %next, "Run phase transition");
        self.phase = next;
    }

    /// Open the long-lived session. Any failure is a connection error.
    pub async fn connect(&mut self) -> CoreResult<()> {
        if self.phase != RunPhase::Disconnected {
            return Err(CoreError::invalid_state(format!(
                "cannot connect while {}",
                self.phase
            )));
        }

        let store = &self.config.store;
        let session = self
            .connector
            .connect(store)
            .await
            .map_err(into_connection_error)?;
        session.ping().await.map_err(into_connection_error)?;

        tracing::info!(
            contact_points = ?store.contact_points,
            port = store.port,
            keyspace = %store.keyspace,
            "Connected to store"
        );
        self.session = Some(session);
        self.advance(RunPhase::Connected);
        Ok(())
    }

    /// Validate connectivity and catalog availability without running queries.
    pub async fn dry_run(&mut self) -> CoreResult<DryRunReport> {
        tracing::info!("Dry run mode - validating configuration");
        if self.phase == RunPhase::Disconnected {
            self.connect().await?;
        }
        let session = self.require_session()?;
        tracing::info!("Connection successful");

        let report = if self.catalog.is_empty() {
            Err(CoreError::configuration("no queries registered in the catalog"))
        } else {
            Ok(DryRunReport {
                keyspace: session.keyspace(),
                available_queries: self.catalog.len(),
                queries_by_type: self.catalog.count_by_type(),
            })
        };
        if let Ok(report) = &report {
            tracing::info!(
                available_queries = report.available_queries,
                "Dry run completed successfully"
            );
        }

        self.close().await;
        report
    }

    /// Run the full benchmark, treating Ctrl-C as an interrupt.
    pub async fn run(&mut self) -> CoreResult<RunSummary> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Cannot listen for Ctrl-C, interrupts disabled");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run the full benchmark; `shutdown` completing counts as an interrupt.
    pub async fn run_until<F>(&mut self, shutdown: F) -> CoreResult<RunSummary>
    where
        F: Future<Output = ()>,
    {
        match self.phase {
            RunPhase::Disconnected => self.connect().await?,
            RunPhase::Connected => {}
            other => {
                return Err(CoreError::invalid_state(format!(
                    "cannot start a run while {other}"
                )))
            }
        }

        let outcome = self.run_connected(shutdown).await;
        let snapshot_dropped = self.teardown().await;
        self.close().await;

        let mut summary = outcome?;
        summary.snapshot_dropped = snapshot_dropped;
        Ok(summary)
    }

    async fn run_connected<F>(&mut self, shutdown: F) -> CoreResult<RunSummary>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Starting benchmark execution");
        let workload = WorkloadSelector::from_config(&self.config.benchmark).select(&self.catalog);
        if workload.is_empty() {
            return Err(CoreError::configuration(
                "no catalog queries match the configured distributions",
            ));
        }

        if self.config.benchmark.snapshot_before_benchmark {
            self.setup_snapshot().await?;
        }

        let components = self.initialize()?;
        let warmup_sample = self.warmup_sample();

        tokio::pin!(shutdown);

        self.advance(RunPhase::Warmup);
        let mut interrupted = tokio::select! {
            _ = self.warmup(&components.executor, &warmup_sample) => false,
            _ = &mut shutdown => true,
        };
        components.executor.reset_metrics();
        components.collector.reset();

        let mut windows = 0;
        if !interrupted {
            self.advance(RunPhase::Measuring);
            // Interrupting drops the worker pool, abandoning queries still in flight.
            let measured = tokio::select! {
                count = self.measure(&components, &workload) => Some(count),
                _ = &mut shutdown => None,
            };
            match measured {
                Some(count) => windows = count,
                None => interrupted = true,
            }
        }

        if interrupted {
            tracing::info!("Benchmark interrupted by user");
            let last = components.collector.collect_interval();
            windows = components.collector.time_series().len();
            tracing::info!(total_queries = last.total_queries, "Recorded partial interval");
        }

        self.advance(RunPhase::Cooldown);
        let cooldown = self.config.benchmark.cooldown();
        if !cooldown.is_zero() {
            tracing::info!(seconds = cooldown.as_secs_f64(), "Cooldown period");
            tokio::time::sleep(cooldown).await;
        }

        tracing::info!("Exporting metrics");
        let exported = self.export(&components.collector)?;
        self.advance(RunPhase::Exported);
        components.collector.print_summary();
        tracing::info!("Benchmark execution completed");

        Ok(RunSummary {
            stats: components.collector.aggregate(),
            executor: components.executor.metrics_summary(),
            windows,
            interrupted,
            snapshot_keyspace: self.snapshot.clone(),
            snapshot_dropped: false,
            exported,
        })
    }

    async fn setup_snapshot(&mut self) -> CoreResult<()> {
        let session = self.require_session()?;
        let base = self.config.store.keyspace.clone();
        let target = snapshot_name(&base);
        let schema_file = &self.config.benchmark.schema_file;

        tracing::info!(keyspace = %target, "Creating benchmark snapshot keyspace");
        let schema = tokio::fs::read_to_string(schema_file).await.map_err(|e| {
            CoreError::snapshot(
                &target,
                format!("cannot read schema file {}: {e}", schema_file.display()),
            )
        })?;

        snapshot_keyspace(
            session.as_ref(),
            &base,
            &target,
            &schema,
            self.config.store.replication_factor,
        )
        .await?;
        if let Err(e) = session.set_keyspace(&target).await {
            if let Err(drop_err) = drop_snapshot_keyspace(session.as_ref(), &target).await {
                tracing::warn!(keyspace = %target, error = %drop_err, "Could not drop unusable snapshot");
            }
            return Err(CoreError::snapshot(&target, e.to_string()));
        }
        self.snapshot = Some(target.clone());
        tracing::info!(keyspace = %target, "Benchmark will run against snapshot keyspace");

        self.advance(RunPhase::SnapshotCreated);
        Ok(())
    }

    fn initialize(&mut self) -> CoreResult<Components> {
        let session = self.require_session()?;
        let collector = Arc::new(MetricsCollector::new(&self.config.metrics.output_dir)?);
        self.collector = Some(Arc::clone(&collector));

        let components = Components {
            executor: Arc::new(QueryExecutor::new(session)),
            collector,
            manager: ConcurrencyManager::new(self.config.benchmark.concurrency),
        };
        tracing::info!(
            concurrency = self.config.benchmark.concurrency,
            output_dir = %self.config.metrics.output_dir.display(),
            "All benchmark components initialized"
        );
        self.advance(RunPhase::Initialized);
        Ok(components)
    }

    fn warmup_sample(&self) -> Vec<QueryDefinition> {
        let all = self.catalog.all();
        let size = self.config.benchmark.warmup_sample_size.min(all.len());
        all.choose_multiple(&mut rand::thread_rng(), size)
            .cloned()
            .collect()
    }

    async fn warmup(&self, executor: &QueryExecutor, sample: &[QueryDefinition]) {
        let duration = self.config.benchmark.warmup();
        if duration.is_zero() || sample.is_empty() {
            tracing::info!("Skipping warmup phase");
            return;
        }

        tracing::info!(seconds = duration.as_secs_f64(), queries = sample.len(), "Starting warmup phase");
        let start = Instant::now();
        while start.elapsed() < duration {
            let pick = rand::thread_rng().gen_range(0..sample.len());
            let result = executor.execute(&sample[pick]).await;
            if let Some(error) = result.error {
                tracing::debug!(query_id = %result.query_id, %error, "Warmup query error");
            }
            tokio::task::yield_now().await;
        }
        tracing::info!("Warmup phase completed");
    }

    /// Run measurement windows until the configured duration has elapsed.
    /// Returns the number of windows executed.
    async fn measure(&self, components: &Components, workload: &[QueryDefinition]) -> usize {
        let bench = &self.config.benchmark;
        let duration = bench.duration();
        let interval = self.config.metrics.collection_interval();
        tracing::info!(
            seconds = duration.as_secs_f64(),
            pattern = %bench.load_pattern,
            workload = workload.len(),
            "Running benchmark"
        );

        let executor = Arc::clone(&components.executor);
        let collector = Arc::clone(&components.collector);
        let task = move |definition: QueryDefinition| {
            let executor = Arc::clone(&executor);
            let collector = Arc::clone(&collector);
            async move {
                let result = executor.execute(&definition).await;
                collector.record(result);
                Ok::<(), Infallible>(())
            }
        };

        let start = Instant::now();
        let mut windows = 0;
        loop {
            let elapsed = start.elapsed();
            if elapsed >= duration {
                break;
            }
            let window = interval.min(duration - elapsed);

            let completed = components
                .manager
                .execute_with_clock(
                    &task,
                    workload,
                    window,
                    bench.load_pattern,
                    PatternClock::run(elapsed, duration),
                )
                .await;
            windows += 1;

            let metrics = components.collector.collect_interval();
            tracing::info!(
                window = windows,
                completed = completed.len(),
                qps = format_args!("{:.2}", metrics.qps),
                p95_ms = format_args!("{:.2}", metrics.latency_p95_ms),
                p99_ms = format_args!("{:.2}", metrics.latency_p99_ms),
                errors = metrics.error_count,
                "Interval metrics"
            );
        }
        windows
    }

    fn export(&self, collector: &MetricsCollector) -> CoreResult<Vec<PathBuf>> {
        let metrics = &self.config.metrics;
        let mut exported = Vec::new();
        if metrics.exports(ExportFormat::Json) {
            exported.push(collector.export_json(None)?);
        }
        if metrics.exports(ExportFormat::Csv) {
            exported.push(collector.export_csv(None)?);
        }
        Ok(exported)
    }

    /// Drop the snapshot keyspace if cleanup is enabled. Returns whether it was dropped.
    async fn teardown(&mut self) -> bool {
        let Some(keyspace) = self.snapshot.clone() else {
            return false;
        };
        if !self.config.benchmark.cleanup_benchmark_keyspace {
            tracing::info!(keyspace = %keyspace, "Keeping snapshot keyspace (cleanup disabled)");
            return false;
        }
        let Some(session) = self.session.clone() else {
            return false;
        };

        tracing::info!(keyspace = %keyspace, "Cleaning up benchmark snapshot keyspace");
        match drop_snapshot_keyspace(session.as_ref(), &keyspace).await {
            Ok(()) => {
                self.advance(RunPhase::TornDown);
                true
            }
            Err(e) => {
                tracing::error!(keyspace = %keyspace, error = %e, "Failed to drop snapshot keyspace");
                false
            }
        }
    }

    /// Release the session. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::warn!(error = %e, "Error while closing session");
            }
            tracing::info!("Store session closed");
        }
        if self.phase != RunPhase::Closed {
            self.advance(RunPhase::Closed);
        }
    }

    fn require_session(&self) -> CoreResult<Arc<dyn StoreSession>> {
        self.session
            .clone()
            .ok_or_else(|| CoreError::invalid_state("not connected"))
    }
}

fn into_connection_error(e: CoreError) -> CoreError {
    match e {
        CoreError::Connection { .. } => e,
        other => CoreError::connection(other.to_string()),
    }
}

/// Total configured wall-clock time of a run, excluding snapshot work.
pub fn planned_duration(config: &LoadbenchConfig) -> Duration {
    let bench = &config.benchmark;
    bench
        .warmup()
        .saturating_add(bench.duration())
        .saturating_add(bench.cooldown())
}
