use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rand::seq::SliceRandom;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use loadbench_core::{Connector, LoadbenchConfig, QueryType};
use loadbench_harness::{
    cleanup_stale_snapshots, planned_duration, BenchmarkRunner, QueryExecutor,
};
use loadbench_store::{MemoryConnector, MemoryStore};

mod catalog;
mod datagen;

use catalog::brokerage_catalog;

#[derive(Parser, Debug)]
#[command(name = "loadbench")]
#[command(about = "Weighted OLTP load-testing harness for keyspace data stores", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(long, short, env = "LOADBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full benchmark: snapshot, warmup, measurement, export
    RunBenchmark {
        /// Connect and validate the setup without executing queries
        #[arg(long)]
        dry_run: bool,
    },

    /// Execute queries of one type and report success rate and latency
    RunQuery {
        /// select, insert, update or delete
        query_type: QueryType,

        /// Number of queries to execute
        #[arg(long, short = 'n', default_value = "100")]
        iterations: usize,
    },

    /// Show the query catalog
    Info,

    /// Drop snapshot keyspaces left over by previous runs
    Cleanup,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = LoadbenchConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_logging(&config, cli.verbose);

    match cli.command {
        Command::RunBenchmark { dry_run } => run_benchmark(config, dry_run).await,
        Command::RunQuery {
            query_type,
            iterations,
        } => run_query(config, query_type, iterations).await,
        Command::Info => show_info(&config),
        Command::Cleanup => cleanup(config).await,
    }
}

/// Initialize logging. `RUST_LOG` wins over the configured level.
fn init_logging(config: &LoadbenchConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt().with_env_filter(env_filter).with_target(false).init();
}

/// Seed an in-memory store with the configured schema and dataset.
async fn connector(config: &LoadbenchConfig) -> anyhow::Result<Arc<MemoryConnector>> {
    let schema_file = &config.benchmark.schema_file;
    let schema = tokio::fs::read_to_string(schema_file)
        .await
        .with_context(|| format!("reading schema file {}", schema_file.display()))?;

    let store = MemoryStore::new();
    datagen::seed(
        &store,
        &config.store.keyspace,
        &schema,
        config.store.replication_factor,
        &config.data_generation,
    )
    .await?;

    Ok(Arc::new(MemoryConnector::new(store)))
}

async fn run_benchmark(config: LoadbenchConfig, dry_run: bool) -> anyhow::Result<()> {
    let catalog = brokerage_catalog(&config.data_generation)?;
    let connector = connector(&config).await?;
    let mut runner = BenchmarkRunner::new(config, catalog, connector)?;

    if dry_run {
        let report = runner.dry_run().await?;
        info!(
            keyspace = ?report.keyspace,
            available_queries = report.available_queries,
            "Dry run complete, no queries executed"
        );
        for (query_type, count) in &report.queries_by_type {
            info!("  {query_type}: {count} queries");
        }
        return Ok(());
    }

    info!(
        planned_secs = planned_duration(runner.config()).as_secs_f64(),
        "Starting benchmark, including warmup and cooldown"
    );
    let summary = runner.run().await?;
    if summary.interrupted {
        warn!("Benchmark interrupted, results cover a partial run");
    }
    for path in &summary.exported {
        info!(path = %path.display(), "Results written");
    }
    Ok(())
}

async fn run_query(
    config: LoadbenchConfig,
    query_type: QueryType,
    iterations: usize,
) -> anyhow::Result<()> {
    let catalog = brokerage_catalog(&config.data_generation)?;
    let candidates = catalog.by_type(query_type);
    if candidates.is_empty() {
        bail!("no {query_type} queries in the catalog");
    }

    let session = connector(&config).await?.connect(&config.store).await?;
    let executor = QueryExecutor::new(Arc::clone(&session));

    info!(%query_type, iterations, "Executing queries");
    for i in 0..iterations {
        let Some(definition) = candidates.choose(&mut rand::thread_rng()).copied() else {
            break;
        };
        executor.execute(definition).await;
        if (i + 1) % 10 == 0 {
            info!("Completed {}/{} queries", i + 1, iterations);
        }
    }

    let summary = executor.metrics_summary();
    info!(
        success_rate_percent = summary.success_rate_percent,
        avg_latency_ms = summary.average_latency_ms,
        failed = summary.failed_executions,
        "Query run complete"
    );

    session.close().await?;
    Ok(())
}

fn show_info(config: &LoadbenchConfig) -> anyhow::Result<()> {
    let catalog = brokerage_catalog(&config.data_generation)?;

    info!(total = catalog.len(), "Query catalog");
    info!("By type:");
    for (query_type, count) in catalog.count_by_type() {
        info!("  {query_type}: {count}");
    }
    info!("By complexity:");
    for (complexity, count) in catalog.count_by_complexity() {
        info!("  {complexity}: {count}");
    }
    for definition in catalog.all() {
        info!(
            "  {:<22} {:<7} {:<8} {}",
            definition.query_id,
            definition.query_type.as_str(),
            definition.complexity.as_str(),
            definition.description
        );
    }
    Ok(())
}

async fn cleanup(config: LoadbenchConfig) -> anyhow::Result<()> {
    let session = connector(&config).await?.connect(&config.store).await?;

    let dropped = cleanup_stale_snapshots(session.as_ref(), &config.store.keyspace).await?;
    info!(dropped = dropped.len(), "Snapshot cleanup complete");

    session.close().await?;
    Ok(())
}
