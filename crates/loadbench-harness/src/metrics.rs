//! Latency and throughput collection
//!
//! The collector keeps every successful latency sample, indexed by query id,
//! query type and complexity, and computes linear-interpolation percentiles
//! over the full sample set on demand. Memory grows with the number of
//! executed queries, which is fine for a single benchmark run but not for
//! unbounded soak tests.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use loadbench_core::{Complexity, CoreError, CoreResult, ErrorRecord, QueryType, TaskResult};

/// Linear-interpolation percentile of `samples` (`pct` in 0..=100).
///
/// Returns 0.0 for an empty sample set.
pub fn percentile(samples: &[f64], pct: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_sorted(&sorted, pct)
}

fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

fn sorted_copy(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Snapshot taken by [`MetricsCollector::collect_interval`].
///
/// Latency figures cover every sample recorded since the collector was
/// created (or last reset); `qps` divides that total by the time since the
/// previous snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalMetrics {
    pub timestamp: DateTime<Utc>,
    pub elapsed_seconds: f64,
    pub interval_seconds: f64,
    pub total_queries: usize,
    pub qps: f64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub latency_p999_ms: f64,
    pub latency_max_ms: f64,
    pub latency_avg_ms: f64,
    pub error_count: usize,
}

/// Latency summary for one query type or complexity tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub count: usize,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
}

impl BucketStats {
    fn from_samples(samples: &[f64]) -> Self {
        let sorted = sorted_copy(samples);
        Self {
            count: samples.len(),
            avg_latency_ms: mean(samples),
            p95_latency_ms: percentile_sorted(&sorted, 95.0),
            p99_latency_ms: percentile_sorted(&sorted, 99.0),
        }
    }
}

/// Latency summary for one catalog query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    pub query_id: String,
    pub query_name: String,
    pub count: usize,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub p999_latency_ms: f64,
    pub max_latency_ms: f64,
    pub min_latency_ms: f64,
}

/// Whole-run statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_queries: usize,
    pub elapsed_seconds: f64,
    pub queries_per_second: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub p999_latency_ms: f64,
    pub max_latency_ms: f64,
    pub min_latency_ms: f64,
    pub total_errors: usize,
    /// `errors / (successes + errors)`, 0.0 when nothing ran.
    pub error_rate: f64,
    pub error_rate_percent: f64,
    pub by_type: BTreeMap<QueryType, BucketStats>,
    pub by_complexity: BTreeMap<Complexity, BucketStats>,
}

/// Layout of the JSON export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsExport {
    pub summary: AggregateStats,
    pub time_series: Vec<IntervalMetrics>,
    pub per_query: BTreeMap<String, QueryStats>,
    pub errors: Vec<ErrorRecord>,
}

struct CollectorState {
    started: Instant,
    last_collection: Instant,
    latencies: Vec<f64>,
    by_query: BTreeMap<String, Vec<f64>>,
    query_names: BTreeMap<String, String>,
    by_type: BTreeMap<QueryType, Vec<f64>>,
    by_complexity: BTreeMap<Complexity, Vec<f64>>,
    errors: Vec<ErrorRecord>,
    time_series: Vec<IntervalMetrics>,
}

impl CollectorState {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_collection: now,
            latencies: Vec::new(),
            by_query: BTreeMap::new(),
            query_names: BTreeMap::new(),
            by_type: BTreeMap::new(),
            by_complexity: BTreeMap::new(),
            errors: Vec::new(),
            time_series: Vec::new(),
        }
    }

    fn record(&mut self, result: TaskResult) {
        if !result.success {
            self.errors.push(ErrorRecord::from(&result));
            return;
        }
        let latency = result.latency_ms;
        self.latencies.push(latency);
        self.by_type.entry(result.query_type).or_default().push(latency);
        self.by_complexity
            .entry(result.complexity)
            .or_default()
            .push(latency);
        self.by_query
            .entry(result.query_id.clone())
            .or_default()
            .push(latency);
        self.query_names
            .entry(result.query_id)
            .or_insert(result.query_name);
    }

    fn aggregate(&self) -> AggregateStats {
        let elapsed = self.started.elapsed().as_secs_f64();
        let total = self.latencies.len();
        let errors = self.errors.len();
        let sorted = sorted_copy(&self.latencies);

        let error_rate = if total + errors == 0 {
            0.0
        } else {
            errors as f64 / (total + errors) as f64
        };

        AggregateStats {
            total_queries: total,
            elapsed_seconds: elapsed,
            queries_per_second: if elapsed > 0.0 {
                total as f64 / elapsed
            } else {
                0.0
            },
            avg_latency_ms: mean(&self.latencies),
            p50_latency_ms: percentile_sorted(&sorted, 50.0),
            p95_latency_ms: percentile_sorted(&sorted, 95.0),
            p99_latency_ms: percentile_sorted(&sorted, 99.0),
            p999_latency_ms: percentile_sorted(&sorted, 99.9),
            max_latency_ms: sorted.last().copied().unwrap_or(0.0),
            min_latency_ms: sorted.first().copied().unwrap_or(0.0),
            total_errors: errors,
            error_rate,
            error_rate_percent: error_rate * 100.0,
            by_type: self
                .by_type
                .iter()
                .map(|(k, v)| (*k, BucketStats::from_samples(v)))
                .collect(),
            by_complexity: self
                .by_complexity
                .iter()
                .map(|(k, v)| (*k, BucketStats::from_samples(v)))
                .collect(),
        }
    }

    fn query_statistics(&self, query_id: &str) -> Option<QueryStats> {
        let samples = self.by_query.get(query_id).filter(|s| !s.is_empty())?;
        let sorted = sorted_copy(samples);
        Some(QueryStats {
            query_id: query_id.to_string(),
            query_name: self.query_names.get(query_id).cloned().unwrap_or_default(),
            count: samples.len(),
            avg_latency_ms: mean(samples),
            p50_latency_ms: percentile_sorted(&sorted, 50.0),
            p95_latency_ms: percentile_sorted(&sorted, 95.0),
            p99_latency_ms: percentile_sorted(&sorted, 99.0),
            p999_latency_ms: percentile_sorted(&sorted, 99.9),
            max_latency_ms: sorted.last().copied().unwrap_or(0.0),
            min_latency_ms: sorted.first().copied().unwrap_or(0.0),
        })
    }
}

/// Thread-safe sink for [`TaskResult`]s.
pub struct MetricsCollector {
    output_dir: PathBuf,
    state: Mutex<CollectorState>,
}

impl MetricsCollector {
    /// Create a collector exporting into `output_dir` (created if missing).
    pub fn new(output_dir: impl Into<PathBuf>) -> CoreResult<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(Self {
            output_dir,
            state: Mutex::new(CollectorState::new()),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Record one result. Failures only count towards the error statistics.
    pub fn record(&self, result: TaskResult) {
        self.state.lock().record(result);
    }

    /// Take an interval snapshot and append it to the time series.
    pub fn collect_interval(&self) -> IntervalMetrics {
        let mut state = self.state.lock();
        let now = Instant::now();
        let interval = now.duration_since(state.last_collection).as_secs_f64();
        state.last_collection = now;

        let total = state.latencies.len();
        let sorted = sorted_copy(&state.latencies);

        let metrics = IntervalMetrics {
            timestamp: Utc::now(),
            elapsed_seconds: now.duration_since(state.started).as_secs_f64(),
            interval_seconds: interval,
            total_queries: total,
            qps: if interval > 0.0 {
                total as f64 / interval
            } else {
                0.0
            },
            latency_p50_ms: percentile_sorted(&sorted, 50.0),
            latency_p95_ms: percentile_sorted(&sorted, 95.0),
            latency_p99_ms: percentile_sorted(&sorted, 99.0),
            latency_p999_ms: percentile_sorted(&sorted, 99.9),
            latency_max_ms: sorted.last().copied().unwrap_or(0.0),
            latency_avg_ms: mean(&state.latencies),
            error_count: state.errors.len(),
        };

        state.time_series.push(metrics.clone());
        metrics
    }

    pub fn aggregate(&self) -> AggregateStats {
        self.state.lock().aggregate()
    }

    /// Statistics for one query, or `None` if it has no successful samples.
    pub fn query_statistics(&self, query_id: &str) -> Option<QueryStats> {
        self.state.lock().query_statistics(query_id)
    }

    pub fn time_series(&self) -> Vec<IntervalMetrics> {
        self.state.lock().time_series.clone()
    }

    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.state.lock().errors.clone()
    }

    /// Discard every sample, error and interval and restart the clock.
    pub fn reset(&self) {
        *self.state.lock() = CollectorState::new();
    }

    /// Build the full export document.
    pub fn export(&self) -> MetricsExport {
        let state = self.state.lock();
        MetricsExport {
            summary: state.aggregate(),
            time_series: state.time_series.clone(),
            per_query: state
                .by_query
                .keys()
                .filter_map(|id| state.query_statistics(id).map(|s| (id.clone(), s)))
                .collect(),
            errors: state.errors.clone(),
        }
    }

    /// Write `{summary, time_series, per_query, errors}` as pretty JSON.
    ///
    /// Uses `metrics_<timestamp>.json` when no filename is given.
    pub fn export_json(&self, filename: Option<&str>) -> CoreResult<PathBuf> {
        let path = self.export_path(filename, "json");
        let export = self.export();

        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, &export)?;
        writer.flush()?;

        tracing::info!(path = %path.display(), "Metrics exported to JSON");
        Ok(path)
    }

    /// Write the interval time series as CSV, one row per interval.
    ///
    /// With no intervals collected nothing is written, but the would-be path
    /// is still returned.
    pub fn export_csv(&self, filename: Option<&str>) -> CoreResult<PathBuf> {
        let path = self.export_path(filename, "csv");
        let series = self.time_series();

        if series.is_empty() {
            tracing::warn!("No time-series data to export");
            return Ok(path);
        }

        let mut writer = csv::Writer::from_path(&path).map_err(csv_error)?;
        for row in &series {
            writer.serialize(row).map_err(csv_error)?;
        }
        writer.flush()?;

        tracing::info!(path = %path.display(), rows = series.len(), "Metrics exported to CSV");
        Ok(path)
    }

    /// Print the human-readable summary block to stdout.
    pub fn print_summary(&self) {
        println!("{}", format_summary(&self.aggregate()));
    }

    fn export_path(&self, filename: Option<&str>, extension: &str) -> PathBuf {
        match filename {
            Some(name) => self.output_dir.join(name),
            None => self.output_dir.join(format!(
                "metrics_{}.{}",
                Local::now().format("%Y%m%d_%H%M%S"),
                extension
            )),
        }
    }
}

fn csv_error(e: csv::Error) -> CoreError {
    CoreError::Serialization(format!("CSV export failed: {e}"))
}

/// Render the console summary block for `stats`.
pub fn format_summary(stats: &AggregateStats) -> String {
    let rule = "=".repeat(80);
    let mut out = String::new();
    out.push('\n');
    out.push_str(&rule);
    out.push_str("\nBENCHMARK SUMMARY\n");
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&format!("Total Queries:        {}\n", stats.total_queries));
    out.push_str(&format!(
        "Elapsed Time:         {:.2} seconds\n",
        stats.elapsed_seconds
    ));
    out.push_str(&format!(
        "Queries per Second:   {:.2}\n",
        stats.queries_per_second
    ));
    out.push_str("\nLatency Metrics:\n");
    for (label, value) in [
        ("Average", stats.avg_latency_ms),
        ("p50", stats.p50_latency_ms),
        ("p95", stats.p95_latency_ms),
        ("p99", stats.p99_latency_ms),
        ("p999", stats.p999_latency_ms),
        ("Max", stats.max_latency_ms),
    ] {
        out.push_str(&format!("  {:<20}{:.2} ms\n", format!("{label}:"), value));
    }
    out.push_str("\nError Statistics:\n");
    out.push_str(&format!("  Total Errors:       {}\n", stats.total_errors));
    out.push_str(&format!(
        "  Error Rate:         {:.2}%\n",
        stats.error_rate_percent
    ));
    out.push_str(&rule);
    out
}
