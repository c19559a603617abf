//! Configuration management for loadbench
//!
//! This module provides a layered configuration system that supports:
//! - YAML configuration files
//! - Environment variable overrides
//! - Reasonable defaults
//! - Validation before any connection is attempted

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::load_pattern::LoadPattern;
use crate::query::{Complexity, QueryType};

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LoadbenchConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub benchmark: BenchmarkConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub data_generation: DataGenerationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LoadbenchConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. `path`, or the file named by LOADBENCH_CONFIG
    /// 3. ./config/loadbench.yaml
    /// 4. Hardcoded defaults (lowest priority)
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        } else if let Ok(config_path) = std::env::var("LOADBENCH_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        } else {
            builder = builder.add_source(File::with_name("./config/loadbench").required(false));
        }

        // Example: LOADBENCH_BENCHMARK__CONCURRENCY=8
        builder = builder.add_source(
            Environment::with_prefix("LOADBENCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: LoadbenchConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path, without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let config: LoadbenchConfig = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> CoreResult<()> {
        self.store.validate()?;
        self.benchmark.validate()?;
        self.metrics.validate()?;
        Ok(())
    }
}

/// Target store connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Hosts to contact (default: ["127.0.0.1"])
    #[serde(default = "default_contact_points")]
    pub contact_points: Vec<String>,

    /// Native protocol port (default: 9042)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base keyspace holding the benchmark dataset
    #[serde(default = "default_keyspace")]
    pub keyspace: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Native protocol version (default: 4)
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u8,

    /// Replication factor for keyspaces created by the harness (default: 1)
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u32,

    /// Artificial per-operation latency for the in-memory store, in microseconds
    #[serde(default)]
    pub simulated_latency_us: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            contact_points: default_contact_points(),
            port: default_port(),
            keyspace: default_keyspace(),
            username: None,
            password: None,
            protocol_version: default_protocol_version(),
            replication_factor: default_replication_factor(),
            simulated_latency_us: 0,
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> CoreResult<()> {
        if self.keyspace.trim().is_empty() {
            return Err(CoreError::configuration("store.keyspace must not be empty"));
        }
        if !self
            .keyspace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(CoreError::configuration(format!(
                "store.keyspace `{}` must be alphanumeric or underscore",
                self.keyspace
            )));
        }
        if self.replication_factor == 0 {
            return Err(CoreError::configuration(
                "store.replication_factor must be > 0",
            ));
        }
        Ok(())
    }

    /// Simulated latency as a Duration, if any.
    pub fn simulated_latency(&self) -> Option<Duration> {
        (self.simulated_latency_us > 0).then(|| Duration::from_micros(self.simulated_latency_us))
    }
}

/// Benchmark run parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BenchmarkConfig {
    /// Worker pool ceiling (default: 50)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Measured phase length in seconds (default: 300)
    #[serde(default = "default_duration", alias = "duration")]
    pub duration_seconds: f64,

    /// Warmup length in seconds, 0 disables (default: 30)
    #[serde(default = "default_warmup", alias = "warmup_duration")]
    pub warmup_seconds: f64,

    /// Cooldown length in seconds, 0 disables (default: 10)
    #[serde(default = "default_cooldown", alias = "cooldown_duration")]
    pub cooldown_seconds: f64,

    #[serde(default)]
    pub load_pattern: LoadPattern,

    /// Percent weight per query type
    #[serde(default = "default_query_distribution")]
    pub query_distribution: BTreeMap<QueryType, f64>,

    /// Percent weight per complexity tier
    #[serde(default = "default_complexity_distribution")]
    pub complexity_distribution: BTreeMap<Complexity, f64>,

    /// Number of distinct queries cycled during warmup (default: 10)
    #[serde(default = "default_warmup_sample_size")]
    pub warmup_sample_size: usize,

    /// Run against an isolated copy of the base keyspace (default: false)
    #[serde(default)]
    pub snapshot_before_benchmark: bool,

    /// Drop the snapshot keyspace after the run (default: true)
    #[serde(default = "default_true")]
    pub cleanup_benchmark_keyspace: bool,

    /// Schema used to recreate tables in the snapshot keyspace
    #[serde(default = "default_schema_file")]
    pub schema_file: PathBuf,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            duration_seconds: default_duration(),
            warmup_seconds: default_warmup(),
            cooldown_seconds: default_cooldown(),
            load_pattern: LoadPattern::default(),
            query_distribution: default_query_distribution(),
            complexity_distribution: default_complexity_distribution(),
            warmup_sample_size: default_warmup_sample_size(),
            snapshot_before_benchmark: false,
            cleanup_benchmark_keyspace: true,
            schema_file: default_schema_file(),
        }
    }
}

impl BenchmarkConfig {
    fn validate(&self) -> CoreResult<()> {
        if self.concurrency == 0 {
            return Err(CoreError::configuration("benchmark.concurrency must be > 0"));
        }

        check_seconds("benchmark.duration_seconds", self.duration_seconds)?;
        check_seconds("benchmark.warmup_seconds", self.warmup_seconds)?;
        check_seconds("benchmark.cooldown_seconds", self.cooldown_seconds)?;
        if self.duration_seconds <= 0.0 {
            return Err(CoreError::configuration(
                "benchmark.duration_seconds must be > 0",
            ));
        }

        check_distribution("benchmark.query_distribution", &self.query_distribution)?;
        check_distribution(
            "benchmark.complexity_distribution",
            &self.complexity_distribution,
        )?;

        if self.warmup_sample_size == 0 {
            return Err(CoreError::configuration(
                "benchmark.warmup_sample_size must be > 0",
            ));
        }

        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_secs_f64(self.warmup_seconds)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_seconds)
    }
}

/// Export formats for final metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Metrics collection and export settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Directory for exported files (default: "./results")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Seconds between interval snapshots during measurement (default: 10)
    #[serde(default = "default_collection_interval")]
    pub collection_interval: f64,

    /// Formats written at the end of a run (default: json, csv)
    #[serde(default = "default_export_format")]
    pub export_format: Vec<ExportFormat>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            collection_interval: default_collection_interval(),
            export_format: default_export_format(),
        }
    }
}

impl MetricsConfig {
    fn validate(&self) -> CoreResult<()> {
        check_seconds("metrics.collection_interval", self.collection_interval)?;
        if self.collection_interval <= 0.0 {
            return Err(CoreError::configuration(
                "metrics.collection_interval must be > 0",
            ));
        }
        Ok(())
    }

    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs_f64(self.collection_interval)
    }

    pub fn exports(&self, format: ExportFormat) -> bool {
        self.export_format.contains(&format)
    }
}

/// Synthetic dataset scale used when seeding a store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataGenerationConfig {
    #[serde(default = "default_num_customers")]
    pub num_customers: usize,

    #[serde(default = "default_num_securities")]
    pub num_securities: usize,

    #[serde(default = "default_num_trades")]
    pub num_trades: usize,
}

impl Default for DataGenerationConfig {
    fn default() -> Self {
        Self {
            num_customers: default_num_customers(),
            num_securities: default_num_securities(),
            num_trades: default_num_trades(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn check_seconds(key: &str, value: f64) -> CoreResult<()> {
    if Duration::try_from_secs_f64(value).is_err() {
        return Err(CoreError::configuration(format!(
            "{key} must be a non-negative number of seconds that fits a duration, got {value}"
        )));
    }
    Ok(())
}

fn check_distribution<K: std::fmt::Display>(key: &str, dist: &BTreeMap<K, f64>) -> CoreResult<()> {
    if dist.is_empty() {
        return Err(CoreError::configuration(format!("{key} must not be empty")));
    }
    for (name, pct) in dist {
        if !pct.is_finite() || *pct < 0.0 {
            return Err(CoreError::configuration(format!(
                "{key}.{name} must be a non-negative percentage"
            )));
        }
    }
    if dist.values().sum::<f64>() <= 0.0 {
        return Err(CoreError::configuration(format!(
            "{key} weights must sum to more than zero"
        )));
    }
    Ok(())
}

// Default value functions
fn default_contact_points() -> Vec<String> {
    vec!["127.0.0.1".to_string()]
}

fn default_port() -> u16 {
    9042
}

fn default_keyspace() -> String {
    "loadbench".to_string()
}

fn default_protocol_version() -> u8 {
    4
}

fn default_replication_factor() -> u32 {
    1
}

fn default_concurrency() -> usize {
    50
}

fn default_duration() -> f64 {
    300.0
}

fn default_warmup() -> f64 {
    30.0
}

fn default_cooldown() -> f64 {
    10.0
}

fn default_query_distribution() -> BTreeMap<QueryType, f64> {
    BTreeMap::from([
        (QueryType::Select, 40.0),
        (QueryType::Insert, 25.0),
        (QueryType::Update, 25.0),
        (QueryType::Delete, 10.0),
    ])
}

fn default_complexity_distribution() -> BTreeMap<Complexity, f64> {
    BTreeMap::from([
        (Complexity::Simple, 50.0),
        (Complexity::Medium, 35.0),
        (Complexity::Complex, 15.0),
    ])
}

fn default_warmup_sample_size() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_schema_file() -> PathBuf {
    PathBuf::from("schema/brokerage.cql")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./results")
}

fn default_collection_interval() -> f64 {
    10.0
}

fn default_export_format() -> Vec<ExportFormat> {
    vec![ExportFormat::Json, ExportFormat::Csv]
}

fn default_num_customers() -> usize {
    100
}

fn default_num_securities() -> usize {
    200
}

fn default_num_trades() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}
