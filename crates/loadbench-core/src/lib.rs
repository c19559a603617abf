//! Core domain types and traits for the loadbench harness.

pub mod catalog;
pub mod config;
pub mod error;
pub mod load_pattern;
pub mod query;
pub mod schema;
pub mod traits;

pub use catalog::QueryCatalog;
pub use config::{
    BenchmarkConfig, DataGenerationConfig, ExportFormat, LoadbenchConfig, LoggingConfig,
    MetricsConfig, StoreConfig,
};
pub use error::{CoreError, CoreResult};
pub use load_pattern::LoadPattern;
pub use query::{
    Complexity, ErrorRecord, ParamGenerator, QueryDefinition, QueryParams, QueryType, Row,
    TaskResult,
};
pub use schema::{ColumnSchema, TableSchema};
pub use traits::{handler_fn, Connector, FnHandler, QueryHandler, StoreSession};
