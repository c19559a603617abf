//! Query catalog entries and the per-execution result envelope.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::traits::QueryHandler;

/// A row (or a parameter set) keyed by column name.
pub type Row = BTreeMap<String, serde_json::Value>;

/// Parameters handed to a query handler.
pub type QueryParams = Row;

/// Generates fresh parameters for every invocation of a query.
pub type ParamGenerator = Arc<dyn Fn() -> QueryParams + Send + Sync>;

/// Query operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
}

impl QueryType {
    /// All query types in catalog order.
    pub const ALL: [QueryType; 4] = [Self::Select, Self::Insert, Self::Update, Self::Delete];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "select" => Ok(Self::Select),
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(CoreError::configuration(format!(
                "unknown query type `{other}`"
            ))),
        }
    }
}

/// Coarse structural cost tier of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    /// All complexity tiers in catalog order.
    pub const ALL: [Complexity; 3] = [Self::Simple, Self::Medium, Self::Complex];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "medium" => Ok(Self::Medium),
            "complex" => Ok(Self::Complex),
            other => Err(CoreError::configuration(format!(
                "unknown complexity `{other}`"
            ))),
        }
    }
}

/// A registered benchmark query.
///
/// Immutable once registered. The harness only reads the type, the complexity
/// and invokes the handler with freshly generated parameters.
#[derive(Clone)]
pub struct QueryDefinition {
    pub query_id: String,
    pub name: String,
    pub query_type: QueryType,
    pub complexity: Complexity,
    pub description: String,
    pub params: ParamGenerator,
    pub handler: Arc<dyn QueryHandler>,
}

impl QueryDefinition {
    /// Create a definition whose handler takes no parameters.
    pub fn new(
        query_id: impl Into<String>,
        name: impl Into<String>,
        query_type: QueryType,
        complexity: Complexity,
        handler: Arc<dyn QueryHandler>,
    ) -> Self {
        Self {
            query_id: query_id.into(),
            name: name.into(),
            query_type,
            complexity,
            description: String::new(),
            params: Arc::new(QueryParams::new),
            handler,
        }
    }

    /// Attach a human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach a parameter generator.
    #[must_use]
    pub fn with_params<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> QueryParams + Send + Sync + 'static,
    {
        self.params = Arc::new(generator);
        self
    }

    /// Generate a fresh parameter set.
    #[must_use]
    pub fn generate_params(&self) -> QueryParams {
        (self.params)()
    }
}

impl fmt::Debug for QueryDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDefinition")
            .field("query_id", &self.query_id)
            .field("name", &self.name)
            .field("query_type", &self.query_type)
            .field("complexity", &self.complexity)
            .finish_non_exhaustive()
    }
}

/// Outcome of one executed unit of work.
///
/// Produced once per query invocation by the executor and consumed exactly
/// once by the metrics collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub query_id: String,
    pub query_name: String,
    pub query_type: QueryType,
    pub complexity: Complexity,
    pub success: bool,
    /// Wall-clock latency in milliseconds (always >= 0).
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl TaskResult {
    /// Build a successful result for `definition`.
    #[must_use]
    pub fn success(
        definition: &QueryDefinition,
        latency_ms: f64,
        result: Option<serde_json::Value>,
    ) -> Self {
        Self {
            query_id: definition.query_id.clone(),
            query_name: definition.name.clone(),
            query_type: definition.query_type,
            complexity: definition.complexity,
            success: true,
            latency_ms: latency_ms.max(0.0),
            timestamp: Utc::now(),
            error: None,
            result,
        }
    }

    /// Build a failed result for `definition`.
    #[must_use]
    pub fn failure(definition: &QueryDefinition, latency_ms: f64, error: impl Into<String>) -> Self {
        Self {
            query_id: definition.query_id.clone(),
            query_name: definition.name.clone(),
            query_type: definition.query_type,
            complexity: definition.complexity,
            success: false,
            latency_ms: latency_ms.max(0.0),
            timestamp: Utc::now(),
            error: Some(error.into()),
            result: None,
        }
    }
}

/// Structured record of a failed query execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub query_id: String,
    pub query_name: String,
    pub timestamp: DateTime<Utc>,
    pub error: String,
}

impl From<&TaskResult> for ErrorRecord {
    fn from(result: &TaskResult) -> Self {
        Self {
            query_id: result.query_id.clone(),
            query_name: result.query_name.clone(),
            timestamp: result.timestamp,
            error: result
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    }
}
