use thiserror::Error;

/// Canonical error type for benchmark operations.
///
/// The variants mirror the failure classes of a run: connection and snapshot
/// failures abort the run, configuration failures abort before connecting,
/// and execution failures are recorded per query without stopping anything.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The target store could not be reached or the session was lost.
    #[error("connection error: {message}")]
    Connection {
        /// Human-readable reason reported by the driver.
        message: String,
    },

    /// Creating or dropping an isolated snapshot keyspace failed.
    #[error("snapshot error on keyspace `{keyspace}`: {message}")]
    Snapshot {
        /// Snapshot keyspace that was being built or dropped.
        keyspace: String,
        /// Human-readable failure reason.
        message: String,
    },

    /// A single query invocation failed.
    #[error("query `{query_id}` failed: {message}")]
    Execution {
        /// Catalog identifier of the failing query.
        query_id: String,
        /// Error text reported by the handler or the store.
        message: String,
    },

    /// Configuration is missing keys or holds invalid values.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Entity was not found in the target store or the catalog.
    #[error("{entity} `{id}` was not found")]
    NotFound {
        /// Entity type name (e.g. `"table"`).
        entity: &'static str,
        /// Identifier of the missing entity.
        id: String,
    },

    /// Operation violates the current run state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Human-readable explanation of the invalid state.
        message: String,
    },

    /// I/O error occurred while writing exports or reading schema files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Creates a `Connection` variant.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a `Snapshot` variant.
    #[must_use]
    pub fn snapshot(keyspace: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Snapshot {
            keyspace: keyspace.into(),
            message: message.into(),
        }
    }

    /// Creates an `Execution` variant.
    #[must_use]
    pub fn execution(query_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            query_id: query_id.into(),
            message: message.into(),
        }
    }

    /// Creates a `Configuration` variant.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a `NotFound` variant.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates an `InvalidState` variant.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Returns `true` for failures that must abort a run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Execution { .. } | Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Convenient result alias for benchmark operations.
pub type CoreResult<T> = Result<T, CoreError>;
