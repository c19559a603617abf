//! Table metadata exposed by target stores.

use serde::{Deserialize, Serialize};

/// CQL type name of counter columns.
pub const COUNTER_TYPE: &str = "counter";

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    /// Lowercase type name as reported by the store (e.g. `"text"`, `"counter"`).
    pub data_type: String,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into().to_ascii_lowercase(),
        }
    }

    #[must_use]
    pub fn is_counter(&self) -> bool {
        self.data_type == COUNTER_TYPE
    }
}

/// Table definition within a keyspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    /// Partition key columns followed by clustering columns.
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Counter tables cannot be populated by plain inserts.
    #[must_use]
    pub fn is_counter_table(&self) -> bool {
        self.columns.iter().any(ColumnSchema::is_counter)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}
