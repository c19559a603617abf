//! Keyspace-oriented store backends for loadbench.
//!
//! [`MemoryStore`] keeps every keyspace in process and understands the
//! `CREATE TABLE` subset of CQL needed to replay a schema file.

pub mod cql;
pub mod memory;

pub use cql::{parse_statement, SchemaStatement};
pub use memory::{MemoryConnector, MemoryStore};
