use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::error::CoreResult;
use crate::query::{QueryParams, Row};
use crate::schema::TableSchema;

/// A long-lived session against the target store.
///
/// One session is shared by every worker of a run; implementations are
/// responsible for their own connection-level thread safety. Data-plane
/// methods operate on the session's current keyspace.
#[async_trait]
pub trait StoreSession: Send + Sync {
    /// Round-trips to the store to verify connectivity.
    async fn ping(&self) -> CoreResult<()>;

    /// Keyspace that data-plane operations currently target.
    fn keyspace(&self) -> Option<String>;

    /// Repoints the session at another keyspace.
    async fn set_keyspace(&self, keyspace: &str) -> CoreResult<()>;

    /// Lists every keyspace visible to the session.
    async fn list_keyspaces(&self) -> CoreResult<Vec<String>>;

    /// Creates a keyspace if it does not exist yet.
    async fn create_keyspace(&self, keyspace: &str, replication_factor: u32) -> CoreResult<()>;

    /// Drops a keyspace and everything in it. Missing keyspaces are ignored.
    async fn drop_keyspace(&self, keyspace: &str) -> CoreResult<()>;

    /// Executes one schema statement (`CREATE TABLE`, `CREATE INDEX`, ...) in `keyspace`.
    async fn execute_schema(&self, keyspace: &str, statement: &str) -> CoreResult<()>;

    /// Returns table metadata for `keyspace`.
    async fn list_tables(&self, keyspace: &str) -> CoreResult<Vec<TableSchema>>;

    /// Reads every row of a table. Used for bulk copies.
    async fn read_rows(&self, keyspace: &str, table: &str) -> CoreResult<Vec<Row>>;

    /// Writes rows into a table, returning how many were written. Used for bulk copies.
    async fn write_rows(&self, keyspace: &str, table: &str, rows: Vec<Row>) -> CoreResult<usize>;

    /// Point lookup by full primary key.
    async fn get(&self, table: &str, key: &Row) -> CoreResult<Option<Row>>;

    /// Rows whose columns equal every entry in `filter`, up to `limit`.
    async fn scan(&self, table: &str, filter: &Row, limit: Option<usize>) -> CoreResult<Vec<Row>>;

    /// Upserts a full row.
    async fn insert(&self, table: &str, row: Row) -> CoreResult<()>;

    /// Sets columns on an existing row. Returns `false` if the row is missing.
    async fn update(&self, table: &str, key: &Row, values: Row) -> CoreResult<bool>;

    /// Adds `delta` to a counter column, creating the row at zero if needed.
    async fn increment(&self, table: &str, key: &Row, column: &str, delta: i64) -> CoreResult<()>;

    /// Deletes a row by primary key. Returns `false` if the row was missing.
    async fn delete(&self, table: &str, key: &Row) -> CoreResult<bool>;

    /// Releases the session.
    async fn close(&self) -> CoreResult<()>;
}

/// Opens sessions against a target store.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects and selects the configured keyspace.
    async fn connect(&self, config: &StoreConfig) -> CoreResult<Arc<dyn StoreSession>>;
}

/// Executes one catalog query against a session.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Runs the query and returns an optional opaque payload.
    async fn execute(
        &self,
        session: &dyn StoreSession,
        params: QueryParams,
    ) -> CoreResult<Option<serde_json::Value>>;
}

/// Adapts a session-independent async closure into a [`QueryHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> QueryHandler for FnHandler<F>
where
    F: Fn(QueryParams) -> Fut + Send + Sync,
    Fut: Future<Output = CoreResult<Option<serde_json::Value>>> + Send,
{
    async fn execute(
        &self,
        _session: &dyn StoreSession,
        params: QueryParams,
    ) -> CoreResult<Option<serde_json::Value>> {
        (self.0)(params).await
    }
}

/// Wraps a closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn QueryHandler>
where
    F: Fn(QueryParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CoreResult<Option<serde_json::Value>>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
