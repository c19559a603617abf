//! In-memory keyspace store for testing and local runs

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use loadbench_core::{
    Connector, CoreError, CoreResult, Row, StoreConfig, StoreSession, TableSchema,
};

use crate::cql::{parse_statement, SchemaStatement};

#[derive(Debug, Default)]
struct ClusterState {
    keyspaces: HashMap<String, Keyspace>,
}

#[derive(Debug)]
struct Keyspace {
    replication_factor: u32,
    tables: BTreeMap<String, Table>,
}

#[derive(Debug)]
struct Table {
    schema: TableSchema,
    rows: BTreeMap<String, Row>,
}

impl Table {
    fn row_key(&self, row: &Row) -> CoreResult<String> {
        let mut parts = Vec::with_capacity(self.schema.primary_key.len());
        for column in &self.schema.primary_key {
            let value = row.get(column).ok_or_else(|| {
                CoreError::Serialization(format!(
                    "missing primary key column `{}` for table `{}`",
                    column, self.schema.name
                ))
            })?;
            parts.push(value);
        }
        Ok(serde_json::to_string(&parts)?)
    }

    fn reject_counters(&self) -> CoreResult<()> {
        if self.schema.is_counter_table() {
            return Err(CoreError::Serialization(format!(
                "table `{}` has counter columns; counters can only be incremented",
                self.schema.name
            )));
        }
        Ok(())
    }
}

/// In-memory keyspace store (for testing and local runs).
///
/// Cloning a store, or opening a [`MemoryStore::session`], shares the same
/// keyspaces. Each handle tracks its own current keyspace.
#[derive(Clone)]
pub struct MemoryStore {
    cluster: Arc<RwLock<ClusterState>>,
    keyspace: Arc<RwLock<Option<String>>>,
    latency: Option<Duration>,
    closed: Arc<AtomicBool>,
    operations: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            cluster: Arc::new(RwLock::new(ClusterState::default())),
            keyspace: Arc::new(RwLock::new(None)),
            latency: None,
            closed: Arc::new(AtomicBool::new(false)),
            operations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sleep for `latency` on every data-plane operation.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Open another session over the same keyspaces.
    #[must_use]
    pub fn session(&self) -> Self {
        Self {
            cluster: Arc::clone(&self.cluster),
            keyspace: Arc::new(RwLock::new(self.keyspace.read().clone())),
            latency: self.latency,
            closed: Arc::new(AtomicBool::new(false)),
            operations: Arc::clone(&self.operations),
        }
    }

    /// Number of data-plane operations served across all sessions.
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::Relaxed)
    }

    /// Number of rows in `keyspace.table`.
    pub fn row_count(&self, keyspace: &str, table: &str) -> CoreResult<usize> {
        let cluster = self.cluster.read();
        let ks = cluster
            .keyspaces
            .get(keyspace)
            .ok_or_else(|| CoreError::not_found("keyspace", keyspace))?;
        let table = ks
            .tables
            .get(table)
            .ok_or_else(|| CoreError::not_found("table", format!("{keyspace}.{table}")))?;
        Ok(table.rows.len())
    }

    /// Replication factor recorded when `keyspace` was created.
    pub fn replication_factor(&self, keyspace: &str) -> Option<u32> {
        self.cluster
            .read()
            .keyspaces
            .get(keyspace)
            .map(|ks| ks.replication_factor)
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::connection("session is closed"));
        }
        Ok(())
    }

    fn current_keyspace(&self) -> CoreResult<String> {
        self.keyspace
            .read()
            .clone()
            .ok_or_else(|| CoreError::invalid_state("no keyspace selected"))
    }

    async fn simulate_latency(&self) {
        self.operations.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn with_table<T>(
        &self,
        keyspace: &str,
        table: &str,
        f: impl FnOnce(&mut Table) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut cluster = self.cluster.write();
        let ks = cluster
            .keyspaces
            .get_mut(keyspace)
            .ok_or_else(|| CoreError::not_found("keyspace", keyspace))?;
        let table_state = ks
            .tables
            .get_mut(table)
            .ok_or_else(|| CoreError::not_found("table", format!("{keyspace}.{table}")))?;
        f(table_state)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_filter(row: &Row, filter: &Row) -> bool {
    filter.iter().all(|(column, expected)| row.get(column) == Some(expected))
}

#[async_trait]
impl StoreSession for MemoryStore {
    async fn ping(&self) -> CoreResult<()> {
        self.ensure_open()
    }

    fn keyspace(&self) -> Option<String> {
        self.keyspace.read().clone()
    }

    async fn set_keyspace(&self, keyspace: &str) -> CoreResult<()> {
        self.ensure_open()?;
        if !self.cluster.read().keyspaces.contains_key(keyspace) {
            return Err(CoreError::not_found("keyspace", keyspace));
        }
        *self.keyspace.write() = Some(keyspace.to_string());
        Ok(())
    }

    async fn list_keyspaces(&self) -> CoreResult<Vec<String>> {
        self.ensure_open()?;
        let mut names: Vec<String> = self.cluster.read().keyspaces.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_keyspace(&self, keyspace: &str, replication_factor: u32) -> CoreResult<()> {
        self.ensure_open()?;
        self.cluster
            .write()
            .keyspaces
            .entry(keyspace.to_string())
            .or_insert_with(|| Keyspace {
                replication_factor,
                tables: BTreeMap::new(),
            });
        tracing::debug!(keyspace, replication_factor, "Keyspace created/verified");
        Ok(())
    }

    async fn drop_keyspace(&self, keyspace: &str) -> CoreResult<()> {
        self.ensure_open()?;
        self.cluster.write().keyspaces.remove(keyspace);
        let mut current = self.keyspace.write();
        if current.as_deref() == Some(keyspace) {
            *current = None;
        }
        Ok(())
    }

    async fn execute_schema(&self, keyspace: &str, statement: &str) -> CoreResult<()> {
        self.ensure_open()?;
        let SchemaStatement::CreateTable(schema) = parse_statement(statement)? else {
            return Ok(());
        };

        let mut cluster = self.cluster.write();
        let ks = cluster
            .keyspaces
            .get_mut(keyspace)
            .ok_or_else(|| CoreError::not_found("keyspace", keyspace))?;
        ks.tables.entry(schema.name.clone()).or_insert_with(|| Table {
            schema,
            rows: BTreeMap::new(),
        });
        Ok(())
    }

    async fn list_tables(&self, keyspace: &str) -> CoreResult<Vec<TableSchema>> {
        self.ensure_open()?;
        let cluster = self.cluster.read();
        let ks = cluster
            .keyspaces
            .get(keyspace)
            .ok_or_else(|| CoreError::not_found("keyspace", keyspace))?;
        Ok(ks.tables.values().map(|t| t.schema.clone()).collect())
    }

    async fn read_rows(&self, keyspace: &str, table: &str) -> CoreResult<Vec<Row>> {
        self.ensure_open()?;
        self.with_table(keyspace, table, |t| Ok(t.rows.values().cloned().collect()))
    }

    async fn write_rows(&self, keyspace: &str, table: &str, rows: Vec<Row>) -> CoreResult<usize> {
        self.ensure_open()?;
        self.with_table(keyspace, table, |t| {
            t.reject_counters()?;
            let count = rows.len();
            for row in rows {
                let key = t.row_key(&row)?;
                t.rows.insert(key, row);
            }
            Ok(count)
        })
    }

    async fn get(&self, table: &str, key: &Row) -> CoreResult<Option<Row>> {
        self.ensure_open()?;
        self.simulate_latency().await;
        let keyspace = self.current_keyspace()?;
        self.with_table(&keyspace, table, |t| {
            let key = t.row_key(key)?;
            Ok(t.rows.get(&key).cloned())
        })
    }

    async fn scan(&self, table: &str, filter: &Row, limit: Option<usize>) -> CoreResult<Vec<Row>> {
        self.ensure_open()?;
        self.simulate_latency().await;
        let keyspace = self.current_keyspace()?;
        self.with_table(&keyspace, table, |t| {
            Ok(t.rows
                .values()
                .filter(|row| matches_filter(row, filter))
                .take(limit.unwrap_or(usize::MAX))
                .cloned()
                .collect())
        })
    }

    async fn insert(&self, table: &str, row: Row) -> CoreResult<()> {
        self.ensure_open()?;
        self.simulate_latency().await;
        let keyspace = self.current_keyspace()?;
        self.with_table(&keyspace, table, |t| {
            t.reject_counters()?;
            let key = t.row_key(&row)?;
            t.rows.insert(key, row);
            Ok(())
        })
    }

    async fn update(&self, table: &str, key: &Row, values: Row) -> CoreResult<bool> {
        self.ensure_open()?;
        self.simulate_latency().await;
        let keyspace = self.current_keyspace()?;
        self.with_table(&keyspace, table, |t| {
            t.reject_counters()?;
            let key = t.row_key(key)?;
            match t.rows.get_mut(&key) {
                Some(row) => {
                    row.extend(values);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    async fn increment(&self, table: &str, key: &Row, column: &str, delta: i64) -> CoreResult<()> {
        self.ensure_open()?;
        self.simulate_latency().await;
        let keyspace = self.current_keyspace()?;
        self.with_table(&keyspace, table, |t| {
            if !t.schema.column(column).is_some_and(|c| c.is_counter()) {
                return Err(CoreError::Serialization(format!(
                    "column `{}.{}` is not a counter",
                    t.schema.name, column
                )));
            }
            let row_key = t.row_key(key)?;
            let row = t.rows.entry(row_key).or_insert_with(|| key.clone());
            let current = row.get(column).and_then(Value::as_i64).unwrap_or(0);
            row.insert(column.to_string(), Value::from(current + delta));
            Ok(())
        })
    }

    async fn delete(&self, table: &str, key: &Row) -> CoreResult<bool> {
        self.ensure_open()?;
        self.simulate_latency().await;
        let keyspace = self.current_keyspace()?;
        self.with_table(&keyspace, table, |t| {
            let key = t.row_key(key)?;
            Ok(t.rows.remove(&key).is_some())
        })
    }

    async fn close(&self) -> CoreResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Connector that hands out sessions over a shared [`MemoryStore`].
#[derive(Clone, Default)]
pub struct MemoryConnector {
    store: MemoryStore,
}

impl MemoryConnector {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, config: &StoreConfig) -> CoreResult<Arc<dyn StoreSession>> {
        let mut session = self.store.session();
        if let Some(latency) = config.simulated_latency() {
            session = session.with_latency(latency);
        }

        session.set_keyspace(&config.keyspace).await.map_err(|e| {
            CoreError::connection(format!(
                "cannot use keyspace `{}` at {:?}: {}",
                config.keyspace, config.contact_points, e
            ))
        })?;

        tracing::info!(
            contact_points = ?config.contact_points,
            keyspace = %config.keyspace,
            "Connected to in-memory store"
        );
        Ok(Arc::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    async fn store_with_tables() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_keyspace("bench", 1).await.unwrap();
        store
            .execute_schema(
                "bench",
                "CREATE TABLE customer (c_id int PRIMARY KEY, c_name text, c_tier int)",
            )
            .await
            .unwrap();
        store
            .execute_schema(
                "bench",
                "CREATE TABLE activity (c_id int PRIMARY KEY, trades counter)",
            )
            .await
            .unwrap();
        store.set_keyspace("bench").await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_crud_roundtrip() {
        let store = store_with_tables().await;
        let key = row(&[("c_id", json!(1))]);

        store
            .insert(
                "customer",
                row(&[("c_id", json!(1)), ("c_name", json!("Ada")), ("c_tier", json!(2))]),
            )
            .await
            .unwrap();
        let fetched = store.get("customer", &key).await.unwrap().unwrap();
        assert_eq!(fetched["c_name"], json!("Ada"));

        assert!(store
            .update("customer", &key, row(&[("c_tier", json!(3))]))
            .await
            .unwrap());
        let filtered = store
            .scan("customer", &row(&[("c_tier", json!(3))]), None)
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);

        assert!(store.delete("customer", &key).await.unwrap());
        assert!(!store.delete("customer", &key).await.unwrap());
        assert!(store.get("customer", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_counter_tables_reject_inserts() {
        let store = store_with_tables().await;
        let key = row(&[("c_id", json!(7))]);

        assert!(store
            .insert("activity", row(&[("c_id", json!(7)), ("trades", json!(5))]))
            .await
            .is_err());
        assert!(store
            .write_rows("bench", "activity", vec![row(&[("c_id", json!(7))])])
            .await
            .is_err());

        store.increment("activity", &key, "trades", 2).await.unwrap();
        store.increment("activity", &key, "trades", 3).await.unwrap();
        let counted = store.get("activity", &key).await.unwrap().unwrap();
        assert_eq!(counted["trades"], json!(5));
    }

    #[tokio::test]
    async fn test_sessions_share_data_but_not_keyspace() {
        let store = store_with_tables().await;
        store.create_keyspace("other", 1).await.unwrap();

        let second = store.session();
        second.set_keyspace("other").await.unwrap();

        assert_eq!(store.keyspace().as_deref(), Some("bench"));
        assert_eq!(second.keyspace().as_deref(), Some("other"));
        assert_eq!(second.list_keyspaces().await.unwrap(), vec!["bench", "other"]);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_operations() {
        let store = store_with_tables().await;
        store.close().await.unwrap();
        assert!(matches!(
            store.ping().await,
            Err(CoreError::Connection { .. })
        ));
    }

    #[tokio::test]
    async fn test_connector_requires_existing_keyspace() {
        let store = store_with_tables().await;
        let connector = MemoryConnector::new(store);

        let ok = StoreConfig {
            keyspace: "bench".to_string(),
            ..Default::default()
        };
        let session = connector.connect(&ok).await.unwrap();
        assert_eq!(session.keyspace().as_deref(), Some("bench"));

        let missing = StoreConfig {
            keyspace: "nope".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            connector.connect(&missing).await,
            Err(CoreError::Connection { .. })
        ));
    }
}
