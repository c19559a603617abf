//! Shared fixtures for harness integration tests

#![allow(dead_code)]

use std::sync::Arc;

use loadbench_core::{
    handler_fn, Complexity, CoreError, QueryCatalog, QueryDefinition, QueryParams, QueryType,
    Row, StoreSession,
};
use loadbench_store::MemoryStore;
use serde_json::{json, Value};

pub const BASE_KEYSPACE: &str = "brokerage";

pub const SCHEMA: &str = "\
-- test schema
CREATE KEYSPACE IF NOT EXISTS brokerage WITH replication = {'class': 'SimpleStrategy', 'replication_factor': 1};
USE brokerage;

CREATE TABLE IF NOT EXISTS customer (
    c_id int PRIMARY KEY,
    c_name text,
    c_tier int
);

CREATE TABLE IF NOT EXISTS trade (
    ca_id int,
    t_id bigint,
    t_qty int,
    PRIMARY KEY ((ca_id), t_id)
) WITH CLUSTERING ORDER BY (t_id DESC);

-- counters cannot be copied
CREATE TABLE IF NOT EXISTS account_activity (
    ca_id int PRIMARY KEY,
    trade_count counter
);
";

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Store with the base keyspace created, schema applied and a few rows per table.
pub async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.create_keyspace(BASE_KEYSPACE, 1).await.unwrap();
    for statement in loadbench_harness::split_schema_statements(SCHEMA) {
        store.execute_schema(BASE_KEYSPACE, &statement).await.unwrap();
    }
    store.set_keyspace(BASE_KEYSPACE).await.unwrap();

    for c_id in 0..10 {
        store
            .insert(
                "customer",
                row(&[
                    ("c_id", json!(c_id)),
                    ("c_name", json!(format!("customer {c_id}"))),
                    ("c_tier", json!(c_id % 3)),
                ]),
            )
            .await
            .unwrap();
        store
            .insert(
                "trade",
                row(&[("ca_id", json!(c_id)), ("t_id", json!(c_id * 100)), ("t_qty", json!(5))]),
            )
            .await
            .unwrap();
        store
            .increment("account_activity", &row(&[("ca_id", json!(c_id))]), "trade_count", 3)
            .await
            .unwrap();
    }
    store
}

/// Small catalog touching the seeded tables, one query per type.
pub fn catalog() -> QueryCatalog {
    let mut catalog = QueryCatalog::new();

    catalog
        .register(
            QueryDefinition::new(
                "get_customer",
                "Customer lookup",
                QueryType::Select,
                Complexity::Simple,
                Arc::new(GetCustomer),
            )
            .with_params(|| QueryParams::from([("c_id".to_string(), json!(random_customer_id()))])),
        )
        .unwrap();

    catalog
        .register(
            QueryDefinition::new(
                "delete_trade",
                "Delete trade",
                QueryType::Delete,
                Complexity::Simple,
                Arc::new(DeleteTrade),
            )
            .with_params(|| {
                let id = random_customer_id();
                QueryParams::from([
                    ("ca_id".to_string(), json!(id)),
                    ("t_id".to_string(), json!(id * 100)),
                ])
            }),
        )
        .unwrap();

    catalog
        .register(QueryDefinition::new(
            "always_fails",
            "Failing update",
            QueryType::Update,
            Complexity::Simple,
            handler_fn(|_| async { Err(CoreError::execution("always_fails", "write timeout")) }),
        ))
        .unwrap();

    catalog
}

fn random_customer_id() -> i64 {
    use rand::Rng;
    rand::thread_rng().gen_range(0..10)
}

struct GetCustomer;

#[async_trait::async_trait]
impl loadbench_core::QueryHandler for GetCustomer {
    async fn execute(
        &self,
        session: &dyn StoreSession,
        params: QueryParams,
    ) -> loadbench_core::CoreResult<Option<Value>> {
        let found = session.get("customer", &params).await?;
        Ok(found.map(|r| json!(r)))
    }
}

struct DeleteTrade;

#[async_trait::async_trait]
impl loadbench_core::QueryHandler for DeleteTrade {
    async fn execute(
        &self,
        session: &dyn StoreSession,
        params: QueryParams,
    ) -> loadbench_core::CoreResult<Option<Value>> {
        let deleted = session.delete("trade", &params).await?;
        Ok(Some(json!({ "deleted": deleted })))
    }
}
