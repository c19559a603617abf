//! Synthetic brokerage dataset used to seed the in-memory store.
//!
//! Keys are dense and deterministic so the catalog can generate parameters
//! that hit existing rows: customer `c` owns account `c`, and trade `t`
//! belongs to account `t % num_customers` and trades security
//! `t % num_securities`.

use std::collections::BTreeMap;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::info;

use loadbench_core::{CoreError, CoreResult, DataGenerationConfig, Row, StoreSession};
use loadbench_harness::split_schema_statements;

const SEED: u64 = 0x5eed_b0b5;
const EXCHANGES: [&str; 4] = ["NYSE", "NASDAQ", "AMEX", "PCX"];
pub const TRADE_STATUSES: [&str; 3] = ["CMPT", "SBMT", "PNDG"];

/// Id ranges of a seeded dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRanges {
    pub customers: i64,
    pub securities: i64,
    pub trades: i64,
}

impl IdRanges {
    pub fn new(scale: &DataGenerationConfig) -> CoreResult<Self> {
        let ranges = Self {
            customers: to_i64("num_customers", scale.num_customers)?,
            securities: to_i64("num_securities", scale.num_securities)?,
            trades: to_i64("num_trades", scale.num_trades)?,
        };
        Ok(ranges)
    }

    /// Account that owns trade `t_id`.
    pub fn trade_account(&self, t_id: i64) -> i64 {
        t_id.rem_euclid(self.customers)
    }

    /// Symbol traded by trade `t_id`.
    pub fn trade_symbol(&self, t_id: i64) -> String {
        symbol(t_id.rem_euclid(self.securities))
    }
}

fn to_i64(key: &str, value: usize) -> CoreResult<i64> {
    match i64::try_from(value) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(CoreError::configuration(format!(
            "data_generation.{key} must be between 1 and {}",
            i64::MAX
        ))),
    }
}

pub fn symbol(index: i64) -> String {
    format!("S{index:04}")
}

/// Rows written per table by [`seed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub keyspace: String,
    pub rows: BTreeMap<String, usize>,
}

impl SeedReport {
    pub fn total_rows(&self) -> usize {
        self.rows.values().sum()
    }
}

/// Create `keyspace` from `schema` and fill it with a synthetic dataset.
///
/// Leaves the session pointed at `keyspace`.
pub async fn seed(
    session: &dyn StoreSession,
    keyspace: &str,
    schema: &str,
    replication_factor: u32,
    scale: &DataGenerationConfig,
) -> CoreResult<SeedReport> {
    let ranges = IdRanges::new(scale)?;

    session.create_keyspace(keyspace, replication_factor).await?;
    for statement in split_schema_statements(schema) {
        session.execute_schema(keyspace, &statement).await?;
    }
    session.set_keyspace(keyspace).await?;

    let mut rng = StdRng::seed_from_u64(SEED);
    let now = Utc::now().to_rfc3339();
    let mut report = SeedReport {
        keyspace: keyspace.to_string(),
        ..Default::default()
    };

    let mut customers = Vec::new();
    let mut accounts = Vec::new();
    for c_id in 0..ranges.customers {
        customers.push(row([
            ("c_id", json!(c_id)),
            ("c_name", json!(format!("Customer {c_id}"))),
            ("c_email", json!(format!("customer{c_id}@example.com"))),
            ("c_tier", json!(rng.gen_range(1..=3))),
        ]));
        accounts.push(row([
            ("ca_id", json!(c_id)),
            ("ca_c_id", json!(c_id)),
            ("ca_name", json!(format!("Account {c_id}"))),
            ("ca_balance", json!(cents(rng.gen_range(1_000.0..100_000.0)))),
        ]));
    }

    let mut securities = Vec::new();
    let mut last_trades = Vec::new();
    let mut prices = Vec::new();
    for index in 0..ranges.securities {
        let symb = symbol(index);
        let price = cents(rng.gen_range(10.0..500.0));
        prices.push(price);
        securities.push(row([
            ("s_symb", json!(symb)),
            ("s_name", json!(format!("Security {index}"))),
            ("s_exchange", json!(EXCHANGES.choose(&mut rng).copied().unwrap_or("NYSE"))),
        ]));
        last_trades.push(row([
            ("lt_s_symb", json!(symb)),
            ("lt_price", json!(price)),
            ("lt_vol", json!(0)),
            ("lt_dts", json!(now)),
        ]));
    }

    let mut trades = Vec::new();
    let mut holdings: BTreeMap<(i64, String), i64> = BTreeMap::new();
    let mut activity: BTreeMap<i64, i64> = BTreeMap::new();
    for t_id in 0..ranges.trades {
        let ca_id = ranges.trade_account(t_id);
        let symb = ranges.trade_symbol(t_id);
        let qty: i64 = rng.gen_range(1..=500);
        let base = prices
            .get(t_id.rem_euclid(ranges.securities) as usize)
            .copied()
            .unwrap_or(100.0);
        trades.push(row([
            ("t_ca_id", json!(ca_id)),
            ("t_id", json!(t_id)),
            ("t_s_symb", json!(symb)),
            ("t_qty", json!(qty)),
            ("t_price", json!(cents(base * rng.gen_range(0.95..1.05)))),
            (
                "t_st_id",
                json!(TRADE_STATUSES.choose(&mut rng).copied().unwrap_or("CMPT")),
            ),
            ("t_dts", json!(now)),
        ]));
        *holdings.entry((ca_id, symb)).or_default() += qty;
        *activity.entry(ca_id).or_default() += 1;
    }

    let holdings: Vec<Row> = holdings
        .into_iter()
        .map(|((ca_id, symb), qty)| {
            row([
                ("hs_ca_id", json!(ca_id)),
                ("hs_s_symb", json!(symb)),
                ("hs_qty", json!(qty)),
            ])
        })
        .collect();

    for (table, rows) in [
        ("customer", customers),
        ("customer_account", accounts),
        ("security", securities),
        ("last_trade", last_trades),
        ("trade_by_account", trades),
        ("holding_summary", holdings),
    ] {
        let written = session.write_rows(keyspace, table, rows).await?;
        report.rows.insert(table.to_string(), written);
    }

    for (ca_id, count) in &activity {
        session
            .increment(
                "account_activity",
                &row([("ca_id", json!(ca_id))]),
                "trade_count",
                *count,
            )
            .await?;
    }
    report
        .rows
        .insert("account_activity".to_string(), activity.len());

    info!(
        keyspace,
        tables = report.rows.len(),
        rows = report.total_rows(),
        "Seeded synthetic brokerage data"
    );
    Ok(report)
}

pub fn row<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> Row {
    pairs
        .into_iter()
        .map(|(column, value)| (column.to_string(), value))
        .collect()
}

fn cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
