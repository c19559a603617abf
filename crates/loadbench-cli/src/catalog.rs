//! Brokerage query catalog: one query per type and complexity.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde_json::{json, Value};

use loadbench_core::{
    Complexity, CoreError, CoreResult, DataGenerationConfig, QueryCatalog, QueryDefinition,
    QueryHandler, QueryParams, QueryType, StoreSession,
};

use crate::datagen::{row, symbol, IdRanges};

/// Ids handed out to inserted rows start here, clear of the seeded ranges.
const NEW_ID_BASE: i64 = 1 << 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrokerageQuery {
    CustomerById,
    TradesByAccount,
    PortfolioValuation,
    NewCustomer,
    RecordTrade,
    PlaceOrder,
    UpdateCustomerTier,
    UpdateLastPrice,
    SettleTrade,
    DeleteTrade,
    DeleteHolding,
    PurgePendingTrades,
}

impl BrokerageQuery {
    const ALL: [BrokerageQuery; 12] = [
        Self::CustomerById,
        Self::TradesByAccount,
        Self::PortfolioValuation,
        Self::NewCustomer,
        Self::RecordTrade,
        Self::PlaceOrder,
        Self::UpdateCustomerTier,
        Self::UpdateLastPrice,
        Self::SettleTrade,
        Self::DeleteTrade,
        Self::DeleteHolding,
        Self::PurgePendingTrades,
    ];

    fn id(self) -> &'static str {
        match self {
            Self::CustomerById => "customer_by_id",
            Self::TradesByAccount => "trades_by_account",
            Self::PortfolioValuation => "portfolio_valuation",
            Self::NewCustomer => "new_customer",
            Self::RecordTrade => "record_trade",
            Self::PlaceOrder => "place_order",
            Self::UpdateCustomerTier => "update_customer_tier",
            Self::UpdateLastPrice => "update_last_price",
            Self::SettleTrade => "settle_trade",
            Self::DeleteTrade => "delete_trade",
            Self::DeleteHolding => "delete_holding",
            Self::PurgePendingTrades => "purge_pending_trades",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::CustomerById => "Customer lookup",
            Self::TradesByAccount => "Recent trades by account",
            Self::PortfolioValuation => "Portfolio valuation",
            Self::NewCustomer => "New customer",
            Self::RecordTrade => "Record trade",
            Self::PlaceOrder => "Place order",
            Self::UpdateCustomerTier => "Update customer tier",
            Self::UpdateLastPrice => "Update last trade price",
            Self::SettleTrade => "Settle trade",
            Self::DeleteTrade => "Delete trade",
            Self::DeleteHolding => "Delete holding",
            Self::PurgePendingTrades => "Purge pending trades",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::CustomerById => "Point read of one customer by id",
            Self::TradesByAccount => "Partition scan of an account's trades, limited",
            Self::PortfolioValuation => "Holdings of an account priced at the last trade",
            Self::NewCustomer => "Insert a customer row",
            Self::RecordTrade => "Insert a trade and bump the account's trade counter",
            Self::PlaceOrder => "Price, record and book a trade against an account",
            Self::UpdateCustomerTier => "Set the tier of one customer",
            Self::UpdateLastPrice => "Move a security's last price and volume",
            Self::SettleTrade => "Complete a trade and apply it to holdings and balance",
            Self::DeleteTrade => "Delete one trade by primary key",
            Self::DeleteHolding => "Read then delete one holding",
            Self::PurgePendingTrades => "Delete an account's pending trades",
        }
    }

    fn query_type(self) -> QueryType {
        match self {
            Self::CustomerById | Self::TradesByAccount | Self::PortfolioValuation => {
                QueryType::Select
            }
            Self::NewCustomer | Self::RecordTrade | Self::PlaceOrder => QueryType::Insert,
            Self::UpdateCustomerTier | Self::UpdateLastPrice | Self::SettleTrade => {
                QueryType::Update
            }
            Self::DeleteTrade | Self::DeleteHolding | Self::PurgePendingTrades => {
                QueryType::Delete
            }
        }
    }

    fn complexity(self) -> Complexity {
        match self {
            Self::CustomerById | Self::NewCustomer | Self::UpdateCustomerTier | Self::DeleteTrade => {
                Complexity::Simple
            }
            Self::TradesByAccount
            | Self::RecordTrade
            | Self::UpdateLastPrice
            | Self::DeleteHolding => Complexity::Medium,
            Self::PortfolioValuation
            | Self::PlaceOrder
            | Self::SettleTrade
            | Self::PurgePendingTrades => Complexity::Complex,
        }
    }

    fn params(self, ids: &IdRanges) -> QueryParams {
        let mut rng = rand::thread_rng();
        let account = rng.gen_range(0..ids.customers);
        let security = symbol(rng.gen_range(0..ids.securities));

        let pairs: Vec<(&str, Value)> = match self {
            Self::CustomerById => vec![("c_id", json!(account))],
            Self::TradesByAccount => vec![("ca_id", json!(account)), ("limit", json!(20))],
            Self::PortfolioValuation | Self::PurgePendingTrades => {
                vec![("ca_id", json!(account))]
            }
            Self::NewCustomer => vec![("c_id", json!(NEW_ID_BASE + rng.gen_range(0..1i64 << 40)))],
            Self::RecordTrade | Self::PlaceOrder => vec![
                ("ca_id", json!(account)),
                ("t_id", json!(NEW_ID_BASE + rng.gen_range(0..1i64 << 40))),
                ("s_symb", json!(security)),
                ("qty", json!(rng.gen_range(1..=500))),
                ("price", json!(rng.gen_range(10.0..500.0))),
            ],
            Self::UpdateCustomerTier => {
                vec![("c_id", json!(account)), ("tier", json!(rng.gen_range(1..=3)))]
            }
            Self::UpdateLastPrice => vec![
                ("s_symb", json!(security)),
                ("price", json!(rng.gen_range(10.0..500.0))),
                ("volume", json!(rng.gen_range(1..=1_000))),
            ],
            Self::SettleTrade | Self::DeleteTrade => {
                let t_id = rng.gen_range(0..ids.trades);
                vec![
                    ("ca_id", json!(ids.trade_account(t_id))),
                    ("t_id", json!(t_id)),
                ]
            }
            Self::DeleteHolding => {
                vec![("ca_id", json!(account)), ("s_symb", json!(security))]
            }
        };

        pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }
}

/// Build the brokerage catalog with parameters drawn from the seeded id ranges.
pub fn brokerage_catalog(scale: &DataGenerationConfig) -> CoreResult<QueryCatalog> {
    let ids = IdRanges::new(scale)?;
    let mut catalog = QueryCatalog::new();

    for query in BrokerageQuery::ALL {
        catalog.register(
            QueryDefinition::new(
                query.id(),
                query.name(),
                query.query_type(),
                query.complexity(),
                Arc::new(query),
            )
            .with_description(query.description())
            .with_params(move || query.params(&ids)),
        )?;
    }

    Ok(catalog)
}

#[async_trait]
impl QueryHandler for BrokerageQuery {
    async fn execute(
        &self,
        session: &dyn StoreSession,
        params: QueryParams,
    ) -> CoreResult<Option<Value>> {
        let args = Args {
            query_id: self.id(),
            params,
        };
        let result = match self {
            Self::CustomerById => customer_by_id(session, &args).await?,
            Self::TradesByAccount => trades_by_account(session, &args).await?,
            Self::PortfolioValuation => portfolio_valuation(session, &args).await?,
            Self::NewCustomer => new_customer(session, &args).await?,
            Self::RecordTrade => record_trade(session, &args).await?,
            Self::PlaceOrder => place_order(session, &args).await?,
            Self::UpdateCustomerTier => update_customer_tier(session, &args).await?,
            Self::UpdateLastPrice => update_last_price(session, &args).await?,
            Self::SettleTrade => settle_trade(session, &args).await?,
            Self::DeleteTrade => delete_trade(session, &args).await?,
            Self::DeleteHolding => delete_holding(session, &args).await?,
            Self::PurgePendingTrades => purge_pending_trades(session, &args).await?,
        };
        Ok(Some(result))
    }
}

struct Args {
    query_id: &'static str,
    params: QueryParams,
}

impl Args {
    fn value(&self, key: &str) -> CoreResult<&Value> {
        self.params
            .get(key)
            .ok_or_else(|| CoreError::execution(self.query_id, format!("missing parameter `{key}`")))
    }

    fn int(&self, key: &str) -> CoreResult<i64> {
        self.value(key)?.as_i64().ok_or_else(|| self.mistyped(key, "an integer"))
    }

    fn float(&self, key: &str) -> CoreResult<f64> {
        self.value(key)?.as_f64().ok_or_else(|| self.mistyped(key, "a number"))
    }

    fn text(&self, key: &str) -> CoreResult<&str> {
        self.value(key)?.as_str().ok_or_else(|| self.mistyped(key, "a string"))
    }

    fn mistyped(&self, key: &str, expected: &str) -> CoreError {
        CoreError::execution(self.query_id, format!("parameter `{key}` must be {expected}"))
    }

    fn missing(&self, what: String) -> CoreError {
        CoreError::execution(self.query_id, format!("{what} does not exist"))
    }
}

fn trade_key(ca_id: i64, t_id: i64) -> QueryParams {
    row([("t_ca_id", json!(ca_id)), ("t_id", json!(t_id))])
}

fn holding_key(ca_id: i64, symb: &str) -> QueryParams {
    row([("hs_ca_id", json!(ca_id)), ("hs_s_symb", json!(symb))])
}

fn int_column(row: &QueryParams, column: &str) -> i64 {
    row.get(column).and_then(Value::as_i64).unwrap_or(0)
}

fn float_column(row: &QueryParams, column: &str) -> f64 {
    row.get(column).and_then(Value::as_f64).unwrap_or(0.0)
}

async fn customer_by_id(session: &dyn StoreSession, args: &Args) -> CoreResult<Value> {
    let customer = session
        .get("customer", &row([("c_id", json!(args.int("c_id")?))]))
        .await?;
    Ok(json!({ "found": customer.is_some() }))
}

async fn trades_by_account(session: &dyn StoreSession, args: &Args) -> CoreResult<Value> {
    let limit = usize::try_from(args.int("limit")?).unwrap_or(usize::MAX);
    let trades = session
        .scan(
            "trade_by_account",
            &row([("t_ca_id", json!(args.int("ca_id")?))]),
            Some(limit),
        )
        .await?;
    Ok(json!({ "trades": trades.len() }))
}

async fn portfolio_valuation(session: &dyn StoreSession, args: &Args) -> CoreResult<Value> {
    let ca_id = args.int("ca_id")?;
    let holdings = session
        .scan("holding_summary", &row([("hs_ca_id", json!(ca_id))]), None)
        .await?;

    let mut value = 0.0;
    for holding in &holdings {
        let Some(symb) = holding.get("hs_s_symb") else {
            continue;
        };
        let price = session
            .get("last_trade", &row([("lt_s_symb", symb.clone())]))
            .await?
            .map(|lt| float_column(&lt, "lt_price"))
            .unwrap_or(0.0);
        value += price * int_column(holding, "hs_qty") as f64;
    }

    Ok(json!({ "positions": holdings.len(), "value": value }))
}

async fn new_customer(session: &dyn StoreSession, args: &Args) -> CoreResult<Value> {
    let c_id = args.int("c_id")?;
    session
        .insert(
            "customer",
            row([
                ("c_id", json!(c_id)),
                ("c_name", json!(format!("Customer {c_id}"))),
                ("c_email", json!(format!("customer{c_id}@example.com"))),
                ("c_tier", json!(1)),
            ]),
        )
        .await?;
    Ok(json!({ "c_id": c_id }))
}

async fn insert_trade(
    session: &dyn StoreSession,
    args: &Args,
    price: f64,
    status: &str,
) -> CoreResult<()> {
    let ca_id = args.int("ca_id")?;
    session
        .insert(
            "trade_by_account",
            row([
                ("t_ca_id", json!(ca_id)),
                ("t_id", json!(args.int("t_id")?)),
                ("t_s_symb", json!(args.text("s_symb")?)),
                ("t_qty", json!(args.int("qty")?)),
                ("t_price", json!(price)),
                ("t_st_id", json!(status)),
                ("t_dts", json!(Utc::now().to_rfc3339())),
            ]),
        )
        .await?;
    session
        .increment(
            "account_activity",
            &row([("ca_id", json!(ca_id))]),
            "trade_count",
            1,
        )
        .await
}

async fn record_trade(session: &dyn StoreSession, args: &Args) -> CoreResult<Value> {
    insert_trade(session, args, args.float("price")?, "SBMT").await?;
    Ok(json!({ "t_id": args.int("t_id")? }))
}

async fn place_order(session: &dyn StoreSession, args: &Args) -> CoreResult<Value> {
    let ca_id = args.int("ca_id")?;
    let symb = args.text("s_symb")?;
    let qty = args.int("qty")?;

    let account_key = row([("ca_id", json!(ca_id))]);
    let account = session
        .get("customer_account", &account_key)
        .await?
        .ok_or_else(|| args.missing(format!("account {ca_id}")))?;
    let price = session
        .get("last_trade", &row([("lt_s_symb", json!(symb))]))
        .await?
        .map(|lt| float_column(&lt, "lt_price"))
        .ok_or_else(|| args.missing(format!("security {symb}")))?;

    insert_trade(session, args, price, "CMPT").await?;

    let key = holding_key(ca_id, symb);
    let held = session
        .get("holding_summary", &key)
        .await?
        .map(|h| int_column(&h, "hs_qty"))
        .unwrap_or(0);
    let mut holding = key;
    holding.insert("hs_qty".to_string(), json!(held + qty));
    session.insert("holding_summary", holding).await?;

    let cost = price * qty as f64;
    let balance = float_column(&account, "ca_balance") - cost;
    session
        .update(
            "customer_account",
            &account_key,
            row([("ca_balance", json!(balance))]),
        )
        .await?;

    Ok(json!({ "t_id": args.int("t_id")?, "cost": cost }))
}

async fn update_customer_tier(session: &dyn StoreSession, args: &Args) -> CoreResult<Value> {
    let updated = session
        .update(
            "customer",
            &row([("c_id", json!(args.int("c_id")?))]),
            row([("c_tier", json!(args.int("tier")?))]),
        )
        .await?;
    Ok(json!({ "updated": updated }))
}

async fn update_last_price(session: &dyn StoreSession, args: &Args) -> CoreResult<Value> {
    let key = row([("lt_s_symb", json!(args.text("s_symb")?))]);
    let volume = session
        .get("last_trade", &key)
        .await?
        .map(|lt| int_column(&lt, "lt_vol"))
        .unwrap_or(0);

    let updated = session
        .update(
            "last_trade",
            &key,
            row([
                ("lt_price", json!(args.float("price")?)),
                ("lt_vol", json!(volume + args.int("volume")?)),
                ("lt_dts", json!(Utc::now().to_rfc3339())),
            ]),
        )
        .await?;
    Ok(json!({ "updated": updated }))
}

async fn settle_trade(session: &dyn StoreSession, args: &Args) -> CoreResult<Value> {
    let ca_id = args.int("ca_id")?;
    let key = trade_key(ca_id, args.int("t_id")?);

    // Deleted trades and already completed trades settle as a no-op.
    let Some(trade) = session.get("trade_by_account", &key).await? else {
        return Ok(json!({ "settled": false }));
    };
    if trade.get("t_st_id") == Some(&json!("CMPT")) {
        return Ok(json!({ "settled": false }));
    }

    session
        .update("trade_by_account", &key, row([("t_st_id", json!("CMPT"))]))
        .await?;

    let symb = trade
        .get("t_s_symb")
        .and_then(Value::as_str)
        .ok_or_else(|| args.missing(format!("symbol of trade {}", int_column(&key, "t_id"))))?;
    let qty = int_column(&trade, "t_qty");
    let position = holding_key(ca_id, symb);
    let held = session
        .get("holding_summary", &position)
        .await?
        .map(|h| int_column(&h, "hs_qty"))
        .unwrap_or(0);
    let mut holding = position;
    holding.insert("hs_qty".to_string(), json!(held + qty));
    session.insert("holding_summary", holding).await?;

    let account_key = row([("ca_id", json!(ca_id))]);
    if let Some(account) = session.get("customer_account", &account_key).await? {
        let cost = float_column(&trade, "t_price") * qty as f64;
        session
            .update(
                "customer_account",
                &account_key,
                row([("ca_balance", json!(float_column(&account, "ca_balance") - cost))]),
            )
            .await?;
    }

    Ok(json!({ "settled": true }))
}

async fn delete_trade(session: &dyn StoreSession, args: &Args) -> CoreResult<Value> {
    let deleted = session
        .delete(
            "trade_by_account",
            &trade_key(args.int("ca_id")?, args.int("t_id")?),
        )
        .await?;
    Ok(json!({ "deleted": deleted }))
}

async fn delete_holding(session: &dyn StoreSession, args: &Args) -> CoreResult<Value> {
    let key = holding_key(args.int("ca_id")?, args.text("s_symb")?);
    let Some(holding) = session.get("holding_summary", &key).await? else {
        return Ok(json!({ "deleted": false, "qty": 0 }));
    };
    let deleted = session.delete("holding_summary", &key).await?;
    Ok(json!({ "deleted": deleted, "qty": int_column(&holding, "hs_qty") }))
}

async fn purge_pending_trades(session: &dyn StoreSession, args: &Args) -> CoreResult<Value> {
    let ca_id = args.int("ca_id")?;
    let pending = session
        .scan(
            "trade_by_account",
            &row([("t_ca_id", json!(ca_id)), ("t_st_id", json!("PNDG"))]),
            Some(10),
        )
        .await?;

    let mut purged = 0;
    for trade in &pending {
        let t_id = int_column(trade, "t_id");
        if session.delete("trade_by_account", &trade_key(ca_id, t_id)).await? {
            purged += 1;
        }
    }
    Ok(json!({ "purged": purged }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datagen::seed;
    use loadbench_store::MemoryStore;

    const SCHEMA: &str = include_str!("../../../schema/brokerage.cql");

    fn scale() -> DataGenerationConfig {
        DataGenerationConfig {
            num_customers: 4,
            num_securities: 6,
            num_trades: 30,
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        seed(&store, "brokerage", SCHEMA, 1, &scale()).await.unwrap();
        store
    }

    #[test]
    fn test_catalog_covers_every_type_and_complexity() {
        let catalog = brokerage_catalog(&scale()).unwrap();
        assert_eq!(catalog.len(), 12);
        for query_type in QueryType::ALL {
            for complexity in Complexity::ALL {
                assert_eq!(
                    catalog.by_type_and_complexity(query_type, complexity).len(),
                    1,
                    "{query_type}/{complexity}"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_every_query_runs_against_seeded_data() {
        let store = seeded().await;
        let catalog = brokerage_catalog(&scale()).unwrap();

        for definition in catalog.all() {
            for _ in 0..5 {
                let result = definition
                    .handler
                    .execute(&store, definition.generate_params())
                    .await;
                assert!(result.is_ok(), "{} failed: {result:?}", definition.query_id);
            }
        }
    }

    #[tokio::test]
    async fn test_place_order_books_holding_and_balance() {
        let store = seeded().await;
        let account_key = row([("ca_id", json!(1))]);
        let before = store.get("customer_account", &account_key).await.unwrap().unwrap();
        let price = store
            .get("last_trade", &row([("lt_s_symb", json!("S0002"))]))
            .await
            .unwrap()
            .unwrap()["lt_price"]
            .as_f64()
            .unwrap();

        let params = row([
            ("ca_id", json!(1)),
            ("t_id", json!(NEW_ID_BASE)),
            ("s_symb", json!("S0002")),
            ("qty", json!(10)),
            ("price", json!(1.0)),
        ]);
        BrokerageQuery::PlaceOrder.execute(&store, params).await.unwrap();

        let after = store.get("customer_account", &account_key).await.unwrap().unwrap();
        let spent = before["ca_balance"].as_f64().unwrap() - after["ca_balance"].as_f64().unwrap();
        assert!((spent - price * 10.0).abs() < 1e-6);

        let trade = store
            .get("trade_by_account", &trade_key(1, NEW_ID_BASE))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(trade["t_st_id"], json!("CMPT"));
        let activity = store.get("account_activity", &account_key).await.unwrap().unwrap();
        assert!(activity["trade_count"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_place_order_for_unknown_account_fails() {
        let store = seeded().await;
        let params = row([
            ("ca_id", json!(999)),
            ("t_id", json!(NEW_ID_BASE)),
            ("s_symb", json!("S0001")),
            ("qty", json!(1)),
            ("price", json!(1.0)),
        ]);

        let err = BrokerageQuery::PlaceOrder
            .execute(&store, params)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Execution { ref query_id, .. } if query_id == "place_order"));
    }

    #[tokio::test]
    async fn test_missing_parameter_is_execution_error() {
        let store = seeded().await;
        let err = BrokerageQuery::CustomerById
            .execute(&store, QueryParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Execution { .. }));
    }

    #[tokio::test]
    async fn test_settle_trade_is_idempotent() {
        let store = seeded().await;
        let params = row([("ca_id", json!(3)), ("t_id", json!(3))]);

        BrokerageQuery::SettleTrade
            .execute(&store, params.clone())
            .await
            .unwrap();
        let second = BrokerageQuery::SettleTrade
            .execute(&store, params)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(second, json!({ "settled": false }));
        let trade = store
            .get("trade_by_account", &trade_key(3, 3))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(trade["t_st_id"], json!("CMPT"));
    }
}
