// src/jobs/stock_prices.rs
use chrono_tz::America::New_York;
use log::{error, info, warn};

use super::{JobContext, JobError, JobOutcome};
use crate::models::{DailyBar, DailyPriceRecord};
use crate::services::bigquery::{to_rows, Statement, TableId, Warehouse, WarehouseError};
use crate::services::coerce::coerce_numeric;
use crate::services::yahoo::HistoryRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceAction {
    /// No row for (symbol, date) yet; insert in the batch at the end.
    Queued,
    /// Existing row(s) overwritten in place.
    Updated,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Price record for the most recent bar, dated by the exchange's trading day.
pub fn latest_price_record(symbol: &str, bars: &[DailyBar]) -> Option<DailyPriceRecord> {
    let latest = bars.last()?;
    Some(DailyPriceRecord {
        symbol: symbol.to_string(),
        date: latest.timestamp.with_timezone(&New_York).date_naive(),
        open: round2(latest.open),
        close: round2(latest.close),
        high: round2(latest.high),
        low: round2(latest.low),
        volume: i64::try_from(latest.volume).unwrap_or(i64::MAX),
    })
}

/// Check for an existing (symbol, date) row and update it, or report that it needs inserting.
pub async fn reconcile_price(
    warehouse: &dyn Warehouse,
    table: &TableId,
    record: &DailyPriceRecord,
) -> Result<PriceAction, WarehouseError> {
    let check = Statement::new(format!(
        "SELECT COUNT(*) AS count FROM {} WHERE symbol = @symbol AND date = @date",
        table.sql()
    ))
    .bind("symbol", record.symbol.as_str())
    .bind("date", record.date);

    let rows = warehouse.query(&check).await?;
    let existing = rows
        .first()
        .and_then(|row| row.get("count"))
        .and_then(coerce_numeric)
        .ok_or_else(|| {
            WarehouseError::UnexpectedResponse(format!(
                "no count for {} on {} in {}",
                record.symbol, record.date, table
            ))
        })?;

    if existing == 0.0 {
        return Ok(PriceAction::Queued);
    }

    let update = Statement::new(format!(
        "UPDATE {} SET open = @open, close = @close, high = @high, low = @low, volume = @volume \
         WHERE symbol = @symbol AND date = @date",
        table.sql()
    ))
    .bind("open", record.open)
    .bind("close", record.close)
    .bind("high", record.high)
    .bind("low", record.low)
    .bind("volume", record.volume)
    .bind("symbol", record.symbol.as_str())
    .bind("date", record.date);

    warehouse.query(&update).await?;
    Ok(PriceAction::Updated)
}

/// Latest daily bar per ticker; existing rows are updated, new ones streamed in one batch.
pub async fn run(ctx: &JobContext) -> Result<JobOutcome, JobError> {
    let table = ctx.config.stock_prices_table()?;
    let mut pending = Vec::new();

    for symbol in &ctx.config.price_tickers {
        let bars = ctx.market.daily_bars(symbol, HistoryRange::OneDay).await;
        let Some(bars) = ctx.config.price_policy.handle(symbol, bars)? else {
            continue;
        };
        let Some(record) = latest_price_record(symbol, &bars) else {
            warn!("No price data for {}", symbol);
            continue;
        };

        match reconcile_price(ctx.warehouse.as_ref(), &table, &record).await? {
            PriceAction::Queued => pending.push(record),
            PriceAction::Updated => info!("Updated {} for {}", symbol, record.date),
        }
    }

    if !pending.is_empty() {
        let errors = ctx.warehouse.insert_rows(&table, &to_rows(&pending)?).await?;
        if !errors.is_empty() {
            error!("Errors inserting {} price rows: {:?}", pending.len(), errors);
            return Ok(JobOutcome::partial_failure(format!("Error inserting rows: {:?}", errors)));
        }
        info!("Inserted {} price rows into {}", pending.len(), table);
    }

    Ok(JobOutcome::success("Stock data updated successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::bigquery::{ParamValue, RowInsertError};
    use crate::test_support::{bar, config, FakeMarket, FakeWarehouse, TestDeps};
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Arc;

    const TABLE: &str = "earnest-fuze-109910.stock_data.daily_stock_prices";

    fn record() -> DailyPriceRecord {
        DailyPriceRecord {
            symbol: "AAPL".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            open: 172.51,
            close: 173.03,
            high: 173.42,
            low: 170.89,
            volume: 94_214_900,
        }
    }

    fn warehouse_with_count(count: &'static str) -> FakeWarehouse {
        FakeWarehouse::with_responder(move |statement, _| {
            if statement.sql.starts_with("SELECT COUNT(*)") {
                vec![json!({"count": count}).as_object().cloned().unwrap()]
            } else {
                Vec::new()
            }
        })
    }

    #[tokio::test]
    async fn test_new_key_is_queued_without_update() {
        let warehouse = warehouse_with_count("0");
        let table = TableId::parse(TABLE).unwrap();

        let action = reconcile_price(&warehouse, &table, &record()).await.unwrap();
        assert_eq!(action, PriceAction::Queued);

        let statements = warehouse.statements();
        assert_eq!(statements.len(), 1);
        assert!(statements.iter().all(|s| !s.sql.starts_with("UPDATE")));
        assert!(warehouse.inserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_count_is_an_error() {
        let warehouse = FakeWarehouse::new();
        let table = TableId::parse(TABLE).unwrap();

        let result = reconcile_price(&warehouse, &table, &record()).await;
        assert!(matches!(result, Err(WarehouseError::UnexpectedResponse(_))));
        assert_eq!(warehouse.statements().len(), 1);
        assert!(warehouse.inserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_fails_without_a_count_row() {
        let market = FakeMarket::default().with_bars("AAPL", HistoryRange::OneDay, vec![bar(2024, 5, 2, 13, 173.0)]);
        let deps = TestDeps {
            market: Arc::new(market),
            ..TestDeps::default()
        };
        let ctx = deps.context(config(&[("STOCK_PRICES_TABLE_ID", TABLE), ("PRICE_TICKERS", "AAPL")]));

        let result = run(&ctx).await;
        assert!(matches!(result, Err(JobError::Warehouse(WarehouseError::UnexpectedResponse(_)))));
        assert!(deps.warehouse.inserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_existing_key_gets_exactly_one_update() {
        let warehouse = warehouse_with_count("2");
        let table = TableId::parse(TABLE).unwrap();

        let action = reconcile_price(&warehouse, &table, &record()).await.unwrap();
        assert_eq!(action, PriceAction::Updated);

        let updates: Vec<_> = warehouse
            .statements()
            .into_iter()
            .filter(|s| s.sql.starts_with("UPDATE"))
            .collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].param("symbol").and_then(ParamValue::as_str), Some("AAPL"));
        assert_eq!(updates[0].param("volume"), Some(&ParamValue::Int64(Some(94_214_900))));
        assert!(!updates[0].sql.contains("'AAPL'"));
        assert!(warehouse.inserts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_latest_bar_uses_exchange_date() {
        // 00:30 UTC on the 3rd is still the 2nd in New York
        let mut late = bar(2024, 5, 3, 0, 173.0349);
        late.timestamp = late.timestamp + chrono::Duration::minutes(30);
        let record = latest_price_record("AAPL", &[bar(2024, 5, 1, 13, 169.3), late]).unwrap();

        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        assert_eq!(record.close, 173.03);
        assert_eq!(record.volume, 1_000_000);
        assert!(latest_price_record("AAPL", &[]).is_none());
    }

    #[tokio::test]
    async fn test_run_inserts_only_new_rows() {
        let market = FakeMarket::default()
            .with_bars("AAPL", HistoryRange::OneDay, vec![bar(2024, 5, 2, 13, 173.0)])
            .with_bars("MSFT", HistoryRange::OneDay, vec![bar(2024, 5, 2, 13, 397.8)]);
        let warehouse = FakeWarehouse::with_responder(|statement, _| {
            let count = if statement.param("symbol").and_then(ParamValue::as_str) == Some("MSFT") {
                "1"
            } else {
                "0"
            };
            vec![json!({"count": count}).as_object().cloned().unwrap()]
        });
        let deps = TestDeps {
            market: Arc::new(market),
            warehouse: Arc::new(warehouse),
            ..TestDeps::default()
        };
        let ctx = deps.context(config(&[("STOCK_PRICES_TABLE_ID", TABLE), ("PRICE_TICKERS", "AAPL,MSFT,KO")]));

        let outcome = run(&ctx).await.unwrap();
        assert_eq!(outcome, JobOutcome::success("Stock data updated successfully"));

        let inserts = deps.warehouse.inserts.lock().unwrap();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].1.len(), 1);
        assert_eq!(inserts[0].1[0]["symbol"], "AAPL");
        assert_eq!(inserts[0].1[0]["date"], "2024-05-02");

        let updates = deps.warehouse.statements().into_iter().filter(|s| s.sql.starts_with("UPDATE")).count();
        assert_eq!(updates, 1);
    }

    #[tokio::test]
    async fn test_insert_errors_are_a_partial_failure() {
        let market = FakeMarket::default().with_bars("AAPL", HistoryRange::OneDay, vec![bar(2024, 5, 2, 13, 173.0)]);
        let deps = TestDeps {
            market: Arc::new(market),
            warehouse: Arc::new(warehouse_with_count("0")),
            ..TestDeps::default()
        };
        deps.warehouse.insert_errors.lock().unwrap().push(RowInsertError { index: 0, errors: vec![] });
        let ctx = deps.context(config(&[("STOCK_PRICES_TABLE_ID", TABLE), ("PRICE_TICKERS", "AAPL")]));

        let outcome = run(&ctx).await.unwrap();
        assert!(outcome.partial_failure);
        assert!(outcome.message.starts_with("Error inserting rows:"));
    }
}
