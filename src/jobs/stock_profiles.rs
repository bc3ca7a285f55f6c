// src/jobs/stock_profiles.rs
use log::info;

use super::{JobContext, JobError, JobOutcome};
use crate::models::StockProfileRecord;
use crate::services::bigquery::{Statement, TableId, Warehouse, WarehouseError};
use crate::services::fetch::FetchError;
use crate::services::risk::{trailing_metrics, RiskInputs};
use crate::services::yahoo::HistoryRange;

const PROFILE_COLUMNS: [&str; 10] = [
    "Ticker",
    "Current_Price",
    "PE_Ratio",
    "Dividend_Yield",
    "Market_Cap",
    "Sector",
    "Beta",
    "Volatility",
    "Price_Change_1Y",
    "Risk_Level",
];

/// Insert-or-update of one profile row keyed by ticker, every value bound as a parameter.
pub fn merge_statement(table: &TableId, profile: &StockProfileRecord) -> Statement {
    let select = PROFILE_COLUMNS
        .iter()
        .map(|c| format!("@{c} AS {c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let assignments = PROFILE_COLUMNS[1..]
        .iter()
        .map(|c| format!("target.{c} = source.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let values = PROFILE_COLUMNS
        .iter()
        .map(|c| format!("source.{c}"))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "MERGE {table} AS target \
         USING (SELECT {select}) AS source \
         ON target.Ticker = source.Ticker \
         WHEN MATCHED THEN UPDATE SET {assignments} \
         WHEN NOT MATCHED THEN INSERT ({columns}) VALUES ({values})",
        table = table.sql(),
        columns = PROFILE_COLUMNS.join(", "),
    );

    Statement::new(sql)
        .bind("Ticker", profile.ticker.as_str())
        .bind("Current_Price", profile.current_price)
        .bind("PE_Ratio", profile.pe_ratio)
        .bind("Dividend_Yield", profile.dividend_yield)
        .bind("Market_Cap", profile.market_cap)
        .bind("Sector", profile.sector.as_str())
        .bind("Beta", profile.beta)
        .bind("Volatility", profile.volatility)
        .bind("Price_Change_1Y", profile.price_change_1y)
        .bind("Risk_Level", profile.risk_level.as_str())
}

pub async fn upsert_profile(
    warehouse: &dyn Warehouse,
    table: &TableId,
    profile: &StockProfileRecord,
) -> Result<(), WarehouseError> {
    warehouse.query(&merge_statement(table, profile)).await?;
    Ok(())
}

/// Pull a year of history plus ticker metadata and classify the risk.
pub async fn build_profile(ctx: &JobContext, symbol: &str) -> Result<StockProfileRecord, FetchError> {
    let history = ctx.market.daily_bars(symbol, HistoryRange::OneYear).await?;
    let closes: Vec<f64> = history.iter().map(|bar| bar.close).collect();
    let metrics = trailing_metrics(&closes).ok_or_else(|| FetchError::missing(symbol, "no one-year price history"))?;

    let current_price = ctx
        .market
        .daily_bars(symbol, HistoryRange::OneDay)
        .await?
        .last()
        .map(|bar| bar.close)
        .ok_or_else(|| FetchError::missing(symbol, "no price for the latest session"))?;

    let info = ctx.market.ticker_info(symbol).await?;
    let inputs = RiskInputs {
        beta: info.beta,
        trailing_pe: info.trailing_pe,
        market_cap: info.market_cap.map(|cap| cap as f64),
        dividend_yield: info.dividend_yield,
        volatility: metrics.volatility,
        price_change_1y: Some(metrics.price_change_1y),
    };

    Ok(StockProfileRecord {
        ticker: symbol.to_string(),
        current_price,
        pe_ratio: info.trailing_pe,
        dividend_yield: info.dividend_yield.unwrap_or(0.0),
        market_cap: info.market_cap,
        sector: info.sector.unwrap_or_else(|| "Unknown".to_string()),
        beta: info.beta,
        volatility: metrics.volatility,
        price_change_1y: metrics.price_change_1y,
        risk_level: ctx.risk.classify(&inputs),
    })
}

/// Profile and risk level per ticker, merged into the stocks table one ticker at a time.
pub async fn run(ctx: &JobContext) -> Result<JobOutcome, JobError> {
    let table = ctx.config.stock_profiles_table()?;

    for symbol in &ctx.config.profile_tickers {
        let profile = build_profile(ctx, symbol).await;
        let Some(profile) = ctx.config.profile_policy.handle(symbol, profile)? else {
            continue;
        };
        upsert_profile(ctx.warehouse.as_ref(), &table, &profile).await?;
        info!("Stock data updated for {} ({} risk)", profile.ticker, profile.risk_level);
    }

    Ok(JobOutcome::success("Stock data updated successfully"))
}
