// src/jobs/earnings_report.rs
use log::info;

use super::{JobContext, JobError, JobOutcome};
use crate::models::RawRecord;
use crate::services::alpha_vantage::StatementKind;
use crate::services::bigquery::to_rows;
use crate::services::fetch::{fetch_each, FetchError};
use crate::services::financials::{into_reports, merge_statements};

async fn fetch_all(ctx: &JobContext, kind: StatementKind) -> Result<Vec<RawRecord>, FetchError> {
    fetch_each(&ctx.config.earnings_tickers, ctx.config.earnings_policy, |symbol| async move {
        ctx.fundamentals.quarterly(&symbol, kind).await
    })
    .await
}

/// Quarterly earnings joined with income statements, bulk-loaded in one job.
pub async fn run(ctx: &JobContext) -> Result<JobOutcome, JobError> {
    let table = ctx.config.earnings_report_table()?;

    let earnings = fetch_all(ctx, StatementKind::Earnings).await?;
    let income = fetch_all(ctx, StatementKind::IncomeStatement).await?;

    let reports = into_reports(merge_statements(&earnings, &income))?;
    let loaded = ctx.warehouse.load_rows(&table, &to_rows(&reports)?).await?;
    info!("Loaded {} rows into {}", loaded, table);

    Ok(JobOutcome::success("Earnings report data fetched and stored successfully."))
}
