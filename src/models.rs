// src/models.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::services::coerce::{lenient_datetime, lenient_f64};

/// An upstream payload as key/value pairs, tagged with the symbol it was fetched for.
pub type RawRecord = Map<String, Value>;

/// One merged row of the earnings report table: quarterly earnings joined with the
/// income statement of the same fiscal quarter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsReport {
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub fiscal_date_ending: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub reported_date: Option<NaiveDateTime>,

    #[serde(rename = "reportedEPS", default, deserialize_with = "lenient_f64")]
    pub reported_eps: Option<f64>,
    #[serde(rename = "estimatedEPS", default, deserialize_with = "lenient_f64")]
    pub estimated_eps: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub surprise: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub surprise_percentage: Option<f64>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub gross_profit: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_revenue: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cost_of_revenue: Option<f64>,
    #[serde(rename = "costofGoodsAndServicesSold", default, deserialize_with = "lenient_f64")]
    pub cost_of_goods_and_services_sold: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub operating_income: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub selling_general_and_administrative: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub research_and_development: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub operating_expenses: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub investment_income_net: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub net_interest_income: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub interest_income: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub interest_expense: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub non_interest_income: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub other_non_operating_income: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub depreciation: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub depreciation_and_amortization: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub income_before_tax: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub income_tax_expense: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub interest_and_debt_expense: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub net_income_from_continuing_operations: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub comprehensive_income_net_of_tax: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ebit: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ebitda: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub net_income: Option<f64>,

    /// Columns the provider sends that are not coerced (reportTime, reportedCurrency, ...).
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticleRecord {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    /// `YYYY-MM-DD` prefix of the article's publish timestamp.
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Headline")]
    pub headline: Option<String>,
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "Source")]
    pub source: Option<String>,
    #[serde(rename = "Sentiment_Score")]
    pub sentiment_score: f64,
    #[serde(rename = "Summary")]
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPriceRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockProfileRecord {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Current_Price")]
    pub current_price: f64,
    #[serde(rename = "PE_Ratio")]
    pub pe_ratio: Option<f64>,
    #[serde(rename = "Dividend_Yield")]
    pub dividend_yield: f64,
    #[serde(rename = "Market_Cap")]
    pub market_cap: Option<i64>,
    #[serde(rename = "Sector")]
    pub sector: String,
    #[serde(rename = "Beta")]
    pub beta: Option<f64>,
    #[serde(rename = "Volatility")]
    pub volatility: Option<f64>,
    #[serde(rename = "Price_Change_1Y")]
    pub price_change_1y: f64,
    #[serde(rename = "Risk_Level")]
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsEmbeddingRecord {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Headline")]
    pub headline: Option<String>,
    #[serde(rename = "Embedding")]
    pub embedding: Vec<f32>,
}

/// One OHLCV bar as reported by the market data provider.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Descriptive ticker metadata used for the risk profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickerInfo {
    pub trailing_pe: Option<f64>,
    /// Percent, e.g. `0.45` for a 0.45% yield.
    pub dividend_yield: Option<f64>,
    pub market_cap: Option<i64>,
    pub sector: Option<String>,
    pub beta: Option<f64>,
}
