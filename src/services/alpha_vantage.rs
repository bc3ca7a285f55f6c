// src/services/alpha_vantage.rs
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde_json::Value;

use super::fetch::FetchError;
use crate::models::RawRecord;

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";

/// Keys Alpha Vantage uses to report throttling or bad requests with a 200 status.
const SOFT_ERROR_KEYS: [&str; 3] = ["Note", "Information", "Error Message"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Earnings,
    IncomeStatement,
}

impl StatementKind {
    pub fn function(self) -> &'static str {
        match self {
            StatementKind::Earnings => "EARNINGS",
            StatementKind::IncomeStatement => "INCOME_STATEMENT",
        }
    }

    /// Field of the response holding the per-quarter array.
    pub fn quarterly_key(self) -> &'static str {
        match self {
            StatementKind::Earnings => "quarterlyEarnings",
            StatementKind::IncomeStatement => "quarterlyReports",
        }
    }
}

#[async_trait]
pub trait FundamentalsSource: Send + Sync {
    /// Quarterly records of one category for a symbol, each tagged with `symbol`.
    async fn quarterly(&self, symbol: &str, kind: StatementKind) -> Result<Vec<RawRecord>, FetchError>;
}

pub struct AlphaVantageClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl AlphaVantageClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        AlphaVantageClient {
            client: Client::new(),
            api_key,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl FundamentalsSource for AlphaVantageClient {
    async fn quarterly(&self, symbol: &str, kind: StatementKind) -> Result<Vec<RawRecord>, FetchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(FetchError::NotConfigured("ALPHA_VANTAGE_API_KEY"))?;

        info!("Fetching {} for {} from Alpha Vantage", kind.function(), symbol);
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("function", kind.function()), ("symbol", symbol), ("apikey", api_key)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                provider: "Alpha Vantage",
                symbol: symbol.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value = response.json().await?;
        Ok(parse_quarterly(symbol, kind, &body))
    }
}

/// Pull the quarterly array out of a response body and tag every entry with the symbol.
pub fn parse_quarterly(symbol: &str, kind: StatementKind, body: &Value) -> Vec<RawRecord> {
    for key in SOFT_ERROR_KEYS {
        if let Some(note) = body.get(key).and_then(Value::as_str) {
            warn!("Alpha Vantage {} for {}: {}", kind.function(), symbol, note);
        }
    }

    body.get(kind.quarterly_key())
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_object)
                .map(|entry| {
                    let mut record = entry.clone();
                    record.insert("symbol".to_string(), Value::String(symbol.to_string()));
                    record
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_earnings_tags_symbol() {
        let body = json!({
            "symbol": "AAPL",
            "annualEarnings": [{"fiscalDateEnding": "2023-12-31", "reportedEPS": "6.42"}],
            "quarterlyEarnings": [
                {"fiscalDateEnding": "2024-03-31", "reportedDate": "2024-05-02", "reportedEPS": "1.53"},
                {"fiscalDateEnding": "2023-12-31", "reportedDate": "2024-02-01", "reportedEPS": "2.18"}
            ]
        });

        let records = parse_quarterly("AAPL", StatementKind::Earnings, &body);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r["symbol"] == "AAPL"));
        assert_eq!(records[0]["reportedEPS"], "1.53");
    }

    #[test]
    fn test_parse_income_statement_uses_quarterly_reports() {
        let body = json!({
            "quarterlyReports": [{"fiscalDateEnding": "2024-03-31", "totalRevenue": "90753000000"}]
        });
        let records = parse_quarterly("MSFT", StatementKind::IncomeStatement, &body);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["totalRevenue"], "90753000000");
        assert_eq!(records[0]["symbol"], "MSFT");
    }

    #[test]
    fn test_rate_limit_note_yields_no_records() {
        let body = json!({"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."});
        assert!(parse_quarterly("GOOGL", StatementKind::Earnings, &body).is_empty());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_reported() {
        let client = AlphaVantageClient::new(None);
        let result = client.quarterly("AAPL", StatementKind::Earnings).await;
        assert!(matches!(result, Err(FetchError::NotConfigured("ALPHA_VANTAGE_API_KEY"))));
    }
}
