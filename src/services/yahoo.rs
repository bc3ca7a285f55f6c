// src/services/yahoo.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use reqwest::Client;
use serde_json::Value;
use tokio::sync::Mutex;

use super::fetch::FetchError;
use crate::models::{DailyBar, TickerInfo};

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryRange {
    OneDay,
    OneYear,
}

impl HistoryRange {
    pub fn as_param(self) -> &'static str {
        match self {
            HistoryRange::OneDay => "1d",
            HistoryRange::OneYear => "1y",
        }
    }
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Daily bars for the range, oldest first.
    async fn daily_bars(&self, symbol: &str, range: HistoryRange) -> Result<Vec<DailyBar>, FetchError>;
    async fn ticker_info(&self, symbol: &str) -> Result<TickerInfo, FetchError>;
}

pub struct YahooClient {
    client: Client,
    base_url: String,
    crumb: Mutex<Option<String>>,
}

impl YahooClient {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;
        Ok(YahooClient {
            client,
            base_url: base_url.into(),
            crumb: Mutex::new(None),
        })
    }

    async fn get_json(&self, symbol: &str, url: &str, query: &[(&str, &str)]) -> Result<Value, FetchError> {
        debug!("GET {} {:?}", url, query);
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                provider: "Yahoo Finance",
                symbol: symbol.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    /// The quoteSummary endpoint wants a crumb tied to the session cookie.
    async fn crumb(&self, symbol: &str) -> Result<String, FetchError> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        // Only the cookies matter here; this endpoint answers 404 by design
        let _ = self.client.get(COOKIE_URL).send().await;

        let response = self
            .client
            .get(format!("{}/v1/test/getcrumb", self.base_url))
            .send()
            .await?;
        let status = response.status();
        let crumb = response.text().await?;
        if !status.is_success() || crumb.trim().is_empty() {
            return Err(FetchError::Status {
                provider: "Yahoo Finance",
                symbol: symbol.to_string(),
                status: status.as_u16(),
                body: format!("could not obtain crumb: {}", crumb),
            });
        }

        let crumb = crumb.trim().to_string();
        *cached = Some(crumb.clone());
        Ok(crumb)
    }
}

#[async_trait]
impl MarketDataSource for YahooClient {
    async fn daily_bars(&self, symbol: &str, range: HistoryRange) -> Result<Vec<DailyBar>, FetchError> {
        info!("Fetching {} of daily bars for {}", range.as_param(), symbol);
        let url = format!("{}/v8/finance/chart/{}", self.base_url, yahoo_symbol(symbol));
        let body = self
            .get_json(symbol, &url, &[("range", range.as_param()), ("interval", "1d")])
            .await?;
        parse_chart(symbol, &body)
    }

    async fn ticker_info(&self, symbol: &str) -> Result<TickerInfo, FetchError> {
        info!("Fetching ticker metadata for {}", symbol);
        let crumb = self.crumb(symbol).await?;
        let url = format!("{}/v10/finance/quoteSummary/{}", self.base_url, yahoo_symbol(symbol));
        let body = self
            .get_json(
                symbol,
                &url,
                &[
                    ("modules", "summaryDetail,assetProfile,defaultKeyStatistics"),
                    ("crumb", crumb.as_str()),
                ],
            )
            .await?;
        parse_quote_summary(symbol, &body)
    }
}

/// Yahoo spells share classes with a dash (BRK-B rather than BRK.B).
pub fn yahoo_symbol(symbol: &str) -> String {
    symbol.replace('.', "-")
}

fn first_result<'a>(symbol: &str, body: &'a Value, root: &str) -> Result<&'a Value, FetchError> {
    let node = &body[root];
    if let Some(error) = node.get("error").filter(|e| !e.is_null()) {
        let reason = error["description"].as_str().unwrap_or("unknown error").to_string();
        return Err(FetchError::missing(symbol, reason));
    }
    node["result"]
        .as_array()
        .and_then(|results| results.first())
        .ok_or_else(|| FetchError::missing(symbol, format!("empty {} result", root)))
}

/// Decode a v8 chart response. Bars with a missing price are dropped.
pub fn parse_chart(symbol: &str, body: &Value) -> Result<Vec<DailyBar>, FetchError> {
    let result = first_result(symbol, body, "chart")?;

    let timestamps = match result["timestamp"].as_array() {
        Some(timestamps) => timestamps,
        // No trading in the range
        None => return Ok(Vec::new()),
    };
    let quote = &result["indicators"]["quote"][0];
    let column = |name: &str, i: usize| quote[name].get(i).and_then(Value::as_f64);

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let timestamp = match ts.as_i64().and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)) {
            Some(timestamp) => timestamp,
            None => continue,
        };
        let (open, high, low, close) = match (
            column("open", i),
            column("high", i),
            column("low", i),
            column("close", i),
        ) {
            (Some(open), Some(high), Some(low), Some(close)) => (open, high, low, close),
            _ => continue,
        };
        let volume = quote["volume"].get(i).and_then(Value::as_u64).unwrap_or(0);

        bars.push(DailyBar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
    }
    Ok(bars)
}

/// Decode a quoteSummary response into ticker metadata.
pub fn parse_quote_summary(symbol: &str, body: &Value) -> Result<TickerInfo, FetchError> {
    let result = first_result(symbol, body, "quoteSummary")?;
    let raw = |module: &str, field: &str| result[module][field]["raw"].as_f64();

    let beta = raw("summaryDetail", "beta").or_else(|| raw("defaultKeyStatistics", "beta"));

    Ok(TickerInfo {
        trailing_pe: raw("summaryDetail", "trailingPE"),
        // Reported as a fraction; the risk rules work in percent
        dividend_yield: raw("summaryDetail", "dividendYield").map(|y| y * 100.0),
        market_cap: raw("summaryDetail", "marketCap").map(|cap| cap.round() as i64),
        sector: result["assetProfile"]["sector"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        beta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_chart_drops_incomplete_bars() {
        let body = json!({
            "chart": {
                "result": [{
                    "meta": {"symbol": "AAPL", "exchangeTimezoneName": "America/New_York"},
                    "timestamp": [1714656600, 1714743000, 1714829400],
                    "indicators": {"quote": [{
                        "open":   [172.51, null, 186.65],
                        "high":   [173.42, 187.0, 187.0],
                        "low":    [170.89, 182.66, 182.66],
                        "close":  [173.03, 183.38, 183.38],
                        "volume": [94214900, 163224100, null]
                    }]}
                }],
                "error": null
            }
        });

        let bars = parse_chart("AAPL", &body).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 173.03);
        assert_eq!(bars[0].volume, 94214900);
        assert_eq!(bars[1].open, 186.65);
        assert_eq!(bars[1].volume, 0);
    }

    #[test]
    fn test_parse_chart_without_timestamps_is_empty() {
        let body = json!({"chart": {"result": [{"meta": {}, "indicators": {"quote": [{}]}}], "error": null}});
        assert!(parse_chart("AAPL", &body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_chart_reports_provider_error() {
        let body = json!({"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}});
        let err = parse_chart("XXXX", &body).unwrap_err();
        assert!(err.to_string().contains("delisted"));
    }

    #[test]
    fn test_parse_quote_summary() {
        let body = json!({
            "quoteSummary": {
                "result": [{
                    "summaryDetail": {
                        "trailingPE": {"raw": 28.6, "fmt": "28.60"},
                        "dividendYield": {"raw": 0.0044, "fmt": "0.44%"},
                        "marketCap": {"raw": 2870000000000.0, "fmt": "2.87T"},
                        "beta": {"raw": 1.26, "fmt": "1.26"}
                    },
                    "assetProfile": {"sector": "Technology"},
                    "defaultKeyStatistics": {}
                }],
                "error": null
            }
        });

        let info = parse_quote_summary("AAPL", &body).unwrap();
        assert_eq!(info.trailing_pe, Some(28.6));
        assert!((info.dividend_yield.unwrap() - 0.44).abs() < 1e-9);
        assert_eq!(info.market_cap, Some(2_870_000_000_000));
        assert_eq!(info.sector.as_deref(), Some("Technology"));
        assert_eq!(info.beta, Some(1.26));
    }

    #[test]
    fn test_missing_metadata_stays_missing() {
        let body = json!({"quoteSummary": {"result": [{"summaryDetail": {}}], "error": null}});
        let info = parse_quote_summary("TSLA", &body).unwrap();
        assert_eq!(info, TickerInfo::default());
    }

    #[test]
    fn test_share_class_symbols() {
        assert_eq!(yahoo_symbol("BRK.B"), "BRK-B");
        assert_eq!(yahoo_symbol("AAPL"), "AAPL");
    }
}
