// src/config.rs
use log::{info, warn};
use std::env;
use thiserror::Error;

use crate::services::bigquery::TableId;
use crate::services::fetch::FailurePolicy;
use crate::services::google_oauth::read_service_account;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATASET: &str = "stock_data";

const DEFAULT_EARNINGS_TICKERS: &[&str] = &["AAPL", "GOOGL", "MSFT"];
const DEFAULT_NEWS_TICKERS: &[&str] = &["AAPL", "GOOGL", "MSFT"];
const DEFAULT_PRICE_TICKERS: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "TSLA", "META", "BRK.B", "JNJ", "XOM", "JPM", "V", "PG", "UNH", "HD",
    "MA", "ABBV", "PFE", "AVGO", "KO",
];
const DEFAULT_PROFILE_TICKERS: &[&str] = &["AAPL", "MSFT", "NVDA", "TSLA"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub project_id: Option<String>,
    /// Service-account key file; without it tokens come from the metadata server.
    pub credentials_path: Option<String>,
    pub alpha_vantage_api_key: Option<String>,
    pub news_api_key: Option<String>,

    earnings_report_table: Option<String>,
    financial_news_table: Option<String>,
    stock_prices_table: Option<String>,
    stock_profiles_table: Option<String>,
    news_source_table: Option<String>,
    news_embeddings_table: Option<String>,

    pub earnings_tickers: Vec<String>,
    pub news_tickers: Vec<String>,
    pub price_tickers: Vec<String>,
    pub profile_tickers: Vec<String>,

    pub earnings_policy: FailurePolicy,
    pub news_policy: FailurePolicy,
    pub price_policy: FailurePolicy,
    pub profile_policy: FailurePolicy,
}

fn ticker_list(raw: Option<String>, default: &[&str]) -> Vec<String> {
    match raw {
        Some(list) => list
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        None => default.iter().map(|t| t.to_string()).collect(),
    }
}

fn policy(var: &'static str, raw: Option<String>, default: FailurePolicy) -> Result<FailurePolicy, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|reason| ConfigError::Invalid { var, reason }),
        None => Ok(default),
    }
}

impl Config {
    /// Read settings from the process environment (and `.env` when present).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::from_lookup(|key| env::var(key).ok())?;

        if config.project_id.is_none() {
            if let Some(path) = &config.credentials_path {
                match read_service_account(path) {
                    Ok(key) => {
                        info!("Using project {} from the service account file", key.project_id);
                        config.project_id = Some(key.project_id);
                    }
                    Err(e) => warn!("Could not read project id from {}: {}", path, e),
                }
            }
        }
        Ok(config)
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "PORT",
                reason: format!("'{}' is not a port number", raw),
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Config {
            port,
            project_id: get("GCP_PROJECT_ID"),
            credentials_path: get("GOOGLE_APPLICATION_CREDENTIALS"),
            alpha_vantage_api_key: get("ALPHA_VANTAGE_API_KEY"),
            news_api_key: get("NEWS_API_KEY"),

            earnings_report_table: get("EARNINGS_REPORT_TABLE_ID"),
            financial_news_table: get("FINANCIAL_NEWS_TABLE_ID"),
            stock_prices_table: get("STOCK_PRICES_TABLE_ID"),
            stock_profiles_table: get("STOCK_PROFILES_TABLE_ID"),
            news_source_table: get("NEWS_SOURCE_TABLE_ID"),
            news_embeddings_table: get("NEWS_EMBEDDINGS_TABLE_ID"),

            earnings_tickers: ticker_list(get("EARNINGS_TICKERS"), DEFAULT_EARNINGS_TICKERS),
            news_tickers: ticker_list(get("NEWS_TICKERS"), DEFAULT_NEWS_TICKERS),
            price_tickers: ticker_list(get("PRICE_TICKERS"), DEFAULT_PRICE_TICKERS),
            profile_tickers: ticker_list(get("PROFILE_TICKERS"), DEFAULT_PROFILE_TICKERS),

            earnings_policy: policy("EARNINGS_FAILURE_POLICY", get("EARNINGS_FAILURE_POLICY"), FailurePolicy::Abort)?,
            news_policy: policy("NEWS_FAILURE_POLICY", get("NEWS_FAILURE_POLICY"), FailurePolicy::Skip)?,
            price_policy: policy("PRICE_FAILURE_POLICY", get("PRICE_FAILURE_POLICY"), FailurePolicy::Abort)?,
            profile_policy: policy("PROFILE_FAILURE_POLICY", get("PROFILE_FAILURE_POLICY"), FailurePolicy::Abort)?,
        })
    }

    fn required_table(var: &'static str, raw: &Option<String>) -> Result<TableId, ConfigError> {
        let raw = raw.as_deref().ok_or(ConfigError::Missing(var))?;
        TableId::parse(raw).map_err(|e| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        })
    }

    /// An explicit table id, or `<project>.stock_data.<table>` when only the project is known.
    fn table_or_default(&self, var: &'static str, raw: &Option<String>, table: &str) -> Result<TableId, ConfigError> {
        if raw.is_some() {
            return Self::required_table(var, raw);
        }
        let project = self.project_id.as_deref().ok_or(ConfigError::Missing("GCP_PROJECT_ID"))?;
        let id = format!("{}.{}.{}", project, DEFAULT_DATASET, table);
        Self::required_table(var, &Some(id))
    }

    pub fn earnings_report_table(&self) -> Result<TableId, ConfigError> {
        Self::required_table("EARNINGS_REPORT_TABLE_ID", &self.earnings_report_table)
    }

    pub fn financial_news_table(&self) -> Result<TableId, ConfigError> {
        Self::required_table("FINANCIAL_NEWS_TABLE_ID", &self.financial_news_table)
    }

    pub fn stock_prices_table(&self) -> Result<TableId, ConfigError> {
        self.table_or_default("STOCK_PRICES_TABLE_ID", &self.stock_prices_table, "daily_stock_prices")
    }

    pub fn stock_profiles_table(&self) -> Result<TableId, ConfigError> {
        self.table_or_default("STOCK_PROFILES_TABLE_ID", &self.stock_profiles_table, "stocks")
    }

    pub fn news_source_table(&self) -> Result<TableId, ConfigError> {
        self.table_or_default("NEWS_SOURCE_TABLE_ID", &self.news_source_table, "financial_news")
    }

    pub fn news_embeddings_table(&self) -> Result<TableId, ConfigError> {
        self.table_or_default(
            "NEWS_EMBEDDINGS_TABLE_ID",
            &self.news_embeddings_table,
            "financial_news_embeddings",
        )
    }
}
