// src/jobs/mod.rs
use log::{error, info, warn};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::services::alpha_vantage::{AlphaVantageClient, FundamentalsSource};
use crate::services::bigquery::{BigQueryClient, Warehouse, WarehouseError};
use crate::services::embeddings::{EmbedError, Embedder};
use crate::services::fetch::FetchError;
use crate::services::google_oauth::{TokenProvider, TokenSource};
use crate::services::news_api::{NewsApiClient, NewsSource};
use crate::services::risk::RiskClassifier;
use crate::services::sentiment::{SentimentScorer, VaderScorer};
use crate::services::yahoo::{MarketDataSource, YahooClient};

pub mod earnings_report;
pub mod financial_news;
pub mod news_embeddings;
pub mod stock_prices;
pub mod stock_profiles;

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to encode rows: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("no embedding model is loaded (build with the `local-embeddings` feature)")]
    EmbedderUnavailable,
}

/// What a finished job reports back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub message: String,
    /// Some rows were rejected by the warehouse; the rest were written.
    pub partial_failure: bool,
}

impl JobOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        JobOutcome {
            message: message.into(),
            partial_failure: false,
        }
    }

    pub fn partial_failure(message: impl Into<String>) -> Self {
        JobOutcome {
            message: message.into(),
            partial_failure: true,
        }
    }
}

/// Everything a job talks to, constructed once and handed in.
pub struct JobContext {
    pub config: Config,
    pub warehouse: Arc<dyn Warehouse>,
    pub fundamentals: Arc<dyn FundamentalsSource>,
    pub news: Arc<dyn NewsSource>,
    pub market: Arc<dyn MarketDataSource>,
    pub sentiment: Arc<dyn SentimentScorer>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub risk: RiskClassifier,
}

#[cfg(feature = "local-embeddings")]
fn load_embedder() -> Option<Arc<dyn Embedder>> {
    match crate::services::embeddings::FastEmbedder::new() {
        Ok(embedder) => {
            info!("Loaded embedding model ({} dimensions)", embedder.dimension());
            Some(Arc::new(embedder))
        }
        Err(e) => {
            error!("Embedding model unavailable: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "local-embeddings"))]
fn load_embedder() -> Option<Arc<dyn Embedder>> {
    warn!("Built without local-embeddings; the embeddings job will fail if it has work");
    None
}

impl JobContext {
    /// Wire up the production clients.
    pub fn from_config(config: Config) -> Result<Self, JobError> {
        let token_source = match &config.credentials_path {
            Some(path) => TokenSource::ServiceAccountFile(path.clone()),
            None => TokenSource::MetadataServer,
        };
        let warehouse = BigQueryClient::new(TokenProvider::new(token_source), config.project_id.clone());

        Ok(JobContext {
            warehouse: Arc::new(warehouse),
            fundamentals: Arc::new(AlphaVantageClient::new(config.alpha_vantage_api_key.clone())),
            news: Arc::new(NewsApiClient::new(config.news_api_key.clone())?),
            market: Arc::new(YahooClient::new()?),
            sentiment: Arc::new(VaderScorer::new()),
            embedder: load_embedder(),
            risk: RiskClassifier::default(),
            config,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    EarningsReport,
    FinancialNews,
    NewsEmbeddings,
    StockPrices,
    StockProfiles,
}

impl Job {
    pub const ALL: [Job; 5] = [
        Job::EarningsReport,
        Job::FinancialNews,
        Job::NewsEmbeddings,
        Job::StockPrices,
        Job::StockProfiles,
    ];

    /// Entry point name, also used as the HTTP route.
    pub fn name(self) -> &'static str {
        match self {
            Job::EarningsReport => "fetch_and_store_earnings_report",
            Job::FinancialNews => "fetch_and_store_financial_news",
            Job::NewsEmbeddings => "generate_free_embeddings",
            Job::StockPrices => "fetch_and_store_stock_data",
            Job::StockProfiles => "update_stock_data",
        }
    }

    pub async fn run(self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        info!("Starting job {}", self);
        let result = match self {
            Job::EarningsReport => earnings_report::run(ctx).await,
            Job::FinancialNews => financial_news::run(ctx).await,
            Job::NewsEmbeddings => news_embeddings::run(ctx).await,
            Job::StockPrices => stock_prices::run(ctx).await,
            Job::StockProfiles => stock_profiles::run(ctx).await,
        };

        match &result {
            Ok(outcome) if outcome.partial_failure => warn!("Job {} partially failed: {}", self, outcome.message),
            Ok(outcome) => info!("Job {} finished: {}", self, outcome.message),
            Err(e) => error!("Job {} failed: {}", self, e),
        }
        result
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Job {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches('/');
        Job::ALL
            .into_iter()
            .find(|job| job.name() == name)
            .ok_or_else(|| format!("unknown job '{}'", s))
    }
}
