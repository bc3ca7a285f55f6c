// src/test_support.rs
//! In-memory stand-ins for the warehouse and the upstream providers.
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::jobs::JobContext;
use crate::models::{DailyBar, RawRecord, TickerInfo};
use crate::services::alpha_vantage::{FundamentalsSource, StatementKind};
use crate::services::bigquery::{Row, RowInsertError, Statement, TableId, Warehouse, WarehouseError};
use crate::services::embeddings::{EmbedError, Embedder};
use crate::services::fetch::FetchError;
use crate::services::news_api::{NewsApiArticle, NewsSource};
use crate::services::risk::RiskClassifier;
use crate::services::sentiment::SentimentScorer;
use crate::services::yahoo::{HistoryRange, MarketDataSource};

pub fn config(pairs: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub fn object(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

fn rate_limited(provider: &'static str, symbol: &str) -> FetchError {
    FetchError::Status {
        provider,
        symbol: symbol.to_string(),
        status: 429,
        body: "rate limited".to_string(),
    }
}

type Responder = Box<dyn Fn(&Statement, &HashMap<TableId, Vec<Value>>) -> Vec<Row> + Send + Sync>;

/// Records every write and answers queries through a responder that can see what was written.
pub struct FakeWarehouse {
    pub tables: Mutex<HashMap<TableId, Vec<Value>>>,
    pub statements: Mutex<Vec<Statement>>,
    pub inserts: Mutex<Vec<(TableId, Vec<Value>)>>,
    pub loads: Mutex<Vec<(TableId, Vec<Value>)>>,
    pub insert_errors: Mutex<Vec<RowInsertError>>,
    /// Load jobs finish with this error instead of writing.
    pub load_failure: Mutex<Option<String>>,
    /// Queries binding this string value fail with HTTP 400.
    pub failing_param: Mutex<Option<String>>,
    responder: Responder,
}

impl FakeWarehouse {
    pub fn new() -> Self {
        Self::with_responder(|_, _| Vec::new())
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&Statement, &HashMap<TableId, Vec<Value>>) -> Vec<Row> + Send + Sync + 'static,
    {
        FakeWarehouse {
            tables: Mutex::new(HashMap::new()),
            statements: Mutex::new(Vec::new()),
            inserts: Mutex::new(Vec::new()),
            loads: Mutex::new(Vec::new()),
            insert_errors: Mutex::new(Vec::new()),
            load_failure: Mutex::new(None),
            failing_param: Mutex::new(None),
            responder: Box::new(responder),
        }
    }

    pub fn fail_loads(&self, message: &str) {
        *self.load_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_queries_binding(&self, value: &str) {
        *self.failing_param.lock().unwrap() = Some(value.to_string());
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().unwrap().clone()
    }

    pub fn rows_in(&self, table: &TableId) -> Vec<Value> {
        self.tables.lock().unwrap().get(table).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn insert_rows(&self, table: &TableId, rows: &[Value]) -> Result<Vec<RowInsertError>, WarehouseError> {
        self.inserts.lock().unwrap().push((table.clone(), rows.to_vec()));
        let errors = self.insert_errors.lock().unwrap().clone();
        let rejected: HashSet<usize> = errors.iter().map(|e| e.index).collect();
        let accepted = rows
            .iter()
            .enumerate()
            .filter(|(i, _)| !rejected.contains(i))
            .map(|(_, row)| row.clone());
        self.tables.lock().unwrap().entry(table.clone()).or_default().extend(accepted);
        Ok(errors)
    }

    async fn load_rows(&self, table: &TableId, rows: &[Value]) -> Result<u64, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }
        if let Some(message) = self.load_failure.lock().unwrap().clone() {
            return Err(WarehouseError::JobFailed {
                job_id: "job_fake".to_string(),
                message,
            });
        }
        self.loads.lock().unwrap().push((table.clone(), rows.to_vec()));
        self.tables
            .lock()
            .unwrap()
            .entry(table.clone())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, WarehouseError> {
        self.statements.lock().unwrap().push(statement.clone());
        if let Some(value) = self.failing_param.lock().unwrap().as_deref() {
            if statement.params.iter().any(|p| p.value.as_str() == Some(value)) {
                return Err(WarehouseError::Status {
                    status: 400,
                    body: format!("query failed for {}", value),
                });
            }
        }
        let tables = self.tables.lock().unwrap();
        Ok((self.responder)(statement, &tables))
    }
}

#[derive(Default)]
pub struct FakeFundamentals {
    pub records: HashMap<(String, StatementKind), Vec<RawRecord>>,
    pub failing: HashSet<String>,
    pub calls: Mutex<Vec<(String, StatementKind)>>,
}

#[async_trait]
impl FundamentalsSource for FakeFundamentals {
    async fn quarterly(&self, symbol: &str, kind: StatementKind) -> Result<Vec<RawRecord>, FetchError> {
        self.calls.lock().unwrap().push((symbol.to_string(), kind));
        if self.failing.contains(symbol) {
            return Err(rate_limited("Alpha Vantage", symbol));
        }
        Ok(self.records.get(&(symbol.to_string(), kind)).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeNews {
    pub articles: HashMap<String, Vec<NewsApiArticle>>,
    pub failing: HashSet<String>,
}

#[async_trait]
impl NewsSource for FakeNews {
    async fn articles(&self, ticker: &str) -> Result<Vec<NewsApiArticle>, FetchError> {
        if self.failing.contains(ticker) {
            return Err(rate_limited("NewsAPI", ticker));
        }
        Ok(self.articles.get(ticker).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeMarket {
    pub bars: HashMap<(String, HistoryRange), Vec<DailyBar>>,
    pub info: HashMap<String, TickerInfo>,
    pub failing: HashSet<String>,
}

impl FakeMarket {
    pub fn with_bars(mut self, symbol: &str, range: HistoryRange, bars: Vec<DailyBar>) -> Self {
        self.bars.insert((symbol.to_string(), range), bars);
        self
    }

    pub fn with_info(mut self, symbol: &str, info: TickerInfo) -> Self {
        self.info.insert(symbol.to_string(), info);
        self
    }
}

#[async_trait]
impl MarketDataSource for FakeMarket {
    async fn daily_bars(&self, symbol: &str, range: HistoryRange) -> Result<Vec<DailyBar>, FetchError> {
        if self.failing.contains(symbol) {
            return Err(rate_limited("Yahoo Finance", symbol));
        }
        Ok(self.bars.get(&(symbol.to_string(), range)).cloned().unwrap_or_default())
    }

    async fn ticker_info(&self, symbol: &str) -> Result<TickerInfo, FetchError> {
        if self.failing.contains(symbol) {
            return Err(rate_limited("Yahoo Finance", symbol));
        }
        Ok(self.info.get(symbol).cloned().unwrap_or_default())
    }
}

/// A bar stamped at `hour` UTC on the given day.
pub fn bar(year: i32, month: u32, day: u32, hour: u32, close: f64) -> DailyBar {
    DailyBar {
        timestamp: Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap(),
        open: close - 1.0,
        high: close + 2.0,
        low: close - 2.0,
        close,
        volume: 1_000_000,
    }
}

/// Returns a fixed score and remembers what it was asked to score.
pub struct RecordingScorer {
    pub score: f64,
    pub texts: Mutex<Vec<String>>,
}

impl RecordingScorer {
    pub fn new(score: f64) -> Self {
        RecordingScorer {
            score,
            texts: Mutex::new(Vec::new()),
        }
    }
}

impl SentimentScorer for RecordingScorer {
    fn compound(&self, text: &str) -> f64 {
        self.texts.lock().unwrap().push(text.to_string());
        self.score
    }
}

/// Four-dimensional vectors derived from text length.
#[derive(Default)]
pub struct FakeEmbedder {
    pub batches: Mutex<Vec<Vec<String>>>,
}

impl Embedder for FakeEmbedder {
    fn dimension(&self) -> usize {
        4
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.batches.lock().unwrap().push(texts.to_vec());
        Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0, 0.0, 1.0]).collect())
    }
}

pub struct TestDeps {
    pub warehouse: Arc<FakeWarehouse>,
    pub fundamentals: Arc<FakeFundamentals>,
    pub news: Arc<FakeNews>,
    pub market: Arc<FakeMarket>,
    pub scorer: Arc<RecordingScorer>,
    pub embedder: Option<Arc<FakeEmbedder>>,
}

impl Default for TestDeps {
    fn default() -> Self {
        TestDeps {
            warehouse: Arc::new(FakeWarehouse::new()),
            fundamentals: Arc::new(FakeFundamentals::default()),
            news: Arc::new(FakeNews::default()),
            market: Arc::new(FakeMarket::default()),
            scorer: Arc::new(RecordingScorer::new(0.5)),
            embedder: Some(Arc::new(FakeEmbedder::default())),
        }
    }
}

impl TestDeps {
    pub fn context(&self, config: Config) -> JobContext {
        JobContext {
            config,
            warehouse: self.warehouse.clone(),
            fundamentals: self.fundamentals.clone(),
            news: self.news.clone(),
            market: self.market.clone(),
            sentiment: self.scorer.clone(),
            embedder: self.embedder.clone().map(|e| e as Arc<dyn Embedder>),
            risk: RiskClassifier::default(),
        }
    }
}
