// src/services/news_api.rs
use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde::Deserialize;

use super::fetch::FetchError;

const DEFAULT_BASE_URL: &str = "https://newsapi.org/v2/everything";
const USER_AGENT: &str = "greenbull-pipelines/0.1";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArticleSource {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// An article as returned by the news search API, tagged with the ticker it was searched for.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsApiArticle {
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub source: ArticleSource,
    pub author: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub published_at: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn articles(&self, ticker: &str) -> Result<Vec<NewsApiArticle>, FetchError>;
}

pub struct NewsApiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl NewsApiClient {
    pub fn new(api_key: Option<String>) -> Result<Self, FetchError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: impl Into<String>) -> Result<Self, FetchError> {
        // NewsAPI rejects requests without a user agent
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(NewsApiClient {
            client,
            api_key,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl NewsSource for NewsApiClient {
    async fn articles(&self, ticker: &str) -> Result<Vec<NewsApiArticle>, FetchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(FetchError::NotConfigured("NEWS_API_KEY"))?;

        info!("Fetching news for {}", ticker);
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", ticker),
                ("apiKey", api_key),
                ("sortBy", "publishedAt"),
                ("language", "en"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                provider: "NewsAPI",
                symbol: ticker.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.text().await?;
        parse_articles(ticker, &body)
    }
}

pub fn parse_articles(ticker: &str, body: &str) -> Result<Vec<NewsApiArticle>, FetchError> {
    let parsed: EverythingResponse = serde_json::from_str(body)?;
    Ok(parsed
        .articles
        .into_iter()
        .map(|mut article| {
            article.ticker = ticker.to_string();
            article
        })
        .collect())
}
