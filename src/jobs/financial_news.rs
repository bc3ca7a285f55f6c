// src/jobs/financial_news.rs
use log::{error, info};

use super::{JobContext, JobError, JobOutcome};
use crate::models::NewsArticleRecord;
use crate::services::bigquery::to_rows;
use crate::services::fetch::fetch_each;
use crate::services::news_api::NewsApiArticle;
use crate::services::sentiment::SentimentScorer;

fn non_empty(text: &Option<String>) -> Option<&str> {
    text.as_deref().filter(|t| !t.is_empty())
}

/// Body text used for sentiment: content, else description, else nothing.
pub fn article_body(article: &NewsApiArticle) -> String {
    non_empty(&article.content)
        .or_else(|| non_empty(&article.description))
        .unwrap_or_default()
        .to_string()
}

pub fn to_record(article: NewsApiArticle, scorer: &dyn SentimentScorer) -> NewsArticleRecord {
    let content = article_body(&article);
    let date = article
        .published_at
        .as_deref()
        .map(|ts| ts.get(..10).unwrap_or(ts).to_string())
        .unwrap_or_default();

    NewsArticleRecord {
        sentiment_score: scorer.compound(&content),
        ticker: article.ticker,
        date,
        headline: article.title,
        content,
        source: article.source.name,
        summary: String::new(),
    }
}

/// Latest articles per ticker with a sentiment score, streamed into the news table.
pub async fn run(ctx: &JobContext) -> Result<JobOutcome, JobError> {
    let table = ctx.config.financial_news_table()?;

    let articles = fetch_each(&ctx.config.news_tickers, ctx.config.news_policy, |ticker| async move {
        ctx.news.articles(&ticker).await
    })
    .await?;

    let records: Vec<NewsArticleRecord> = articles
        .into_iter()
        .map(|article| to_record(article, ctx.sentiment.as_ref()))
        .collect();

    let errors = ctx.warehouse.insert_rows(&table, &to_rows(&records)?).await?;
    if errors.is_empty() {
        info!("Rows inserted successfully.");
    } else {
        error!("Errors occurred while inserting rows: {:?}", errors);
    }

    Ok(JobOutcome::success(format!("Inserted {} rows into {}", records.len(), table)))
}
