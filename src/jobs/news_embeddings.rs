// src/jobs/news_embeddings.rs
use log::info;
use std::collections::HashSet;

use super::{JobContext, JobError, JobOutcome};
use crate::models::NewsEmbeddingRecord;
use crate::services::bigquery::{to_rows, Row, Statement};
use crate::services::embeddings::{embedding_text, EmbedError};

/// A news row still waiting for its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingArticle {
    pub ticker: String,
    pub date: String,
    pub headline: Option<String>,
    pub content: String,
}

fn text(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(|v| v.as_str()).map(str::to_string)
}

/// Source rows whose (Headline, Date) is not yet in the destination. A null headline never
/// matches, so such rows always qualify.
pub fn pending_articles(source: &[Row], existing: &[Row]) -> Vec<PendingArticle> {
    let embedded: HashSet<(String, String)> = existing
        .iter()
        .filter_map(|row| Some((text(row, "Headline")?, text(row, "Date")?)))
        .collect();

    source
        .iter()
        .filter_map(|row| {
            let content = text(row, "Content").filter(|c| !c.is_empty())?;
            let article = PendingArticle {
                ticker: text(row, "Ticker").unwrap_or_default(),
                date: text(row, "Date").unwrap_or_default(),
                headline: text(row, "Headline"),
                content,
            };
            let seen = article
                .headline
                .as_ref()
                .is_some_and(|h| embedded.contains(&(h.clone(), article.date.clone())));
            (!seen).then_some(article)
        })
        .collect()
}

/// Embed news articles that have no embedding yet and bulk-load the vectors.
pub async fn run(ctx: &JobContext) -> Result<JobOutcome, JobError> {
    let source_table = ctx.config.news_source_table()?;
    let destination = ctx.config.news_embeddings_table()?;

    let source = ctx
        .warehouse
        .query(&Statement::new(format!(
            "SELECT Ticker, Date, Headline, Content FROM {} WHERE Content IS NOT NULL AND Content != ''",
            source_table.sql()
        )))
        .await?;
    let existing = ctx
        .warehouse
        .query(&Statement::new(format!(
            "SELECT DISTINCT Headline, Date FROM {}",
            destination.sql()
        )))
        .await?;

    let pending = pending_articles(&source, &existing);
    if pending.is_empty() {
        return Ok(JobOutcome::success("No articles found for embeddings."));
    }
    info!("{} of {} articles need embeddings", pending.len(), source.len());

    let embedder = ctx.embedder.as_ref().ok_or(JobError::EmbedderUnavailable)?;
    let texts: Vec<String> = pending
        .iter()
        .map(|a| embedding_text(a.headline.as_deref().unwrap_or_default(), &a.content))
        .collect();
    let vectors = embedder.embed_batch(&texts)?;
    if vectors.len() != pending.len() {
        return Err(EmbedError::Embed(format!("expected {} vectors, got {}", pending.len(), vectors.len())).into());
    }

    let records: Vec<NewsEmbeddingRecord> = pending
        .into_iter()
        .zip(vectors)
        .map(|(article, embedding)| NewsEmbeddingRecord {
            ticker: article.ticker,
            date: article.date,
            headline: article.headline,
            embedding,
        })
        .collect();

    info!("Loading table from {} embedding rows.", records.len());
    ctx.warehouse.load_rows(&destination, &to_rows(&records)?).await?;

    Ok(JobOutcome::success(format!(
        "Successfully generated free embeddings for {} articles.",
        records.len()
    )))
}
