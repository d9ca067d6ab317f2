//! RSS ingestion.
//!
//! Polls the configured Korean finance feeds, normalizes each item, skips
//! stories already stored under the same dedup key, writes the rule score,
//! and hands freshly saved articles to the enrichment pipeline. One failing
//! source never aborts the others.

pub mod normalizer;
pub mod rule_scorer;
pub mod ticker;

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use rss::Channel;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::config::{IngestConfig, RssSourceConfig};
use crate::repositories::{EmbeddingRepository, NewNews, NewsRepository, ScoreRepository};
use rule_scorer::RuleScorer;

/// Event emitted for every article that was actually saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewsSaved {
    pub news_id: i64,
}

/// Per-source collection failure. Counted in the run result, never
/// propagated.
#[derive(Debug, Error)]
#[error("source {source_name} failed: {message}")]
pub struct RssCollectionError {
    pub source_name: String,
    pub message: String,
}

/// Totals for one collection run across all sources.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IngestResult {
    pub items_fetched: usize,
    pub items_processed: usize,
    pub items_saved: usize,
    pub items_skipped: usize,
    pub errors: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Pulls feeds and persists new articles.
pub struct RssIngestor {
    config: IngestConfig,
    news: NewsRepository,
    scores: ScoreRepository,
    embeddings: EmbeddingRepository,
    scorer: RuleScorer,
    http: reqwest::Client,
    events: mpsc::Sender<NewsSaved>,
}

impl RssIngestor {
    pub fn new(
        config: IngestConfig,
        db: Arc<DatabaseConnection>,
        events: mpsc::Sender<NewsSaved>,
    ) -> Self {
        Self {
            config,
            news: NewsRepository::new(Arc::clone(&db)),
            scores: ScoreRepository::new(Arc::clone(&db)),
            embeddings: EmbeddingRepository::new(db),
            scorer: RuleScorer::new(),
            http: reqwest::Client::new(),
            events,
        }
    }

    /// Collect every configured source once.
    pub async fn collect_all(&self) -> IngestResult {
        let start_time = Utc::now();
        let mut result = IngestResult {
            items_fetched: 0,
            items_processed: 0,
            items_saved: 0,
            items_skipped: 0,
            errors: Vec::new(),
            start_time,
            end_time: start_time,
        };

        for source in &self.config.sources {
            if let Err(err) = self.collect_source(source, &mut result).await {
                warn!(source = %err.source_name, error = %err.message, "RSS source collection failed");
                counter!("ingest_source_errors_total", "source" => err.source_name.clone()).increment(1);
                result.errors.push(err.to_string());
            }
        }

        result.end_time = Utc::now();
        counter!("ingest_items_saved_total").increment(result.items_saved as u64);
        counter!("ingest_items_skipped_total").increment(result.items_skipped as u64);

        info!(
            fetched = result.items_fetched,
            saved = result.items_saved,
            skipped = result.items_skipped,
            errors = result.errors.len(),
            "RSS collection run completed"
        );

        result
    }

    async fn collect_source(
        &self,
        source: &RssSourceConfig,
        result: &mut IngestResult,
    ) -> Result<(), RssCollectionError> {
        let response = self
            .http
            .get(&source.url)
            .timeout(Duration::from_secs(source.timeout_seconds))
            .send()
            .await
            .map_err(|err| RssCollectionError {
                source_name: source.name.clone(),
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(RssCollectionError {
                source_name: source.name.clone(),
                message: format!("feed returned {}", response.status()),
            });
        }

        let body = response.bytes().await.map_err(|err| RssCollectionError {
            source_name: source.name.clone(),
            message: err.to_string(),
        })?;

        let channel = Channel::read_from(Cursor::new(body.as_ref())).map_err(|err| {
            RssCollectionError {
                source_name: source.name.clone(),
                message: format!("feed parse failed: {}", err),
            }
        })?;

        for item in channel.items() {
            result.items_fetched += 1;

            let Some(title) = item.title().map(normalizer::clean).filter(|t| !t.is_empty())
            else {
                continue;
            };
            result.items_processed += 1;

            let published_at = item
                .pub_date()
                .and_then(|raw| DateTime::parse_from_rfc2822(raw).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);

            let body = normalizer::extract_best_content(
                item.description(),
                item.content(),
            );

            let dedup_key = normalizer::dedup_key(&title, &source.name, published_at);

            let saved = self
                .news
                .insert_if_new(NewNews {
                    source: source.name.clone(),
                    url: item.link().unwrap_or_default().to_string(),
                    published_at,
                    title: title.clone(),
                    body: body.clone(),
                    lang: "ko".to_string(),
                    dedup_key,
                })
                .await
                .map_err(|err| RssCollectionError {
                    source_name: source.name.clone(),
                    message: err.to_string(),
                })?;

            let Some(saved) = saved else {
                result.items_skipped += 1;
                continue;
            };

            let score =
                self.scorer
                    .score(&title, &body, source.weight, published_at, Utc::now());
            self.scores
                .upsert_rule(saved.id, &score)
                .await
                .map_err(|err| RssCollectionError {
                    source_name: source.name.clone(),
                    message: err.to_string(),
                })?;

            result.items_saved += 1;

            // Enrichment is asynchronous; a full queue lands the article in
            // the embedding backlog instead of blocking ingestion.
            if self.events.try_send(NewsSaved { news_id: saved.id }).is_err() {
                if let Err(err) = self
                    .embeddings
                    .backlog_push(saved.id, "enrichment queue full")
                    .await
                {
                    warn!(news_id = saved.id, error = %err, "failed to queue embedding backlog");
                }
            }
        }

        Ok(())
    }
}
