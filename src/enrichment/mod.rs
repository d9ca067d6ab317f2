//! Post-save enrichment pipeline.
//!
//! Consumes `NewsSaved` events from ingestion, asks the model service for
//! importance, summary, and embedding, and persists what it gets. Every ML
//! failure degrades to a local fallback; embedding failures land the article
//! in a persistent backlog drained while the circuit is closed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use metrics::counter;
use sea_orm::DatabaseConnection;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ml::{CircuitState, MlClient, MlError, fallback_summary};
use crate::ml::types::{ImportanceItem, SummarizeRequest};
use crate::models::ScoreReason;
use crate::repositories::{EmbeddingRepository, NewsRepository, ScoreRepository};

/// Concurrent enrichment tasks.
const WORKER_PERMITS: usize = 4;

/// Backlog entries retried per drain pass.
const BACKLOG_BATCH: u64 = 32;

/// Enriches saved articles with model outputs.
pub struct EnrichmentPipeline {
    ml: Arc<MlClient>,
    news: NewsRepository,
    scores: ScoreRepository,
    embeddings: EmbeddingRepository,
    /// Single-flight guard over news ids currently being enriched
    in_flight: Mutex<HashSet<i64>>,
}

impl EnrichmentPipeline {
    pub fn new(db: Arc<DatabaseConnection>, ml: Arc<MlClient>) -> Self {
        Self {
            ml,
            news: NewsRepository::new(Arc::clone(&db)),
            scores: ScoreRepository::new(Arc::clone(&db)),
            embeddings: EmbeddingRepository::new(db),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Consume saved-article events until shutdown. Work fans out over a
    /// bounded permit pool so a slow model call cannot pile up unbounded
    /// tasks.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<crate::ingest::NewsSaved>,
        shutdown: CancellationToken,
    ) {
        let permits = Arc::new(Semaphore::new(WORKER_PERMITS));
        info!("Enrichment pipeline started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Enrichment pipeline shutdown requested");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else { break };

                    if !self.claim(event.news_id) {
                        debug!(news_id = event.news_id, "enrichment already in flight");
                        continue;
                    }

                    let permit = match Arc::clone(&permits).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };

                    let pipeline = Arc::clone(&self);
                    tokio::spawn(async move {
                        pipeline.enrich(event.news_id).await;
                        pipeline.release(event.news_id);
                        drop(permit);
                    });
                }
            }
        }

        info!("Enrichment pipeline stopped");
    }

    fn claim(&self, news_id: i64) -> bool {
        self.in_flight.lock().expect("in-flight lock").insert(news_id)
    }

    fn release(&self, news_id: i64) {
        self.in_flight.lock().expect("in-flight lock").remove(&news_id);
    }

    /// Run the three model calls for one article, tolerating each failure
    /// independently.
    pub async fn enrich(&self, news_id: i64) {
        let item = match self.news.find_by_id(news_id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                warn!(news_id, "article vanished before enrichment");
                return;
            }
            Err(err) => {
                warn!(news_id, error = %err, "failed to load article for enrichment");
                return;
            }
        };

        let published_at = item.published_at.with_timezone(&chrono::Utc);

        let importance = self
            .ml
            .score_importance(ImportanceItem {
                id: item.id,
                title: item.title.clone(),
                body: item.body.clone(),
                source: item.source.clone(),
                published_at: published_at.to_rfc3339(),
            })
            .await;

        let tickers = self
            .scores
            .get(news_id)
            .await
            .ok()
            .flatten()
            .and_then(|score| ScoreReason::from_json(&score.reason))
            .map(|reason| reason.tickers_found)
            .unwrap_or_default();

        let summary = self
            .ml
            .summarize(SummarizeRequest {
                id: item.id,
                title: item.title.clone(),
                body: item.body.clone(),
                tickers,
                options: None,
            })
            .await;

        let (importance_p, model_version) = match importance {
            Ok((p, version)) => (Some(p), Some(version)),
            Err(err) => {
                // The rule score written at ingest time is the fallback
                log_fallback("importance", news_id, &err);
                (None, None)
            }
        };

        let summary_text = match summary {
            Ok(response) => Some(response.summary),
            Err(err) => {
                log_fallback("summary", news_id, &err);
                Some(fallback_summary(&item.body))
            }
        };

        if let Err(err) = self
            .scores
            .apply_model_outputs(news_id, importance_p, model_version, summary_text)
            .await
        {
            warn!(news_id, error = %err, "failed to persist model outputs");
        }

        let text = format!("{} {}", item.title, item.body);
        match self.ml.embed(news_id, &text).await {
            Ok(embedding) => {
                if let Err(err) = self.embeddings.upsert(news_id, &embedding).await {
                    warn!(news_id, error = %err, "failed to persist embedding");
                }
            }
            Err(err) => {
                log_fallback("embedding", news_id, &err);
                if let Err(push_err) = self.embeddings.backlog_push(news_id, &err.to_string()).await
                {
                    warn!(news_id, error = %push_err, "failed to queue embedding backlog");
                }
            }
        }
    }

    /// Retry queued embeddings while the circuit is closed. Invoked on a
    /// timer by the scheduler; a run that finds the circuit open does
    /// nothing.
    pub async fn drain_backlog(&self) {
        if self.ml.breaker().state() != CircuitState::Closed {
            debug!("skipping backlog drain; ML circuit not closed");
            return;
        }

        let batch = match self.embeddings.backlog_batch(BACKLOG_BATCH).await {
            Ok(batch) => batch,
            Err(err) => {
                warn!(error = %err, "failed to load embedding backlog");
                return;
            }
        };

        if batch.is_empty() {
            return;
        }

        info!(entries = batch.len(), "draining embedding backlog");

        for entry in batch {
            let item = match self.news.find_by_id(entry.news_id).await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    // Article was deleted; the backlog row has nothing to do
                    let _ = self.embeddings.backlog_remove(entry.id).await;
                    continue;
                }
                Err(err) => {
                    warn!(news_id = entry.news_id, error = %err, "backlog article load failed");
                    continue;
                }
            };

            let text = format!("{} {}", item.title, item.body);
            match self.ml.embed(entry.news_id, &text).await {
                Ok(embedding) => {
                    let stored = self.embeddings.upsert(entry.news_id, &embedding).await;
                    if stored.is_ok() {
                        let _ = self.embeddings.backlog_remove(entry.id).await;
                        counter!("embedding_backlog_drained_total").increment(1);
                    }
                }
                Err(MlError::CircuitOpen) => {
                    // The circuit tripped mid-drain; stop and retry next tick
                    break;
                }
                Err(err) => {
                    let _ = self
                        .embeddings
                        .backlog_mark_failed(entry, &err.to_string())
                        .await;
                }
            }
        }
    }
}

fn log_fallback(operation: &'static str, news_id: i64, err: &MlError) {
    counter!("ml_fallbacks_total", "operation" => operation).increment(1);
    match err {
        MlError::CircuitOpen => {
            debug!(news_id, operation, "ML call short-circuited; using fallback")
        }
        _ => warn!(news_id, operation, error = %err, "ML call failed; using fallback"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MlConfig;
    use crate::db::test_pool;
    use crate::ingest::rule_scorer::RuleScorer;
    use crate::repositories::NewNews;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn saved_article(db: &Arc<DatabaseConnection>) -> i64 {
        let news = NewsRepository::new(Arc::clone(db));
        let scores = ScoreRepository::new(Arc::clone(db));
        let published_at = chrono::Utc::now();
        let title = "삼성전자 실적 발표";
        let body = "삼성전자가 분기 실적을 발표했다. 영업이익이 시장 기대를 웃돌았다.".to_string();

        let item = news
            .insert_if_new(NewNews {
                source: "yonhap".to_string(),
                url: "https://news.example/1".to_string(),
                published_at,
                title: title.to_string(),
                body: body.clone(),
                lang: "ko".to_string(),
                dedup_key: crate::ingest::normalizer::dedup_key(title, "yonhap", published_at),
            })
            .await
            .unwrap()
            .unwrap();

        let score = RuleScorer::new().score(title, &body, Some(0.9), published_at, published_at);
        scores.upsert_rule(item.id, &score).await.unwrap();
        item.id
    }

    fn ml_config(url: String) -> MlConfig {
        MlConfig {
            service_url: url,
            retry_max_attempts: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn successful_enrichment_stores_all_three_outputs() {
        let server = MockServer::start().await;
        let vector: Vec<f32> = vec![0.05; 384];

        Mock::given(method("POST"))
            .and(path("/v1/importance:score"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": 1, "importance_p": 0.77}],
                "modelVersion": "imp-v2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/summarize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 1,
                "summary": "삼성전자 분기 실적이 기대를 웃돌았다.",
                "modelVersion": "sum-v1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": 1, "vector": vector, "norm": 1.0}],
                "dimension": 384,
                "modelVersion": "default-e5-small"
            })))
            .mount(&server)
            .await;

        let db = Arc::new(test_pool().await);
        let news_id = saved_article(&db).await;
        assert_eq!(news_id, 1);

        let ml = Arc::new(MlClient::new(&ml_config(server.uri())));
        let pipeline = EnrichmentPipeline::new(Arc::clone(&db), ml);
        pipeline.enrich(news_id).await;

        let score = ScoreRepository::new(Arc::clone(&db))
            .get(news_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(score.importance_p, Some(0.77));
        assert!(score.summary.is_some());

        let embedding = EmbeddingRepository::new(db).get(news_id).await.unwrap();
        assert!(embedding.is_some());
    }

    #[tokio::test]
    async fn ml_outage_degrades_to_fallbacks_and_backlog() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let db = Arc::new(test_pool().await);
        let news_id = saved_article(&db).await;

        let ml = Arc::new(MlClient::new(&ml_config(server.uri())));
        let pipeline = EnrichmentPipeline::new(Arc::clone(&db), ml);
        pipeline.enrich(news_id).await;

        let score = ScoreRepository::new(Arc::clone(&db))
            .get(news_id)
            .await
            .unwrap()
            .unwrap();
        // Rule score survives; the summary is the local two-sentence fallback
        assert_eq!(score.importance_p, None);
        assert!(score.summary.unwrap().starts_with("삼성전자가"));

        let embeddings = EmbeddingRepository::new(db);
        assert!(embeddings.get(news_id).await.unwrap().is_none());
        let backlog = embeddings.backlog_batch(10).await.unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].news_id, news_id);
    }

    #[tokio::test]
    async fn backlog_drain_recovers_after_service_returns() {
        let server = MockServer::start().await;
        let vector: Vec<f32> = vec![0.05; 384];
        Mock::given(method("POST"))
            .and(path("/v1/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": 1, "vector": vector, "norm": 1.0}],
                "dimension": 384,
                "modelVersion": "default-e5-small"
            })))
            .mount(&server)
            .await;

        let db = Arc::new(test_pool().await);
        let news_id = saved_article(&db).await;

        let embeddings = EmbeddingRepository::new(Arc::clone(&db));
        embeddings.backlog_push(news_id, "timeout").await.unwrap();

        let ml = Arc::new(MlClient::new(&ml_config(server.uri())));
        let pipeline = EnrichmentPipeline::new(Arc::clone(&db), ml);
        pipeline.drain_backlog().await;

        assert!(embeddings.get(news_id).await.unwrap().is_some());
        assert!(embeddings.backlog_batch(10).await.unwrap().is_empty());
    }
}
