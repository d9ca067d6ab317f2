//! Impression and click telemetry.
//!
//! The sink buffers events in memory and flushes them as batch inserts every
//! second or every 500 events, whichever comes first. The nightly rollup
//! folds the raw logs into per-experiment daily metrics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use metrics::counter;
use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::RepositoryError;
use crate::ranking::cosine_similarity;
use crate::repositories::engagement::{ClickRecord, ImpressionRecord};
use crate::repositories::experiment::DailyMetrics;
use crate::repositories::{
    EmbeddingRepository, EngagementRepository, MetricsRepository, date_partition,
};

/// One buffered telemetry event.
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    Impression(ImpressionRecord),
    Click(ClickRecord),
}

/// Cheap cloneable handle handlers use to enqueue events.
#[derive(Debug, Clone)]
pub struct TelemetrySink {
    tx: mpsc::Sender<TelemetryEvent>,
}

impl TelemetrySink {
    /// Create the sink and the receiver its flusher consumes.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TelemetryEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn record_impression(&self, record: ImpressionRecord) {
        if self.tx.try_send(TelemetryEvent::Impression(record)).is_err() {
            counter!("telemetry_events_dropped_total", "kind" => "impression").increment(1);
        }
    }

    pub fn record_click(&self, record: ClickRecord) {
        if self.tx.try_send(TelemetryEvent::Click(record)).is_err() {
            counter!("telemetry_events_dropped_total", "kind" => "click").increment(1);
        }
    }
}

/// Background flusher owning the receiving half of the sink.
pub struct TelemetryFlusher {
    engagement: EngagementRepository,
    flush_interval: Duration,
    batch_size: usize,
}

impl TelemetryFlusher {
    pub fn new(db: Arc<DatabaseConnection>, flush_interval_ms: u64, batch_size: usize) -> Self {
        Self {
            engagement: EngagementRepository::new(db),
            flush_interval: Duration::from_millis(flush_interval_ms.max(1)),
            batch_size: batch_size.max(1),
        }
    }

    /// Buffer and flush until shutdown; the final buffer flushes on the way
    /// out.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<TelemetryEvent>,
        shutdown: CancellationToken,
    ) {
        let mut impressions: Vec<ImpressionRecord> = Vec::new();
        let mut clicks: Vec<ClickRecord> = Vec::new();
        let mut ticker = interval(self.flush_interval);
        info!("Telemetry flusher started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.flush(&mut impressions, &mut clicks).await;
                    break;
                }
                _ = ticker.tick() => {
                    self.flush(&mut impressions, &mut clicks).await;
                }
                event = events.recv() => {
                    match event {
                        Some(TelemetryEvent::Impression(record)) => impressions.push(record),
                        Some(TelemetryEvent::Click(record)) => clicks.push(record),
                        None => {
                            self.flush(&mut impressions, &mut clicks).await;
                            break;
                        }
                    }

                    if impressions.len() + clicks.len() >= self.batch_size {
                        self.flush(&mut impressions, &mut clicks).await;
                    }
                }
            }
        }

        info!("Telemetry flusher stopped");
    }

    async fn flush(&self, impressions: &mut Vec<ImpressionRecord>, clicks: &mut Vec<ClickRecord>) {
        if !impressions.is_empty() {
            let batch = std::mem::take(impressions);
            let count = batch.len();
            if let Err(err) = self.engagement.insert_impressions(batch).await {
                warn!(error = %err, "failed to flush impressions");
            } else {
                counter!("telemetry_flushed_total", "kind" => "impression")
                    .increment(count as u64);
            }
        }

        if !clicks.is_empty() {
            let batch = std::mem::take(clicks);
            let count = batch.len();
            if let Err(err) = self.engagement.insert_clicks(batch).await {
                warn!(error = %err, "failed to flush clicks");
            } else {
                counter!("telemetry_flushed_total", "kind" => "click").increment(count as u64);
            }
        }
    }
}

/// Sample cap for the pairwise similarity inside the diversity score.
const DIVERSITY_SAMPLE: usize = 50;

/// Aggregates one partition of raw logs into daily metric rows.
pub struct MetricsRollup {
    engagement: EngagementRepository,
    embeddings: EmbeddingRepository,
    metrics: MetricsRepository,
}

impl MetricsRollup {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            engagement: EngagementRepository::new(Arc::clone(&db)),
            embeddings: EmbeddingRepository::new(Arc::clone(&db)),
            metrics: MetricsRepository::new(db),
        }
    }

    /// Roll up yesterday's logs. Invoked nightly by the scheduler.
    pub async fn run_for_yesterday(&self) -> Result<usize, RepositoryError> {
        let partition = date_partition(Utc::now() - ChronoDuration::days(1));
        self.run_for_partition(&partition).await
    }

    /// Roll up one partition. Idempotent; re-running replaces the rows.
    pub async fn run_for_partition(&self, partition: &str) -> Result<usize, RepositoryError> {
        let (impressions, clicks) = self.engagement.logs_for_partition(partition).await?;

        #[derive(Default)]
        struct Bucket {
            impressions: i64,
            clicks: i64,
            dwell_ms_total: f64,
            dwell_samples: i64,
            shown_news_ids: Vec<i64>,
        }

        let mut buckets: HashMap<(String, String), Bucket> = HashMap::new();

        for row in &impressions {
            let key = bucket_key(row.experiment_key.as_deref(), row.variant.as_deref());
            let bucket = buckets.entry(key).or_default();
            bucket.impressions += 1;
            bucket.shown_news_ids.push(row.news_id);
        }

        for row in &clicks {
            let key = bucket_key(row.experiment_key.as_deref(), row.variant.as_deref());
            let bucket = buckets.entry(key).or_default();
            bucket.clicks += 1;
            if let Some(dwell) = row.dwell_time_ms {
                bucket.dwell_ms_total += dwell as f64;
                bucket.dwell_samples += 1;
            }
        }

        let mut rows = Vec::with_capacity(buckets.len());
        for ((experiment_key, variant), bucket) in buckets {
            let diversity_score = self.diversity_score(&bucket.shown_news_ids).await?;

            rows.push(DailyMetrics {
                experiment_key,
                variant,
                date_partition: partition.to_string(),
                impressions: bucket.impressions,
                clicks: bucket.clicks,
                ctr: bucket.clicks as f64 / bucket.impressions.max(1) as f64,
                avg_dwell_ms: if bucket.dwell_samples == 0 {
                    0.0
                } else {
                    bucket.dwell_ms_total / bucket.dwell_samples as f64
                },
                diversity_score,
            });
        }

        let written = rows.len();
        self.metrics.upsert_daily(rows).await?;
        info!(partition, rows = written, "daily metrics rollup completed");
        Ok(written)
    }

    /// 1 − average pairwise similarity of what was shown; fully dissimilar
    /// feeds score 1.
    async fn diversity_score(&self, shown: &[i64]) -> Result<f64, RepositoryError> {
        let mut unique: Vec<i64> = shown.to_vec();
        unique.sort_unstable();
        unique.dedup();
        unique.truncate(DIVERSITY_SAMPLE);

        let embeddings = self.embeddings.get_many(&unique).await?;
        let vectors: Vec<Vec<f32>> = embeddings.iter().map(|e| e.decode_vector()).collect();

        if vectors.len() < 2 {
            return Ok(1.0);
        }

        let mut total = 0.0;
        let mut pairs = 0usize;
        for i in 0..vectors.len() {
            for j in (i + 1)..vectors.len() {
                total += cosine_similarity(&vectors[i], &vectors[j]);
                pairs += 1;
            }
        }

        Ok((1.0 - total / pairs as f64).clamp(0.0, 1.0))
    }
}

/// Rows without experiment metadata roll up under the baseline bucket.
fn bucket_key(experiment_key: Option<&str>, variant: Option<&str>) -> (String, String) {
    (
        experiment_key.unwrap_or("baseline").to_string(),
        variant.unwrap_or("none").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn impression(variant: &str, news_id: i64) -> ImpressionRecord {
        ImpressionRecord {
            anon_id: "anon".to_string(),
            user_id: None,
            news_id,
            shown_at: Utc::now(),
            position: 1,
            importance: 5.0,
            rank_score: 0.5,
            personalized: false,
            diversity_applied: false,
            degraded: false,
            experiment_key: Some("exp".to_string()),
            variant: Some(variant.to_string()),
        }
    }

    fn click(variant: &str, news_id: i64, dwell: i64) -> ClickRecord {
        ClickRecord {
            anon_id: "anon".to_string(),
            user_id: None,
            news_id,
            clicked_at: Utc::now(),
            dwell_time_ms: Some(dwell),
            experiment_key: Some("exp".to_string()),
            variant: Some(variant.to_string()),
        }
    }

    #[tokio::test]
    async fn rollup_computes_ctr_and_dwell_per_variant() {
        let db = Arc::new(test_pool().await);
        let engagement = EngagementRepository::new(Arc::clone(&db));

        engagement
            .insert_impressions(vec![
                impression("control", 1),
                impression("control", 2),
                impression("control", 3),
                impression("control", 4),
                impression("treatment", 1),
                impression("treatment", 2),
            ])
            .await
            .unwrap();
        engagement
            .insert_clicks(vec![click("control", 1, 10_000), click("treatment", 1, 30_000)])
            .await
            .unwrap();

        let rollup = MetricsRollup::new(Arc::clone(&db));
        let partition = date_partition(Utc::now());
        let written = rollup.run_for_partition(&partition).await.unwrap();
        assert_eq!(written, 2);

        let metrics = MetricsRepository::new(db)
            .for_partitions("exp", &[partition])
            .await
            .unwrap();

        let control = metrics.iter().find(|m| m.variant == "control").unwrap();
        assert_eq!(control.impressions, 4);
        assert_eq!(control.clicks, 1);
        assert!((control.ctr - 0.25).abs() < 1e-9);
        assert!((control.avg_dwell_ms - 10_000.0).abs() < 1e-9);

        let treatment = metrics.iter().find(|m| m.variant == "treatment").unwrap();
        assert!((treatment.ctr - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn flusher_writes_buffered_events() {
        let db = Arc::new(test_pool().await);
        let (sink, rx) = TelemetrySink::channel(64);
        let flusher = TelemetryFlusher::new(Arc::clone(&db), 10, 500);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(flusher.run(rx, shutdown.clone()));

        sink.record_impression(impression("control", 1));
        sink.record_click(click("control", 1, 5_000));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let partition = date_partition(Utc::now());
        let (impressions, clicks) = EngagementRepository::new(db)
            .logs_for_partition(&partition)
            .await
            .unwrap();
        assert_eq!(impressions.len(), 1);
        assert_eq!(clicks.len(), 1);
    }
}
