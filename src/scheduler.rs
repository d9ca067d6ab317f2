//! # Background Scheduler
//!
//! Owns the periodic loops: RSS collection, topic clustering, experiment
//! auto-stop, embedding backlog drain, and the nightly metrics rollup. Every
//! loop is a long-running task that self-cancels on shutdown, and every tick
//! is idempotent against double-firing on overlapping schedules.

use std::sync::Arc;

use metrics::histogram;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::analytics::MetricsRollup;
use crate::clustering::TopicClusterer;
use crate::config::AppConfig;
use crate::enrichment::EnrichmentPipeline;
use crate::experiments::autostop::AutoStopMonitor;
use crate::ingest::RssIngestor;
use crate::repositories::date_partition;

/// How often the rollup loop checks whether the date rolled over.
const ROLLUP_CHECK_SECONDS: u64 = 3600;

/// Background task owner.
pub struct Scheduler {
    config: Arc<AppConfig>,
    ingestor: Arc<RssIngestor>,
    clusterer: Arc<TopicClusterer>,
    enrichment: Arc<EnrichmentPipeline>,
    autostop: AutoStopMonitor,
    rollup: MetricsRollup,
}

impl Scheduler {
    pub fn new(
        config: Arc<AppConfig>,
        ingestor: Arc<RssIngestor>,
        clusterer: Arc<TopicClusterer>,
        enrichment: Arc<EnrichmentPipeline>,
        autostop: AutoStopMonitor,
        rollup: MetricsRollup,
    ) -> Self {
        Self {
            config,
            ingestor,
            clusterer,
            enrichment,
            autostop,
            rollup,
        }
    }

    /// Spawn every configured loop. Disabled features spawn nothing.
    pub fn spawn_all(self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if self.config.ingest.enabled {
            let ingestor = self.ingestor;
            let interval = Duration::from_secs(self.config.ingest.interval_seconds);
            handles.push(spawn_loop("rss_collection", interval, shutdown.clone(), move || {
                let ingestor = Arc::clone(&ingestor);
                async move {
                    ingestor.collect_all().await;
                }
            }));
        } else {
            info!("RSS collection disabled by configuration");
        }

        if self.config.clustering.enabled {
            let clusterer = self.clusterer;
            let interval = Duration::from_secs(self.config.clustering.interval_seconds);
            handles.push(spawn_loop("topic_clustering", interval, shutdown.clone(), move || {
                let clusterer = Arc::clone(&clusterer);
                async move {
                    if let Err(err) = clusterer.run().await {
                        // Stale topic assignments are tolerated by readers
                        error!(error = %err, "clustering run failed");
                    }
                }
            }));
        } else {
            info!("Topic clustering disabled by configuration");
        }

        {
            let autostop = Arc::new(self.autostop);
            let interval = Duration::from_secs(self.config.autostop_interval_seconds);
            handles.push(spawn_loop("experiment_autostop", interval, shutdown.clone(), move || {
                let autostop = Arc::clone(&autostop);
                async move {
                    if let Err(err) = autostop.run_once().await {
                        error!(error = %err, "auto-stop pass failed");
                    }
                }
            }));
        }

        {
            let enrichment = self.enrichment;
            let interval = Duration::from_secs(self.config.backlog_drain_interval_seconds);
            handles.push(spawn_loop("embedding_backlog", interval, shutdown.clone(), move || {
                let enrichment = Arc::clone(&enrichment);
                async move {
                    enrichment.drain_backlog().await;
                }
            }));
        }

        {
            let rollup = Arc::new(self.rollup);
            handles.push(tokio::spawn(rollup_loop(rollup, shutdown)));
        }

        handles
    }
}

/// Generic fixed-interval loop with shutdown and tick timing.
fn spawn_loop<F, Fut>(
    name: &'static str,
    interval: Duration,
    shutdown: CancellationToken,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        info!(task = name, interval_seconds = interval.as_secs(), "scheduled task started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(task = name, "scheduled task shutdown requested");
                    break;
                }
                _ = sleep(interval) => {
                    let started = Instant::now();
                    tick().await;
                    histogram!("scheduled_task_duration_ms", "task" => name)
                        .record(started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!(task = name, "scheduled task stopped");
    })
}

/// Nightly rollup: wake hourly and roll up yesterday once the date changes.
/// Re-running a partition is an upsert, so double-firing is harmless.
async fn rollup_loop(rollup: Arc<MetricsRollup>, shutdown: CancellationToken) {
    let mut last_processed_for: Option<String> = None;
    info!("metrics rollup loop started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("metrics rollup loop shutdown requested");
                break;
            }
            _ = sleep(Duration::from_secs(ROLLUP_CHECK_SECONDS)) => {
                let today = date_partition(chrono::Utc::now());
                if last_processed_for.as_deref() == Some(today.as_str()) {
                    continue;
                }

                match rollup.run_for_yesterday().await {
                    Ok(rows) => {
                        info!(rows, "nightly rollup completed");
                        last_processed_for = Some(today);
                    }
                    Err(err) => error!(error = %err, "nightly rollup failed"),
                }
            }
        }
    }

    info!("metrics rollup loop stopped");
}
