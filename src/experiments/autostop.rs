//! Experiment auto-stop monitor.
//!
//! Every run inspects the last three days of rolled-up metrics for each
//! active auto-stop experiment. When any single day shows the treatment CTR
//! degrading against control by at least the experiment's threshold, with
//! enough samples on both sides, the experiment's kill-switch flag flips off.

use chrono::{Duration, Utc};
use metrics::counter;
use tracing::{info, warn};

use crate::error::RepositoryError;
use crate::repositories::{ExperimentRepository, MetricsRepository, date_partition};

use super::flags::FlagStore;

/// Days of metrics inspected per run.
const LOOKBACK_DAYS: i64 = 3;

/// Disables experiments whose treatment measurably underperforms.
pub struct AutoStopMonitor {
    experiments: ExperimentRepository,
    metrics: MetricsRepository,
    flags: FlagStore,
    environment: String,
}

impl AutoStopMonitor {
    pub fn new(
        experiments: ExperimentRepository,
        metrics: MetricsRepository,
        flags: FlagStore,
        environment: String,
    ) -> Self {
        Self {
            experiments,
            metrics,
            flags,
            environment,
        }
    }

    /// Evaluate every auto-stop experiment once. Returns the keys disabled
    /// in this pass.
    pub async fn run_once(&self) -> Result<Vec<String>, RepositoryError> {
        let now = Utc::now();
        let partitions: Vec<String> = (1..=LOOKBACK_DAYS)
            .map(|days_back| date_partition(now - Duration::days(days_back)))
            .collect();

        let mut disabled = Vec::new();

        for experiment in self.experiments.list_active_autostop().await? {
            let rows = self
                .metrics
                .for_partitions(&experiment.experiment_key, &partitions)
                .await?;

            let threshold = experiment.auto_stop_threshold.abs();
            let minimum = experiment.minimum_sample_size;

            let degraded_day = partitions.iter().find(|partition| {
                let control = rows
                    .iter()
                    .find(|r| r.date_partition == **partition && r.variant == "control");
                let treatment = rows
                    .iter()
                    .find(|r| r.date_partition == **partition && r.variant == "treatment");

                match (control, treatment) {
                    (Some(control), Some(treatment)) => {
                        control.impressions >= minimum
                            && treatment.impressions >= minimum
                            && control.ctr - treatment.ctr >= threshold
                    }
                    _ => false,
                }
            });

            if let Some(partition) = degraded_day {
                let flag_key = format!("experiment.{}.enabled", experiment.experiment_key);
                warn!(
                    experiment_key = %experiment.experiment_key,
                    partition = %partition,
                    threshold,
                    "auto-stop disabling degraded experiment"
                );

                self.flags
                    .set_bool(&flag_key, false, &self.environment)
                    .await?;
                counter!("experiment_autostop_total").increment(1);
                disabled.push(experiment.experiment_key);
            }
        }

        if !disabled.is_empty() {
            info!(count = disabled.len(), "auto-stop pass disabled experiments");
        }

        Ok(disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::repositories::experiment::DailyMetrics;
    use crate::repositories::{FeatureFlagRepository, to_db_time};
    use sea_orm::Set;
    use serde_json::json;
    use std::sync::Arc;

    async fn seed_experiment(db: &sea_orm::DatabaseConnection, minimum: i64) {
        ExperimentRepository::new(Arc::new(db.clone()))
            .create(crate::models::experiment::ActiveModel {
                experiment_key: Set("ranking_personalization".to_string()),
                variants: Set(json!(["control", "treatment"])),
                allocation: Set(json!({"control": 50.0, "treatment": 50.0})),
                start_date: Set(None),
                end_date: Set(None),
                is_active: Set(true),
                auto_stop_enabled: Set(true),
                auto_stop_threshold: Set(-0.05),
                minimum_sample_size: Set(minimum),
                created_at: Set(to_db_time(Utc::now())),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    fn day(variant: &str, partition: &str, impressions: i64, ctr: f64) -> DailyMetrics {
        DailyMetrics {
            experiment_key: "ranking_personalization".to_string(),
            variant: variant.to_string(),
            date_partition: partition.to_string(),
            impressions,
            clicks: (impressions as f64 * ctr) as i64,
            ctr,
            avg_dwell_ms: 0.0,
            diversity_score: 0.5,
        }
    }

    async fn monitor(db: &sea_orm::DatabaseConnection) -> (AutoStopMonitor, FlagStore) {
        let db = Arc::new(db.clone());
        let flags = FlagStore::new(FeatureFlagRepository::new(Arc::clone(&db)));
        let monitor = AutoStopMonitor::new(
            ExperimentRepository::new(Arc::clone(&db)),
            MetricsRepository::new(db),
            flags.clone(),
            "test".to_string(),
        );
        (monitor, flags)
    }

    #[tokio::test]
    async fn degraded_day_disables_the_experiment() {
        let db = test_pool().await;
        seed_experiment(&db, 100).await;

        let yesterday = date_partition(Utc::now() - Duration::days(1));
        MetricsRepository::new(Arc::new(db.clone()))
            .upsert_daily(vec![
                day("control", &yesterday, 500, 0.10),
                day("treatment", &yesterday, 500, 0.03),
            ])
            .await
            .unwrap();

        let (monitor, flags) = monitor(&db).await;
        let disabled = monitor.run_once().await.unwrap();

        assert_eq!(disabled, vec!["ranking_personalization".to_string()]);
        assert!(!flags.get_bool("experiment.ranking_personalization.enabled", true));
    }

    #[tokio::test]
    async fn small_samples_never_trigger() {
        let db = test_pool().await;
        seed_experiment(&db, 1000).await;

        let yesterday = date_partition(Utc::now() - Duration::days(1));
        MetricsRepository::new(Arc::new(db.clone()))
            .upsert_daily(vec![
                day("control", &yesterday, 50, 0.10),
                day("treatment", &yesterday, 50, 0.01),
            ])
            .await
            .unwrap();

        let (monitor, _flags) = monitor(&db).await;
        assert!(monitor.run_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn healthy_experiments_stay_enabled() {
        let db = test_pool().await;
        seed_experiment(&db, 100).await;

        let yesterday = date_partition(Utc::now() - Duration::days(1));
        MetricsRepository::new(Arc::new(db.clone()))
            .upsert_daily(vec![
                day("control", &yesterday, 500, 0.08),
                day("treatment", &yesterday, 500, 0.09),
            ])
            .await
            .unwrap();

        let (monitor, flags) = monitor(&db).await;
        assert!(monitor.run_once().await.unwrap().is_empty());
        assert!(flags.get_bool("experiment.ranking_personalization.enabled", true));
    }
}
