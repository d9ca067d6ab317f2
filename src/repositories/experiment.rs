//! # Experiment Repositories
//!
//! Experiment definitions, their daily metric rollups, and feature flags.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::error::RepositoryError;
use crate::models::experiment::{self, Entity as Experiment};
use crate::models::experiment_metrics_daily::{self, Entity as ExperimentMetricsDaily};
use crate::models::feature_flag::{self, Entity as FeatureFlag};
use crate::repositories::to_db_time;

#[derive(Debug, Clone)]
pub struct ExperimentRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ExperimentRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The active experiment under a key, if any. Date bounds are enforced
    /// here so callers can treat the result as currently-running.
    pub async fn find_active(
        &self,
        experiment_key: &str,
    ) -> Result<Option<experiment::Model>, RepositoryError> {
        let Some(found) = Experiment::find()
            .filter(experiment::Column::ExperimentKey.eq(experiment_key.to_string()))
            .filter(experiment::Column::IsActive.eq(true))
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?
        else {
            return Ok(None);
        };

        let now = Utc::now();
        if let Some(start) = found.start_date
            && start.with_timezone(&Utc) > now
        {
            return Ok(None);
        }
        if let Some(end) = found.end_date
            && end.with_timezone(&Utc) < now
        {
            return Ok(None);
        }

        Ok(Some(found))
    }

    /// All active experiments with auto-stop enabled.
    pub async fn list_active_autostop(&self) -> Result<Vec<experiment::Model>, RepositoryError> {
        Experiment::find()
            .filter(experiment::Column::IsActive.eq(true))
            .filter(experiment::Column::AutoStopEnabled.eq(true))
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn create(
        &self,
        active: experiment::ActiveModel,
    ) -> Result<experiment::Model, RepositoryError> {
        active
            .insert(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}

/// One rolled-up day for one experiment variant.
#[derive(Debug, Clone)]
pub struct DailyMetrics {
    pub experiment_key: String,
    pub variant: String,
    pub date_partition: String,
    pub impressions: i64,
    pub clicks: i64,
    pub ctr: f64,
    pub avg_dwell_ms: f64,
    pub diversity_score: f64,
}

#[derive(Debug, Clone)]
pub struct MetricsRepository {
    pub db: Arc<DatabaseConnection>,
}

impl MetricsRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Idempotent rollup write keyed by (experiment, variant, partition).
    pub async fn upsert_daily(&self, rows: Vec<DailyMetrics>) -> Result<(), RepositoryError> {
        for row in rows {
            let active = experiment_metrics_daily::ActiveModel {
                experiment_key: Set(row.experiment_key),
                variant: Set(row.variant),
                date_partition: Set(row.date_partition),
                impressions: Set(row.impressions),
                clicks: Set(row.clicks),
                ctr: Set(row.ctr),
                avg_dwell_ms: Set(row.avg_dwell_ms),
                diversity_score: Set(row.diversity_score),
                ..Default::default()
            };

            ExperimentMetricsDaily::insert(active)
                .on_conflict(
                    OnConflict::columns([
                        experiment_metrics_daily::Column::ExperimentKey,
                        experiment_metrics_daily::Column::Variant,
                        experiment_metrics_daily::Column::DatePartition,
                    ])
                    .update_columns([
                        experiment_metrics_daily::Column::Impressions,
                        experiment_metrics_daily::Column::Clicks,
                        experiment_metrics_daily::Column::Ctr,
                        experiment_metrics_daily::Column::AvgDwellMs,
                        experiment_metrics_daily::Column::DiversityScore,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&*self.db)
                .await
                .map_err(RepositoryError::database_error)?;
        }

        Ok(())
    }

    /// Metric rows for an experiment across the given partitions.
    pub async fn for_partitions(
        &self,
        experiment_key: &str,
        partitions: &[String],
    ) -> Result<Vec<experiment_metrics_daily::Model>, RepositoryError> {
        if partitions.is_empty() {
            return Ok(Vec::new());
        }

        ExperimentMetricsDaily::find()
            .filter(experiment_metrics_daily::Column::ExperimentKey.eq(experiment_key.to_string()))
            .filter(experiment_metrics_daily::Column::DatePartition.is_in(partitions.to_vec()))
            .order_by_asc(experiment_metrics_daily::Column::DatePartition)
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}

#[derive(Debug, Clone)]
pub struct FeatureFlagRepository {
    pub db: Arc<DatabaseConnection>,
}

impl FeatureFlagRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get(&self, flag_key: &str) -> Result<Option<feature_flag::Model>, RepositoryError> {
        FeatureFlag::find()
            .filter(feature_flag::Column::FlagKey.eq(flag_key.to_string()))
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn all(&self) -> Result<Vec<feature_flag::Model>, RepositoryError> {
        FeatureFlag::find()
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Create or replace a boolean flag.
    pub async fn set_bool(
        &self,
        flag_key: &str,
        value: bool,
        environment: &str,
    ) -> Result<(), RepositoryError> {
        let active = feature_flag::ActiveModel {
            flag_key: Set(flag_key.to_string()),
            value_type: Set("boolean".to_string()),
            flag_value: Set(value.to_string()),
            is_enabled: Set(true),
            environment: Set(environment.to_string()),
            updated_at: Set(to_db_time(Utc::now())),
            ..Default::default()
        };

        FeatureFlag::insert(active)
            .on_conflict(
                OnConflict::column(feature_flag::Column::FlagKey)
                    .update_columns([
                        feature_flag::Column::FlagValue,
                        feature_flag::Column::IsEnabled,
                        feature_flag::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use serde_json::json;

    async fn seed_experiment(db: &DatabaseConnection, key: &str, active: bool) {
        let repo = ExperimentRepository::new(Arc::new(db.clone()));
        repo.create(experiment::ActiveModel {
            experiment_key: Set(key.to_string()),
            variants: Set(json!(["control", "treatment"])),
            allocation: Set(json!({"control": 50.0, "treatment": 50.0})),
            start_date: Set(None),
            end_date: Set(None),
            is_active: Set(active),
            auto_stop_enabled: Set(true),
            auto_stop_threshold: Set(0.05),
            minimum_sample_size: Set(100),
            created_at: Set(to_db_time(Utc::now())),
            ..Default::default()
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn inactive_experiments_are_invisible() {
        let db = test_pool().await;
        seed_experiment(&db, "exp-on", true).await;
        seed_experiment(&db, "exp-off", false).await;

        let repo = ExperimentRepository::new(Arc::new(db));
        assert!(repo.find_active("exp-on").await.unwrap().is_some());
        assert!(repo.find_active("exp-off").await.unwrap().is_none());
        assert!(repo.find_active("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn daily_metrics_upsert_is_idempotent() {
        let db = test_pool().await;
        let repo = MetricsRepository::new(Arc::new(db));

        let row = DailyMetrics {
            experiment_key: "exp".to_string(),
            variant: "control".to_string(),
            date_partition: "2025-06-01".to_string(),
            impressions: 100,
            clicks: 7,
            ctr: 0.07,
            avg_dwell_ms: 8000.0,
            diversity_score: 0.6,
        };

        repo.upsert_daily(vec![row.clone()]).await.unwrap();
        let mut updated = row.clone();
        updated.clicks = 9;
        updated.ctr = 0.09;
        repo.upsert_daily(vec![updated]).await.unwrap();

        let stored = repo
            .for_partitions("exp", &["2025-06-01".to_string()])
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].clicks, 9);
    }

    #[tokio::test]
    async fn boolean_flag_set_and_read() {
        let db = test_pool().await;
        let repo = FeatureFlagRepository::new(Arc::new(db));

        repo.set_bool("experiment.exp.enabled", true, "local").await.unwrap();
        assert!(repo.get("experiment.exp.enabled").await.unwrap().unwrap().as_bool());

        repo.set_bool("experiment.exp.enabled", false, "local").await.unwrap();
        assert!(!repo.get("experiment.exp.enabled").await.unwrap().unwrap().as_bool());
    }
}
