//! # Engagement Repository
//!
//! Batched writes for impression and click logs plus the aggregate reads the
//! popularity arm, the personalizer, and the nightly rollup rely on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};

use crate::error::RepositoryError;
use crate::models::click_log::{self, Entity as ClickLog};
use crate::models::impression_log::{self, Entity as ImpressionLog};
use crate::repositories::{date_partition, to_db_time};

/// One impression pending insertion.
#[derive(Debug, Clone)]
pub struct ImpressionRecord {
    pub anon_id: String,
    pub user_id: Option<String>,
    pub news_id: i64,
    pub shown_at: DateTime<Utc>,
    pub position: i32,
    pub importance: f64,
    pub rank_score: f64,
    pub personalized: bool,
    pub diversity_applied: bool,
    pub degraded: bool,
    pub experiment_key: Option<String>,
    pub variant: Option<String>,
}

/// One click pending insertion.
#[derive(Debug, Clone)]
pub struct ClickRecord {
    pub anon_id: String,
    pub user_id: Option<String>,
    pub news_id: i64,
    pub clicked_at: DateTime<Utc>,
    pub dwell_time_ms: Option<i64>,
    pub experiment_key: Option<String>,
    pub variant: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EngagementRepository {
    pub db: Arc<DatabaseConnection>,
}

impl EngagementRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Batch insert buffered impressions.
    pub async fn insert_impressions(
        &self,
        records: Vec<ImpressionRecord>,
    ) -> Result<(), RepositoryError> {
        if records.is_empty() {
            return Ok(());
        }

        let models: Vec<impression_log::ActiveModel> = records
            .into_iter()
            .map(|r| impression_log::ActiveModel {
                anon_id: Set(r.anon_id),
                user_id: Set(r.user_id),
                news_id: Set(r.news_id),
                shown_at: Set(to_db_time(r.shown_at)),
                position: Set(r.position),
                importance: Set(r.importance),
                rank_score: Set(r.rank_score),
                personalized: Set(r.personalized),
                diversity_applied: Set(r.diversity_applied),
                degraded: Set(r.degraded),
                experiment_key: Set(r.experiment_key),
                variant: Set(r.variant),
                date_partition: Set(date_partition(r.shown_at)),
                ..Default::default()
            })
            .collect();

        ImpressionLog::insert_many(models)
            .exec_without_returning(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(())
    }

    /// Batch insert buffered clicks.
    pub async fn insert_clicks(&self, records: Vec<ClickRecord>) -> Result<(), RepositoryError> {
        if records.is_empty() {
            return Ok(());
        }

        let models: Vec<click_log::ActiveModel> = records
            .into_iter()
            .map(|r| click_log::ActiveModel {
                anon_id: Set(r.anon_id),
                user_id: Set(r.user_id),
                news_id: Set(r.news_id),
                clicked_at: Set(to_db_time(r.clicked_at)),
                dwell_time_ms: Set(r.dwell_time_ms),
                experiment_key: Set(r.experiment_key),
                variant: Set(r.variant),
                date_partition: Set(date_partition(r.clicked_at)),
                ..Default::default()
            })
            .collect();

        ClickLog::insert_many(models)
            .exec_without_returning(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(())
    }

    /// Clicks by one user since a cutoff, newest first.
    pub async fn user_clicks_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<click_log::Model>, RepositoryError> {
        ClickLog::find()
            .filter(click_log::Column::UserId.eq(user_id.to_string()))
            .filter(click_log::Column::ClickedAt.gte(to_db_time(since)))
            .order_by_desc(click_log::Column::ClickedAt)
            .limit(limit)
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Clicks by one anonymous visitor since a cutoff.
    pub async fn anon_clicks_since(
        &self,
        anon_id: &str,
        since: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<click_log::Model>, RepositoryError> {
        ClickLog::find()
            .filter(click_log::Column::AnonId.eq(anon_id.to_string()))
            .filter(click_log::Column::ClickedAt.gte(to_db_time(since)))
            .order_by_desc(click_log::Column::ClickedAt)
            .limit(limit)
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Most-clicked article ids since a cutoff, for the popularity arm.
    pub async fn popular_news_ids(
        &self,
        since: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<(i64, i64)>, RepositoryError> {
        ClickLog::find()
            .select_only()
            .column(click_log::Column::NewsId)
            .column_as(click_log::Column::Id.count(), "clicks")
            .filter(click_log::Column::ClickedAt.gte(to_db_time(since)))
            .group_by(click_log::Column::NewsId)
            .order_by_desc(click_log::Column::Id.count())
            .limit(limit)
            .into_tuple()
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Raw logs for one rollup partition.
    pub async fn logs_for_partition(
        &self,
        partition: &str,
    ) -> Result<(Vec<impression_log::Model>, Vec<click_log::Model>), RepositoryError> {
        let impressions = ImpressionLog::find()
            .filter(impression_log::Column::DatePartition.eq(partition.to_string()))
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        let clicks = ClickLog::find()
            .filter(click_log::Column::DatePartition.eq(partition.to_string()))
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok((impressions, clicks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::Duration;

    fn impression(anon: &str, news_id: i64, position: i32) -> ImpressionRecord {
        ImpressionRecord {
            anon_id: anon.to_string(),
            user_id: None,
            news_id,
            shown_at: Utc::now(),
            position,
            importance: 5.0,
            rank_score: 0.5,
            personalized: false,
            diversity_applied: true,
            degraded: false,
            experiment_key: Some("ranking_personalization".to_string()),
            variant: Some("control".to_string()),
        }
    }

    fn click(anon: &str, news_id: i64, user: Option<&str>) -> ClickRecord {
        ClickRecord {
            anon_id: anon.to_string(),
            user_id: user.map(|u| u.to_string()),
            news_id,
            clicked_at: Utc::now(),
            dwell_time_ms: Some(12_000),
            experiment_key: None,
            variant: None,
        }
    }

    #[tokio::test]
    async fn batch_inserts_and_partition_read() {
        let db = test_pool().await;
        let repo = EngagementRepository::new(Arc::new(db));

        repo.insert_impressions(vec![impression("anon-1", 1, 1), impression("anon-1", 2, 2)])
            .await
            .unwrap();
        repo.insert_clicks(vec![click("anon-1", 1, None)]).await.unwrap();

        let partition = date_partition(Utc::now());
        let (impressions, clicks) = repo.logs_for_partition(&partition).await.unwrap();
        assert_eq!(impressions.len(), 2);
        assert_eq!(clicks.len(), 1);
        assert_eq!(impressions[0].variant.as_deref(), Some("control"));
    }

    #[tokio::test]
    async fn popular_ranking_counts_clicks() {
        let db = test_pool().await;
        let repo = EngagementRepository::new(Arc::new(db));

        repo.insert_clicks(vec![
            click("a", 1, None),
            click("b", 1, None),
            click("c", 1, None),
            click("a", 2, None),
        ])
        .await
        .unwrap();

        let popular = repo
            .popular_news_ids(Utc::now() - Duration::hours(1), 10)
            .await
            .unwrap();
        assert_eq!(popular[0], (1, 3));
        assert_eq!(popular[1], (2, 1));
    }

    #[tokio::test]
    async fn user_click_history_is_scoped_and_time_bounded() {
        let db = test_pool().await;
        let repo = EngagementRepository::new(Arc::new(db));

        repo.insert_clicks(vec![click("a", 1, Some("user-1")), click("b", 2, Some("user-2"))])
            .await
            .unwrap();

        let history = repo
            .user_clicks_since("user-1", Utc::now() - Duration::days(7), 100)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].news_id, 1);
    }
}
