//! # News Repository
//!
//! Data access for news rows: dedup-guarded inserts and the candidate fetch
//! that feeds the ranking pipeline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::error::RepositoryError;
use crate::models::news::{self, Entity as News};
use crate::models::news_score;
use crate::repositories::to_db_time;

/// A normalized article ready for insertion.
#[derive(Debug, Clone)]
pub struct NewNews {
    pub source: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
    pub lang: String,
    pub dedup_key: String,
}

/// Repository for news database operations
#[derive(Debug, Clone)]
pub struct NewsRepository {
    pub db: Arc<DatabaseConnection>,
}

impl NewsRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert the article unless a row with the same dedup key exists.
    ///
    /// Returns the saved model, or `None` when the story was already stored.
    pub async fn insert_if_new(&self, item: NewNews) -> Result<Option<news::Model>, RepositoryError> {
        let existing = News::find()
            .filter(news::Column::DedupKey.eq(item.dedup_key.clone()))
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        if existing.is_some() {
            return Ok(None);
        }

        let active = news::ActiveModel {
            source: Set(item.source),
            url: Set(item.url),
            published_at: Set(to_db_time(item.published_at)),
            title: Set(item.title),
            body: Set(item.body),
            lang: Set(item.lang),
            dedup_key: Set(item.dedup_key),
            created_at: Set(to_db_time(Utc::now())),
            ..Default::default()
        };

        match active.insert(&*self.db).await {
            Ok(model) => Ok(Some(model)),
            // A concurrent ingest of the same story wins the race; treat as skipped
            Err(err) if is_unique_violation(&err) => Ok(None),
            Err(err) => Err(RepositoryError::database_error(err)),
        }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<news::Model>, RepositoryError> {
        News::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Fetch one article together with its score row.
    pub async fn find_with_score(
        &self,
        id: i64,
    ) -> Result<Option<(news::Model, Option<news_score::Model>)>, RepositoryError> {
        News::find_by_id(id)
            .find_also_related(news_score::Entity)
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Top-K scored articles published after `since`, ordered by rank score
    /// then recency. Articles without a score row are not candidates.
    pub async fn candidates(
        &self,
        k: u64,
        since: DateTime<Utc>,
    ) -> Result<Vec<(news::Model, news_score::Model)>, RepositoryError> {
        let rows = News::find()
            .find_also_related(news_score::Entity)
            .filter(news::Column::PublishedAt.gte(to_db_time(since)))
            .order_by_desc(news_score::Column::RankScore)
            .order_by_desc(news::Column::PublishedAt)
            .limit(k)
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(rows
            .into_iter()
            .filter_map(|(item, score)| score.map(|s| (item, s)))
            .collect())
    }

    /// Most recent articles regardless of score, for the recency arm.
    pub async fn recent(
        &self,
        limit: u64,
    ) -> Result<Vec<news::Model>, RepositoryError> {
        News::find()
            .order_by_desc(news::Column::PublishedAt)
            .limit(limit)
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}

fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    matches!(
        err,
        sea_orm::DbErr::Exec(sea_orm::RuntimeErr::SqlxError(sea_orm::SqlxError::Database(db_err)))
            if matches!(db_err.code().as_deref(), Some("23505") | Some("2067") | Some("1555"))
    )
}
