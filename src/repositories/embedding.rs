//! # Embedding Repository
//!
//! Persists article vectors and manages the retry backlog for articles whose
//! embedding fetch failed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::error::RepositoryError;
use crate::ml::types::Embedding;
use crate::models::embedding_backlog::{self, Entity as EmbeddingBacklog};
use crate::models::news;
use crate::models::news_embedding::{self, Entity as NewsEmbedding};
use crate::repositories::to_db_time;

#[derive(Debug, Clone)]
pub struct EmbeddingRepository {
    pub db: Arc<DatabaseConnection>,
}

impl EmbeddingRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Write or replace the vector for an article.
    pub async fn upsert(&self, news_id: i64, embedding: &Embedding) -> Result<(), RepositoryError> {
        let active = news_embedding::ActiveModel {
            news_id: Set(news_id),
            vector: Set(serde_json::json!(embedding.vector)),
            norm: Set(embedding.norm),
            model_version: Set(embedding.model_version.clone()),
            created_at: Set(to_db_time(Utc::now())),
        };

        NewsEmbedding::insert(active)
            .on_conflict(
                OnConflict::column(news_embedding::Column::NewsId)
                    .update_columns([
                        news_embedding::Column::Vector,
                        news_embedding::Column::Norm,
                        news_embedding::Column::ModelVersion,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(())
    }

    pub async fn get(&self, news_id: i64) -> Result<Option<news_embedding::Model>, RepositoryError> {
        NewsEmbedding::find_by_id(news_id)
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Vectors for a set of articles, keyed lookups for the ranking path.
    pub async fn get_many(
        &self,
        news_ids: &[i64],
    ) -> Result<Vec<news_embedding::Model>, RepositoryError> {
        if news_ids.is_empty() {
            return Ok(Vec::new());
        }

        NewsEmbedding::find()
            .filter(news_embedding::Column::NewsId.is_in(news_ids.to_vec()))
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Recent embeddings joined with their articles, for the clustering batch.
    pub async fn recent_with_news(
        &self,
        since: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<(news_embedding::Model, news::Model)>, RepositoryError> {
        let rows = NewsEmbedding::find()
            .find_also_related(news::Entity)
            .filter(news_embedding::Column::CreatedAt.gte(to_db_time(since)))
            .order_by_asc(news_embedding::Column::NewsId)
            .limit(limit)
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(rows
            .into_iter()
            .filter_map(|(embedding, item)| item.map(|n| (embedding, n)))
            .collect())
    }

    /// Queue an article for a later embedding retry.
    pub async fn backlog_push(&self, news_id: i64, error: &str) -> Result<(), RepositoryError> {
        let now = to_db_time(Utc::now());
        let active = embedding_backlog::ActiveModel {
            news_id: Set(news_id),
            attempts: Set(1),
            last_error: Set(Some(error.to_string())),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        EmbeddingBacklog::insert(active)
            .on_conflict(
                OnConflict::column(embedding_backlog::Column::NewsId)
                    .update_columns([
                        embedding_backlog::Column::LastError,
                        embedding_backlog::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(())
    }

    /// Oldest backlog entries first.
    pub async fn backlog_batch(
        &self,
        limit: u64,
    ) -> Result<Vec<embedding_backlog::Model>, RepositoryError> {
        EmbeddingBacklog::find()
            .order_by_asc(embedding_backlog::Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn backlog_remove(&self, id: i64) -> Result<(), RepositoryError> {
        EmbeddingBacklog::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(())
    }

    /// Record a failed retry attempt.
    pub async fn backlog_mark_failed(
        &self,
        entry: embedding_backlog::Model,
        error: &str,
    ) -> Result<(), RepositoryError> {
        let attempts = entry.attempts + 1;
        let mut active: embedding_backlog::ActiveModel = entry.into();
        active.attempts = Set(attempts);
        active.last_error = Set(Some(error.to_string()));
        active.updated_at = Set(to_db_time(Utc::now()));

        active
            .update(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::repositories::news::{NewNews, NewsRepository};

    async fn saved_news(db: &DatabaseConnection, title: &str) -> i64 {
        let repo = NewsRepository::new(Arc::new(db.clone()));
        let published_at = Utc::now();
        repo.insert_if_new(NewNews {
            source: "yonhap".to_string(),
            url: "https://news.example/1".to_string(),
            published_at,
            title: title.to_string(),
            body: "본문 ".repeat(30),
            lang: "ko".to_string(),
            dedup_key: crate::ingest::normalizer::dedup_key(title, "yonhap", published_at),
        })
        .await
        .unwrap()
        .unwrap()
        .id
    }

    fn embedding(dim: usize) -> Embedding {
        Embedding {
            vector: (0..dim).map(|i| i as f32 / dim as f32).collect(),
            norm: 1.0,
            model_version: "default-e5-small".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_and_decode_round_trip() {
        let db = test_pool().await;
        let news_id = saved_news(&db, "기사").await;
        let repo = EmbeddingRepository::new(Arc::new(db));

        repo.upsert(news_id, &embedding(384)).await.unwrap();

        let stored = repo.get(news_id).await.unwrap().unwrap();
        assert_eq!(stored.decode_vector().len(), 384);
        assert_eq!(stored.model_version, "default-e5-small");

        // Upsert replaces in place; still one row
        repo.upsert(news_id, &embedding(384)).await.unwrap();
        assert_eq!(repo.get_many(&[news_id]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn backlog_push_and_drain_cycle() {
        let db = test_pool().await;
        let news_id = saved_news(&db, "실패 기사").await;
        let repo = EmbeddingRepository::new(Arc::new(db));

        repo.backlog_push(news_id, "timeout").await.unwrap();
        repo.backlog_push(news_id, "timeout again").await.unwrap();

        let batch = repo.backlog_batch(10).await.unwrap();
        assert_eq!(batch.len(), 1, "push is idempotent per news id");
        assert_eq!(batch[0].news_id, news_id);

        repo.backlog_remove(batch[0].id).await.unwrap();
        assert!(repo.backlog_batch(10).await.unwrap().is_empty());
    }
}
