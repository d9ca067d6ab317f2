//! # Topic Repository
//!
//! Persists topic assignments produced by the clustering batch. One row per
//! article, replaced wholesale each time its topic changes.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set};

use crate::error::RepositoryError;
use crate::models::news_topic::{self, Entity as NewsTopic};
use crate::repositories::to_db_time;

/// One clustering outcome for one article.
#[derive(Debug, Clone)]
pub struct TopicAssignment {
    pub news_id: i64,
    pub topic_id: i64,
    pub group_id: Option<i64>,
    pub topic_keywords: Vec<String>,
    pub similarity_score: f64,
    pub clustering_method: String,
}

#[derive(Debug, Clone)]
pub struct TopicRepository {
    pub db: Arc<DatabaseConnection>,
}

impl TopicRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Write the batch of assignments, replacing any existing row per
    /// article. An article carries at most one topic.
    pub async fn upsert_assignments(
        &self,
        assignments: Vec<TopicAssignment>,
    ) -> Result<(), RepositoryError> {
        let now = to_db_time(Utc::now());

        for assignment in assignments {
            let active = news_topic::ActiveModel {
                news_id: Set(assignment.news_id),
                topic_id: Set(assignment.topic_id),
                group_id: Set(assignment.group_id),
                topic_keywords: Set(serde_json::json!(assignment.topic_keywords)),
                similarity_score: Set(assignment.similarity_score),
                clustering_method: Set(assignment.clustering_method),
                created_at: Set(now),
            };

            NewsTopic::insert(active)
                .on_conflict(
                    OnConflict::column(news_topic::Column::NewsId)
                        .update_columns([
                            news_topic::Column::TopicId,
                            news_topic::Column::GroupId,
                            news_topic::Column::TopicKeywords,
                            news_topic::Column::SimilarityScore,
                            news_topic::Column::ClusteringMethod,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(&*self.db)
                .await
                .map_err(RepositoryError::database_error)?;
        }

        Ok(())
    }

    pub async fn get_for_news_ids(
        &self,
        news_ids: &[i64],
    ) -> Result<Vec<news_topic::Model>, RepositoryError> {
        if news_ids.is_empty() {
            return Ok(Vec::new());
        }

        NewsTopic::find()
            .filter(news_topic::Column::NewsId.is_in(news_ids.to_vec()))
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Highest topic id currently assigned, so new topics continue the
    /// sequence across batches.
    pub async fn max_topic_id(&self) -> Result<i64, RepositoryError> {
        let max: Option<i64> = NewsTopic::find()
            .select_only()
            .column_as(news_topic::Column::TopicId.max(), "max_topic")
            .into_tuple()
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?
            .flatten();

        Ok(max.unwrap_or(0))
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
            url: "https://news.example/t".to_string(),
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

    #[tokio::test]
    async fn assignments_replace_per_article() {
        let db = test_pool().await;
        let news_id = saved_news(&db, "기사 하나").await;
        let repo = TopicRepository::new(Arc::new(db));

        repo.upsert_assignments(vec![TopicAssignment {
            news_id,
            topic_id: 1,
            group_id: None,
            topic_keywords: vec!["실적".to_string()],
            similarity_score: 0.9,
            clustering_method: "cosine".to_string(),
        }])
        .await
        .unwrap();

        repo.upsert_assignments(vec![TopicAssignment {
            news_id,
            topic_id: 2,
            group_id: Some(7),
            topic_keywords: vec!["배당".to_string()],
            similarity_score: 0.8,
            clustering_method: "cosine".to_string(),
        }])
        .await
        .unwrap();

        let stored = repo.get_for_news_ids(&[news_id]).await.unwrap();
        assert_eq!(stored.len(), 1, "one topic per article");
        assert_eq!(stored[0].topic_id, 2);
        assert_eq!(stored[0].group_id, Some(7));
        assert_eq!(repo.max_topic_id().await.unwrap(), 2);
    }
}
