//! # Score Repository
//!
//! Upserts the rule score written at ingest time and merges in model outputs
//! when the remote scorer responds.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use crate::error::RepositoryError;
use crate::ingest::rule_scorer::RuleScore;
use crate::models::news_score::{self, Entity as NewsScore};
use crate::repositories::to_db_time;

#[derive(Debug, Clone)]
pub struct ScoreRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ScoreRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Write or replace the rule score for an article.
    pub async fn upsert_rule(
        &self,
        news_id: i64,
        score: &RuleScore,
    ) -> Result<(), RepositoryError> {
        let now = to_db_time(Utc::now());
        let active = news_score::ActiveModel {
            news_id: Set(news_id),
            importance: Set(score.importance),
            reason: Set(score.reason.to_json()),
            rank_score: Set(score.rank_score),
            importance_p: Set(None),
            model_version: Set(None),
            summary: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        NewsScore::insert(active)
            .on_conflict(
                OnConflict::column(news_score::Column::NewsId)
                    .update_columns([
                        news_score::Column::Importance,
                        news_score::Column::Reason,
                        news_score::Column::RankScore,
                        news_score::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(())
    }

    /// Merge remote model outputs into an existing score row.
    ///
    /// The ML probability takes over the feed ordering key; the rule-derived
    /// importance and reason remain for explainability.
    pub async fn apply_model_outputs(
        &self,
        news_id: i64,
        importance_p: Option<f64>,
        model_version: Option<String>,
        summary: Option<String>,
    ) -> Result<(), RepositoryError> {
        let Some(existing) = NewsScore::find_by_id(news_id)
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?
        else {
            return Err(RepositoryError::not_found("news_score", news_id));
        };

        let mut active: news_score::ActiveModel = existing.into();
        if let Some(p) = importance_p {
            let p = p.clamp(0.0, 1.0);
            active.importance_p = Set(Some(p));
            active.rank_score = Set(p);
        }
        if model_version.is_some() {
            active.model_version = Set(model_version);
        }
        if let Some(summary) = summary {
            active.summary = Set(Some(truncate_summary(&summary)));
        }
        active.updated_at = Set(to_db_time(Utc::now()));

        active
            .update(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(())
    }

    pub async fn get(&self, news_id: i64) -> Result<Option<news_score::Model>, RepositoryError> {
        NewsScore::find_by_id(news_id)
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}

/// Summaries persist at 240 characters or less.
fn truncate_summary(summary: &str) -> String {
    if summary.chars().count() <= 240 {
        summary.to_string()
    } else {
        summary.chars().take(239).collect::<String>() + "…"
    }
}
