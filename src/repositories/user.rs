//! # User Repositories
//!
//! Anonymous visitor tracking and persisted personalization preferences.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use crate::error::RepositoryError;
use crate::models::anonymous_user::{self, Entity as AnonymousUser};
use crate::models::user_preference::{self, Entity as UserPreference};
use crate::repositories::to_db_time;

/// A new visit is a new session after this much idle time.
const SESSION_GAP_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct AnonymousUserRepository {
    pub db: Arc<DatabaseConnection>,
}

impl AnonymousUserRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Record a sighting of an anon id, creating the row on first sight and
    /// bumping the session counter after an idle gap.
    pub async fn touch(
        &self,
        anon_id: &str,
        user_agent: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();

        match AnonymousUser::find_by_id(anon_id.to_string())
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?
        {
            Some(existing) => {
                let idle = now.signed_duration_since(existing.last_seen_at.with_timezone(&Utc));
                let new_session = idle > Duration::minutes(SESSION_GAP_MINUTES);

                let mut active: anonymous_user::ActiveModel = existing.clone().into();
                active.last_seen_at = Set(to_db_time(now));
                if new_session {
                    active.session_count = Set(existing.session_count + 1);
                }
                active
                    .update(&*self.db)
                    .await
                    .map_err(RepositoryError::database_error)?;
            }
            None => {
                let active = anonymous_user::ActiveModel {
                    anon_id: Set(anon_id.to_string()),
                    first_seen_at: Set(to_db_time(now)),
                    last_seen_at: Set(to_db_time(now)),
                    session_count: Set(1),
                    user_agent: Set(user_agent.map(|ua| ua.to_string())),
                    country: Set(None),
                    is_active: Set(true),
                };
                active
                    .insert(&*self.db)
                    .await
                    .map_err(RepositoryError::database_error)?;
            }
        }

        Ok(())
    }

    pub async fn get(
        &self,
        anon_id: &str,
    ) -> Result<Option<anonymous_user::Model>, RepositoryError> {
        AnonymousUser::find_by_id(anon_id.to_string())
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}

#[derive(Debug, Clone)]
pub struct UserPreferenceRepository {
    pub db: Arc<DatabaseConnection>,
}

impl UserPreferenceRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get(
        &self,
        user_id: &str,
    ) -> Result<Option<user_preference::Model>, RepositoryError> {
        UserPreference::find_by_id(user_id.to_string())
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Create or replace the preference row for a user.
    pub async fn upsert(
        &self,
        user_id: &str,
        interest_tickers: Vec<String>,
        interest_keywords: Vec<String>,
        personalization_enabled: bool,
        diversity_weight: f64,
    ) -> Result<user_preference::Model, RepositoryError> {
        let now = to_db_time(Utc::now());
        let diversity_weight = diversity_weight.clamp(0.0, 1.0);

        let active = user_preference::ActiveModel {
            user_id: Set(user_id.to_string()),
            interest_tickers: Set(serde_json::json!(interest_tickers)),
            interest_keywords: Set(serde_json::json!(interest_keywords)),
            personalization_enabled: Set(personalization_enabled),
            diversity_weight: Set(diversity_weight),
            is_active: Set(true),
            updated_at: Set(now),
        };

        UserPreference::insert(active)
            .on_conflict(
                OnConflict::column(user_preference::Column::UserId)
                    .update_columns([
                        user_preference::Column::InterestTickers,
                        user_preference::Column::InterestKeywords,
                        user_preference::Column::PersonalizationEnabled,
                        user_preference::Column::DiversityWeight,
                        user_preference::Column::IsActive,
                        user_preference::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        self.get(user_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("user_preference", user_id))
    }
}
