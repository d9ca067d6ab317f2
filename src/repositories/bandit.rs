//! # Bandit Repository
//!
//! Persistence for bandit experiments, arms, per-context state, decisions,
//! and rewards. State writes are additive upserts against the unique
//! (experiment, arm, context) triple, so concurrent decisions and feedback
//! merge without ever reading the row first.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use crate::error::RepositoryError;
use crate::models::bandit_arm::{self, Entity as BanditArm};
use crate::models::bandit_decision::{self, Entity as BanditDecision};
use crate::models::bandit_experiment::{self, Entity as BanditExperiment};
use crate::models::bandit_reward::{self, Entity as BanditReward};
use crate::models::bandit_state::{self, Entity as BanditState};
use crate::models::{RewardType, SelectionReason};
use crate::repositories::to_db_time;

/// Aggregated view of one arm for the performance endpoint.
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct ArmPerformance {
    pub arm_id: i64,
    pub name: String,
    pub algorithm_type: String,
    pub pulls: i64,
    pub total_reward: f64,
    pub mean_reward: f64,
}

#[derive(Debug, Clone)]
pub struct BanditRepository {
    pub db: Arc<DatabaseConnection>,
}

impl BanditRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The first active bandit experiment together with its enabled arms.
    pub async fn active_experiment_with_arms(
        &self,
    ) -> Result<Option<(bandit_experiment::Model, Vec<bandit_arm::Model>)>, RepositoryError> {
        let Some(experiment) = BanditExperiment::find()
            .filter(bandit_experiment::Column::IsActive.eq(true))
            .order_by_asc(bandit_experiment::Column::Id)
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?
        else {
            return Ok(None);
        };

        let arms = BanditArm::find()
            .filter(bandit_arm::Column::ExperimentId.eq(experiment.id))
            .filter(bandit_arm::Column::Enabled.eq(true))
            .order_by_asc(bandit_arm::Column::Id)
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(Some((experiment, arms)))
    }

    /// Stored state rows for one context across the given arms.
    pub async fn states_for(
        &self,
        experiment_id: i64,
        context_key: &str,
        arm_ids: &[i64],
    ) -> Result<Vec<bandit_state::Model>, RepositoryError> {
        if arm_ids.is_empty() {
            return Ok(Vec::new());
        }

        BanditState::find()
            .filter(bandit_state::Column::ExperimentId.eq(experiment_id))
            .filter(bandit_state::Column::ContextKey.eq(context_key.to_string()))
            .filter(bandit_state::Column::ArmId.is_in(arm_ids.to_vec()))
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Persist a decision and count the pull against its (experiment, arm,
    /// context) state row in the same transaction. The pull lands through an
    /// additive upsert on the unique triple, so concurrent decisions for the
    /// same context merge instead of racing.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_decision(
        &self,
        experiment_id: i64,
        arm_id: i64,
        context_key: &str,
        user_id: Option<String>,
        decision_value: f64,
        reason: SelectionReason,
        news_ids: &[i64],
    ) -> Result<bandit_decision::Model, RepositoryError> {
        let now = to_db_time(Utc::now());
        let txn = self
            .db
            .begin()
            .await
            .map_err(RepositoryError::database_error)?;

        let decision = bandit_decision::ActiveModel {
            experiment_id: Set(experiment_id),
            arm_id: Set(arm_id),
            context_key: Set(context_key.to_string()),
            user_id: Set(user_id),
            decision_value: Set(decision_value),
            selection_reason: Set(reason.as_str().to_string()),
            news_ids: Set(serde_json::json!(news_ids)),
            decided_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(RepositoryError::database_error)?;

        BanditState::insert(bandit_state::ActiveModel {
            experiment_id: Set(experiment_id),
            arm_id: Set(arm_id),
            context_key: Set(context_key.to_string()),
            pulls: Set(1),
            total_reward: Set(0.0),
            sum_reward_squared: Set(0.0),
            last_pull_at: Set(Some(now)),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([
                bandit_state::Column::ExperimentId,
                bandit_state::Column::ArmId,
                bandit_state::Column::ContextKey,
            ])
            .value(
                bandit_state::Column::Pulls,
                Expr::col((bandit_state::Entity, bandit_state::Column::Pulls)).add(1),
            )
            .value(bandit_state::Column::LastPullAt, Expr::value(now))
            .to_owned(),
        )
        .exec_without_returning(&txn)
        .await
        .map_err(RepositoryError::database_error)?;

        txn.commit()
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(decision)
    }

    /// Append a reward for a decision and fold it into the owning state.
    ///
    /// Returns the normalized reward value written.
    pub async fn record_reward(
        &self,
        decision_id: i64,
        reward_type: RewardType,
        raw_value: f64,
    ) -> Result<f64, RepositoryError> {
        let reward_value = reward_type.normalize(raw_value);
        let txn = self
            .db
            .begin()
            .await
            .map_err(RepositoryError::database_error)?;

        let Some(decision) = BanditDecision::find_by_id(decision_id)
            .one(&txn)
            .await
            .map_err(RepositoryError::database_error)?
        else {
            return Err(RepositoryError::not_found("bandit_decision", decision_id));
        };

        bandit_reward::ActiveModel {
            decision_id: Set(decision_id),
            reward_type: Set(reward_type.as_str().to_string()),
            reward_value: Set(reward_value),
            created_at: Set(to_db_time(Utc::now())),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(RepositoryError::database_error)?;

        // Rewards fold in additively; a decision always created the state
        // row, but the insert arm keeps a late reward from failing if it
        // ever arrives first.
        BanditState::insert(bandit_state::ActiveModel {
            experiment_id: Set(decision.experiment_id),
            arm_id: Set(decision.arm_id),
            context_key: Set(decision.context_key.clone()),
            pulls: Set(0),
            total_reward: Set(reward_value),
            sum_reward_squared: Set(reward_value * reward_value),
            last_pull_at: Set(None),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([
                bandit_state::Column::ExperimentId,
                bandit_state::Column::ArmId,
                bandit_state::Column::ContextKey,
            ])
            .value(
                bandit_state::Column::TotalReward,
                Expr::col((bandit_state::Entity, bandit_state::Column::TotalReward))
                    .add(reward_value),
            )
            .value(
                bandit_state::Column::SumRewardSquared,
                Expr::col((bandit_state::Entity, bandit_state::Column::SumRewardSquared))
                    .add(reward_value * reward_value),
            )
            .to_owned(),
        )
        .exec_without_returning(&txn)
        .await
        .map_err(RepositoryError::database_error)?;

        txn.commit()
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(reward_value)
    }

    pub async fn decision(
        &self,
        decision_id: i64,
    ) -> Result<Option<bandit_decision::Model>, RepositoryError> {
        BanditDecision::find_by_id(decision_id)
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Per-arm aggregates across every context, for the performance endpoint.
    pub async fn performance(
        &self,
        experiment_id: i64,
    ) -> Result<Vec<ArmPerformance>, RepositoryError> {
        let arms = BanditArm::find()
            .filter(bandit_arm::Column::ExperimentId.eq(experiment_id))
            .order_by_asc(bandit_arm::Column::Id)
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        let states = BanditState::find()
            .filter(bandit_state::Column::ExperimentId.eq(experiment_id))
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(arms
            .into_iter()
            .map(|arm| {
                let (pulls, total_reward) = states
                    .iter()
                    .filter(|state| state.arm_id == arm.id)
                    .fold((0i64, 0.0f64), |(p, r), state| {
                        (p + state.pulls, r + state.total_reward)
                    });

                ArmPerformance {
                    arm_id: arm.id,
                    name: arm.name,
                    algorithm_type: arm.algorithm_type,
                    pulls,
                    total_reward,
                    mean_reward: if pulls == 0 { 0.0 } else { total_reward / pulls as f64 },
                }
            })
            .collect())
    }

    /// Count of persisted decisions for one state triple; test support for
    /// the pulls-equal-decisions invariant.
    pub async fn decision_count(
        &self,
        experiment_id: i64,
        arm_id: i64,
        context_key: &str,
    ) -> Result<u64, RepositoryError> {
        use sea_orm::PaginatorTrait;

        BanditDecision::find()
            .filter(bandit_decision::Column::ExperimentId.eq(experiment_id))
            .filter(bandit_decision::Column::ArmId.eq(arm_id))
            .filter(bandit_decision::Column::ContextKey.eq(context_key.to_string()))
            .count(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::bandit_arm::ArmKind;

    async fn seed(db: &DatabaseConnection) -> (i64, Vec<i64>) {
        let experiment = bandit_experiment::ActiveModel {
            name: Set("ranking-arms".to_string()),
            algorithm: Set("epsilon_greedy".to_string()),
            epsilon: Set(0.1),
            alpha: Set(1.0),
            beta: Set(1.0),
            is_active: Set(true),
            created_at: Set(to_db_time(Utc::now())),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();

        let mut arm_ids = Vec::new();
        for kind in [ArmKind::Personalized, ArmKind::Popular] {
            let arm = bandit_arm::ActiveModel {
                experiment_id: Set(experiment.id),
                name: Set(kind.as_str().to_lowercase()),
                algorithm_type: Set(kind.as_str().to_string()),
                enabled: Set(true),
                ..Default::default()
            }
            .insert(db)
            .await
            .unwrap();
            arm_ids.push(arm.id);
        }

        (experiment.id, arm_ids)
    }

    #[tokio::test]
    async fn pulls_match_decision_count() {
        let db = test_pool().await;
        let (experiment_id, arm_ids) = seed(&db).await;
        let repo = BanditRepository::new(Arc::new(db));

        for _ in 0..5 {
            repo.record_decision(
                experiment_id,
                arm_ids[0],
                "hour:9",
                None,
                0.5,
                SelectionReason::Exploitation,
                &[1, 2, 3],
            )
            .await
            .unwrap();
        }

        let states = repo
            .states_for(experiment_id, "hour:9", &arm_ids)
            .await
            .unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].pulls, 5);

        let decisions = repo
            .decision_count(experiment_id, arm_ids[0], "hour:9")
            .await
            .unwrap();
        assert_eq!(states[0].pulls as u64, decisions);
    }

    #[tokio::test]
    async fn rewards_accumulate_into_state_totals() {
        let db = test_pool().await;
        let (experiment_id, arm_ids) = seed(&db).await;
        let repo = BanditRepository::new(Arc::new(db));

        let decision = repo
            .record_decision(
                experiment_id,
                arm_ids[1],
                "hour:14",
                Some("user-1".to_string()),
                0.7,
                SelectionReason::Exploration,
                &[4, 5],
            )
            .await
            .unwrap();

        let click = repo
            .record_reward(decision.id, RewardType::Click, 1.0)
            .await
            .unwrap();
        assert_eq!(click, 1.0);

        // 30 seconds of dwell normalizes to 0.5
        let dwell = repo
            .record_reward(decision.id, RewardType::DwellTime, 30.0)
            .await
            .unwrap();
        assert_eq!(dwell, 0.5);

        let states = repo
            .states_for(experiment_id, "hour:14", &arm_ids)
            .await
            .unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].pulls, 1);
        assert!((states[0].total_reward - 1.5).abs() < 1e-9);
        assert!((states[0].sum_reward_squared - 1.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn reward_for_unknown_decision_is_not_found() {
        let db = test_pool().await;
        seed(&db).await;
        let repo = BanditRepository::new(Arc::new(db));

        let err = repo
            .record_reward(9999, RewardType::Click, 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn performance_aggregates_across_contexts() {
        let db = test_pool().await;
        let (experiment_id, arm_ids) = seed(&db).await;
        let repo = BanditRepository::new(Arc::new(db));

        for context in ["hour:9", "hour:14"] {
            let decision = repo
                .record_decision(
                    experiment_id,
                    arm_ids[0],
                    context,
                    None,
                    0.5,
                    SelectionReason::Exploitation,
                    &[1],
                )
                .await
                .unwrap();
            repo.record_reward(decision.id, RewardType::Click, 1.0)
                .await
                .unwrap();
        }

        let performance = repo.performance(experiment_id).await.unwrap();
        let personalized = performance
            .iter()
            .find(|p| p.arm_id == arm_ids[0])
            .unwrap();
        assert_eq!(personalized.pulls, 2);
        assert_eq!(personalized.total_reward, 2.0);
        assert_eq!(personalized.mean_reward, 1.0);
    }
}
