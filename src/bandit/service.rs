//! Bandit decision loop.
//!
//! Resolves the request context, selects an arm under the active
//! experiment's algorithm, persists the decision, and asks the chosen arm
//! for its ranking. Feedback folds back into per-context state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Timelike, Utc};
use metrics::counter;
use rand::thread_rng;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use utoipa::ToSchema;

use crate::bandit::arms::{ArmContext, RankingArm};
use crate::bandit::{ArmStats, select_epsilon_greedy, select_thompson, select_ucb1};
use crate::error::RepositoryError;
use crate::models::bandit_arm::ArmKind;
use crate::models::{BanditAlgorithm, RewardType};
use crate::repositories::{ArmPerformance, BanditRepository};

/// Errors from the bandit loop. Handlers downgrade `Unavailable` to the
/// baseline ranker silently.
#[derive(Debug, Error)]
pub enum BanditError {
    #[error("bandit unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// A served bandit recommendation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BanditRecommendation {
    pub decision_id: i64,
    pub arm: String,
    pub selection_reason: String,
    pub news_ids: Vec<i64>,
}

/// Aggregate performance report.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BanditPerformance {
    pub experiment: String,
    pub algorithm: String,
    pub arms: Vec<ArmPerformance>,
}

/// Selects among ranking arms and records outcomes.
pub struct BanditService {
    repo: BanditRepository,
    arms: HashMap<ArmKind, Arc<dyn RankingArm>>,
}

impl BanditService {
    pub fn new(repo: BanditRepository, arms: HashMap<ArmKind, Arc<dyn RankingArm>>) -> Self {
        Self { repo, arms }
    }

    /// Run one decision: pick an arm, persist the pull, return its ranking.
    pub async fn recommend(
        &self,
        user_id: Option<String>,
        limit: usize,
    ) -> Result<BanditRecommendation, BanditError> {
        let Some((experiment, arm_models)) = self.repo.active_experiment_with_arms().await? else {
            return Err(BanditError::Unavailable(
                "no active bandit experiment".to_string(),
            ));
        };
        if arm_models.is_empty() {
            return Err(BanditError::Unavailable("experiment has no arms".to_string()));
        }

        let now = Utc::now();
        let context_key = context_key(user_id.as_deref(), now.hour());

        let arm_ids: Vec<i64> = arm_models.iter().map(|arm| arm.id).collect();
        let states = self
            .repo
            .states_for(experiment.id, &context_key, &arm_ids)
            .await?;

        let stats: Vec<ArmStats> = arm_models
            .iter()
            .map(|arm| {
                states
                    .iter()
                    .find(|state| state.arm_id == arm.id)
                    .map(|state| ArmStats {
                        arm_id: arm.id,
                        pulls: state.pulls,
                        total_reward: state.total_reward,
                    })
                    .unwrap_or(ArmStats {
                        arm_id: arm.id,
                        pulls: 0,
                        total_reward: 0.0,
                    })
            })
            .collect();

        let algorithm = BanditAlgorithm::parse(&experiment.algorithm)
            .unwrap_or(BanditAlgorithm::EpsilonGreedy);

        let selection = {
            let mut rng = thread_rng();
            match algorithm {
                BanditAlgorithm::EpsilonGreedy => {
                    select_epsilon_greedy(&stats, experiment.epsilon, &mut rng)
                }
                BanditAlgorithm::Ucb1 => select_ucb1(&stats),
                BanditAlgorithm::Thompson => {
                    select_thompson(&stats, experiment.alpha, experiment.beta, &mut rng)
                }
            }
        }
        .ok_or_else(|| BanditError::Unavailable("selection produced no arm".to_string()))?;

        let chosen = &arm_models[selection.index];
        let kind = ArmKind::parse(&chosen.algorithm_type)
            .ok_or_else(|| BanditError::Unavailable(format!("unknown arm {}", chosen.algorithm_type)))?;

        let context = ArmContext {
            user_id: user_id.clone(),
            limit,
            now,
        };

        let news_ids = match self.rank_with(kind, &context).await {
            Ok(ids) => ids,
            Err(err) => {
                // A failing arm degrades to recency rather than failing the request
                warn!(arm = %kind, error = %err, "arm ranking failed; degrading to recent");
                counter!("bandit_arm_degraded_total", "arm" => kind.as_str()).increment(1);
                self.rank_with(ArmKind::Recent, &context).await?
            }
        };

        let decision = self
            .repo
            .record_decision(
                experiment.id,
                chosen.id,
                &context_key,
                user_id,
                selection.decision_value,
                selection.reason,
                &news_ids,
            )
            .await?;

        counter!(
            "bandit_decisions_total",
            "arm" => kind.as_str(),
            "reason" => selection.reason.as_str()
        )
        .increment(1);

        Ok(BanditRecommendation {
            decision_id: decision.id,
            arm: chosen.algorithm_type.clone(),
            selection_reason: selection.reason.as_str().to_string(),
            news_ids,
        })
    }

    /// Record feedback for a decision. Returns the normalized reward.
    pub async fn reward(
        &self,
        decision_id: i64,
        reward_type: RewardType,
        raw_value: f64,
    ) -> Result<f64, BanditError> {
        let value = self
            .repo
            .record_reward(decision_id, reward_type, raw_value)
            .await?;
        counter!("bandit_rewards_total", "kind" => reward_type.as_str()).increment(1);
        Ok(value)
    }

    /// Per-arm aggregates for the active experiment.
    pub async fn performance(&self) -> Result<BanditPerformance, BanditError> {
        let Some((experiment, _)) = self.repo.active_experiment_with_arms().await? else {
            return Err(BanditError::Unavailable(
                "no active bandit experiment".to_string(),
            ));
        };

        let arms = self.repo.performance(experiment.id).await?;
        Ok(BanditPerformance {
            experiment: experiment.name,
            algorithm: experiment.algorithm,
            arms,
        })
    }

    async fn rank_with(
        &self,
        kind: ArmKind,
        context: &ArmContext,
    ) -> Result<Vec<i64>, RepositoryError> {
        match self.arms.get(&kind) {
            Some(arm) => arm.rank(context).await,
            None => Ok(Vec::new()),
        }
    }
}

/// Context key from the request: hour of day and authentication state.
fn context_key(user_id: Option<&str>, hour: u32) -> String {
    let audience = if user_id.is_some() { "user" } else { "anon" };
    format!("hour:{:02}|{}", hour, audience)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::{bandit_arm, bandit_experiment};
    use crate::repositories::to_db_time;
    use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

    struct FixedArm {
        kind: ArmKind,
        ids: Vec<i64>,
    }

    #[async_trait::async_trait]
    impl RankingArm for FixedArm {
        fn kind(&self) -> ArmKind {
            self.kind
        }

        async fn rank(&self, _context: &ArmContext) -> Result<Vec<i64>, RepositoryError> {
            Ok(self.ids.clone())
        }
    }

    async fn seed_experiment(db: &DatabaseConnection, algorithm: &str) -> i64 {
        let experiment = bandit_experiment::ActiveModel {
            name: Set("ranking-arms".to_string()),
            algorithm: Set(algorithm.to_string()),
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

        for kind in crate::models::bandit_arm::ALL_ARM_KINDS {
            bandit_arm::ActiveModel {
                experiment_id: Set(experiment.id),
                name: Set(kind.as_str().to_lowercase()),
                algorithm_type: Set(kind.as_str().to_string()),
                enabled: Set(true),
                ..Default::default()
            }
            .insert(db)
            .await
            .unwrap();
        }

        experiment.id
    }

    fn fixed_arms() -> HashMap<ArmKind, Arc<dyn RankingArm>> {
        let mut arms: HashMap<ArmKind, Arc<dyn RankingArm>> = HashMap::new();
        for (kind, ids) in [
            (ArmKind::Personalized, vec![1, 2]),
            (ArmKind::Popular, vec![3, 4]),
            (ArmKind::Diverse, vec![5, 6]),
            (ArmKind::Recent, vec![7, 8]),
        ] {
            arms.insert(kind, Arc::new(FixedArm { kind, ids }));
        }
        arms
    }

    #[tokio::test]
    async fn recommend_persists_a_decision_with_news_ids() {
        let db = test_pool().await;
        seed_experiment(&db, "ucb1").await;

        let repo = BanditRepository::new(Arc::new(db));
        let service = BanditService::new(repo.clone(), fixed_arms());

        let recommendation = service.recommend(None, 2).await.unwrap();
        assert!(!recommendation.news_ids.is_empty());

        let decision = repo
            .decision(recommendation.decision_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decision.selection_reason, recommendation.selection_reason);
    }

    #[tokio::test]
    async fn ucb1_visits_every_arm_before_repeating() {
        let db = test_pool().await;
        let experiment_id = seed_experiment(&db, "ucb1").await;

        let repo = BanditRepository::new(Arc::new(db));
        let service = BanditService::new(repo.clone(), fixed_arms());

        for _ in 0..4 {
            service.recommend(None, 2).await.unwrap();
        }

        let performance = repo.performance(experiment_id).await.unwrap();
        assert!(performance.iter().all(|arm| arm.pulls == 1));
    }

    #[tokio::test]
    async fn rewards_flow_back_into_performance() {
        let db = test_pool().await;
        seed_experiment(&db, "epsilon_greedy").await;

        let repo = BanditRepository::new(Arc::new(db));
        let service = BanditService::new(repo, fixed_arms());

        let recommendation = service.recommend(Some("user-1".to_string()), 2).await.unwrap();
        let value = service
            .reward(recommendation.decision_id, RewardType::DwellTime, 90.0)
            .await
            .unwrap();
        assert_eq!(value, 1.0, "dwell saturates at one minute");

        let performance = service.performance().await.unwrap();
        let total: f64 = performance.arms.iter().map(|arm| arm.total_reward).sum();
        assert_eq!(total, 1.0);
    }

    #[tokio::test]
    async fn no_active_experiment_is_unavailable() {
        let db = test_pool().await;
        let service = BanditService::new(BanditRepository::new(Arc::new(db)), fixed_arms());

        let err = service.recommend(None, 2).await.unwrap_err();
        assert!(matches!(err, BanditError::Unavailable(_)));
    }

    #[test]
    fn context_key_buckets_by_hour_and_audience() {
        assert_eq!(context_key(None, 9), "hour:09|anon");
        assert_eq!(context_key(Some("u"), 14), "hour:14|user");
    }
}
