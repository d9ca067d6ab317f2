//! # Data Models
//!
//! This module contains all the data models used throughout the newsrank
//! service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod anonymous_user;
pub mod bandit_arm;
pub mod bandit_decision;
pub mod bandit_experiment;
pub mod bandit_reward;
pub mod bandit_state;
pub mod click_log;
pub mod embedding_backlog;
pub mod experiment;
pub mod experiment_metrics_daily;
pub mod feature_flag;
pub mod impression_log;
pub mod news;
pub mod news_embedding;
pub mod news_score;
pub mod news_topic;
pub mod user_preference;

pub use anonymous_user::Entity as AnonymousUser;
pub use bandit_arm::{ArmKind, Entity as BanditArm};
pub use bandit_decision::{Entity as BanditDecision, SelectionReason};
pub use bandit_experiment::{BanditAlgorithm, Entity as BanditExperiment};
pub use bandit_reward::{Entity as BanditReward, RewardType};
pub use bandit_state::Entity as BanditState;
pub use click_log::Entity as ClickLog;
pub use embedding_backlog::Entity as EmbeddingBacklog;
pub use experiment::Entity as Experiment;
pub use experiment_metrics_daily::Entity as ExperimentMetricsDaily;
pub use feature_flag::Entity as FeatureFlag;
pub use impression_log::Entity as ImpressionLog;
pub use news::Entity as News;
pub use news_embedding::Entity as NewsEmbedding;
pub use news_score::{Entity as NewsScore, ScoreReason};
pub use news_topic::Entity as NewsTopic;
pub use user_preference::Entity as UserPreference;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "newsrank".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
