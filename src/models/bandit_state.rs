//! Bandit state entity model
//!
//! Accumulated statistics per (experiment, arm, context). The unique index on
//! that triple makes the reward upsert merge-safe; readers see monotonically
//! non-decreasing pull counts.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "bandit_states")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub experiment_id: i64,
    pub arm_id: i64,
    pub context_key: String,
    pub pulls: i64,
    pub total_reward: f64,
    pub sum_reward_squared: f64,
    pub last_pull_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bandit_experiment::Entity",
        from = "Column::ExperimentId",
        to = "super::bandit_experiment::Column::Id"
    )]
    Experiment,
}

impl Related<super::bandit_experiment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Experiment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Mean observed reward for this state, zero before the first pull.
    pub fn mean_reward(&self) -> f64 {
        if self.pulls == 0 {
            0.0
        } else {
            self.total_reward / self.pulls as f64
        }
    }
}
