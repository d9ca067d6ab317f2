//! Bandit decision entity model

use std::fmt;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "bandit_decisions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub experiment_id: i64,
    pub arm_id: i64,
    pub context_key: String,
    pub user_id: Option<String>,

    /// Score the selection algorithm assigned to the chosen arm
    pub decision_value: f64,

    /// One of EXPLORATION, EXPLOITATION, RANDOM
    pub selection_reason: String,

    /// Article ids returned by the chosen arm, JSON array of i64
    #[sea_orm(column_type = "JsonBinary")]
    pub news_ids: JsonValue,

    pub decided_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bandit_experiment::Entity",
        from = "Column::ExperimentId",
        to = "super::bandit_experiment::Column::Id"
    )]
    Experiment,
    #[sea_orm(has_many = "super::bandit_reward::Entity")]
    Rewards,
}

impl Related<super::bandit_experiment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Experiment.def()
    }
}

impl Related<super::bandit_reward::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Rewards.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Why an arm was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    Exploration,
    Exploitation,
    Random,
}

impl SelectionReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            SelectionReason::Exploration => "EXPLORATION",
            SelectionReason::Exploitation => "EXPLOITATION",
            SelectionReason::Random => "RANDOM",
        }
    }
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
