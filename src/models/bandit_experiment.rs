//! Bandit experiment entity model
//!
//! Defines which selection algorithm runs over the ranking arms and its
//! hyperparameters (ε for ε-greedy, α/β priors for Thompson sampling).

use std::fmt;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "bandit_experiments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub name: String,

    /// One of epsilon_greedy, ucb1, thompson
    pub algorithm: String,

    pub epsilon: f64,
    pub alpha: f64,
    pub beta: f64,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bandit_arm::Entity")]
    Arms,
}

impl Related<super::bandit_arm::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Arms.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Selection algorithm for a bandit experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanditAlgorithm {
    EpsilonGreedy,
    Ucb1,
    Thompson,
}

impl BanditAlgorithm {
    pub const fn as_str(self) -> &'static str {
        match self {
            BanditAlgorithm::EpsilonGreedy => "epsilon_greedy",
            BanditAlgorithm::Ucb1 => "ucb1",
            BanditAlgorithm::Thompson => "thompson",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "epsilon_greedy" => Some(BanditAlgorithm::EpsilonGreedy),
            "ucb1" => Some(BanditAlgorithm::Ucb1),
            "thompson" => Some(BanditAlgorithm::Thompson),
            _ => None,
        }
    }
}

impl fmt::Display for BanditAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
