//! Bandit arm entity model

use std::fmt;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "bandit_arms")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub experiment_id: i64,
    pub name: String,

    /// One of PERSONALIZED, POPULAR, DIVERSE, RECENT
    pub algorithm_type: String,

    pub enabled: bool,
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

/// Ranking strategy an arm stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArmKind {
    Personalized,
    Popular,
    Diverse,
    Recent,
}

impl ArmKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ArmKind::Personalized => "PERSONALIZED",
            ArmKind::Popular => "POPULAR",
            ArmKind::Diverse => "DIVERSE",
            ArmKind::Recent => "RECENT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PERSONALIZED" => Some(ArmKind::Personalized),
            "POPULAR" => Some(ArmKind::Popular),
            "DIVERSE" => Some(ArmKind::Diverse),
            "RECENT" => Some(ArmKind::Recent),
            _ => None,
        }
    }
}

pub const ALL_ARM_KINDS: &[ArmKind] = &[
    ArmKind::Personalized,
    ArmKind::Popular,
    ArmKind::Diverse,
    ArmKind::Recent,
];

impl fmt::Display for ArmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
