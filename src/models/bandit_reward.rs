//! Bandit reward entity model

use std::fmt;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "bandit_rewards")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub decision_id: i64,

    /// One of CLICK, DWELL_TIME, ENGAGEMENT
    pub reward_type: String,

    /// Normalized reward in [0, 1]
    pub reward_value: f64,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bandit_decision::Entity",
        from = "Column::DecisionId",
        to = "super::bandit_decision::Column::Id"
    )]
    Decision,
}

impl Related<super::bandit_decision::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Decision.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Feedback event kind mapped onto a normalized reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardType {
    Click,
    DwellTime,
    Engagement,
}

impl RewardType {
    pub const fn as_str(self) -> &'static str {
        match self {
            RewardType::Click => "CLICK",
            RewardType::DwellTime => "DWELL_TIME",
            RewardType::Engagement => "ENGAGEMENT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CLICK" => Some(RewardType::Click),
            "DWELL_TIME" => Some(RewardType::DwellTime),
            "ENGAGEMENT" => Some(RewardType::Engagement),
            _ => None,
        }
    }

    /// Normalize a raw feedback value into the reward range [0, 1].
    ///
    /// Click is always a full reward; dwell time saturates at one minute;
    /// engagement is caller-supplied and clipped.
    pub fn normalize(self, raw: f64) -> f64 {
        match self {
            RewardType::Click => 1.0,
            RewardType::DwellTime => (raw / 60.0).clamp(0.0, 1.0),
            RewardType::Engagement => raw.clamp(0.0, 1.0),
        }
    }
}

impl fmt::Display for RewardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
