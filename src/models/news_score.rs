//! News score entity model
//!
//! One-to-one with news. Holds the importance in [0,10], the normalized
//! rank score in [0,1], the structured scoring reason, and the optional ML
//! probability and summary with their model version.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "news_scores")]
pub struct Model {
    /// News id this score belongs to (primary key, one row per article)
    #[sea_orm(primary_key, auto_increment = false)]
    pub news_id: i64,

    /// Importance in [0, 10]
    pub importance: f64,

    /// Structured scoring reason (see [`ScoreReason`])
    #[sea_orm(column_type = "JsonBinary")]
    pub reason: JsonValue,

    /// Normalized composite ordering key in [0, 1]
    pub rank_score: f64,

    /// ML importance probability in [0, 1], null until the model has scored
    pub importance_p: Option<f64>,

    /// Version of the model that produced importance_p / summary
    pub model_version: Option<String>,

    /// Model summary, at most 240 characters
    pub summary: Option<String>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::news::Entity",
        from = "Column::NewsId",
        to = "super::news::Column::Id"
    )]
    News,
}

impl Related<super::news::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::News.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Structured breakdown of how a rule score was assembled.
///
/// Persisted as a JSON object in the `reason` column; always a map, never a
/// string.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct ScoreReason {
    /// Weight of the originating source in [0, 1]
    pub source_weight: f64,
    /// Bounded ticker match strength in [0, 1]
    pub tickers_hit: f64,
    /// Capped keyword contribution in [0, 1]
    pub keywords_hit: f64,
    /// Freshness bucket value
    pub freshness: f64,
    /// Penalty applied for too-short or suspicious content, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_penalty: Option<f64>,
    /// Issuer codes found in the article text
    pub tickers_found: Vec<String>,
}

impl ScoreReason {
    /// Serialize into the JSON value stored in the reason column.
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or_else(|_| JsonValue::Object(Default::default()))
    }

    /// Parse the stored reason column back into a structured value.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}
