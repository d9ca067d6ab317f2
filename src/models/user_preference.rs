//! User preference entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "user_preferences")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,

    /// Issuer codes the user follows, JSON array of strings
    #[sea_orm(column_type = "JsonBinary")]
    pub interest_tickers: JsonValue,

    /// Keywords the user follows, JSON array of strings
    #[sea_orm(column_type = "JsonBinary")]
    pub interest_keywords: JsonValue,

    pub personalization_enabled: bool,
    pub diversity_weight: f64,
    pub is_active: bool,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Interest tickers as owned strings.
    pub fn tickers(&self) -> Vec<String> {
        string_array(&self.interest_tickers)
    }

    /// Interest keywords as owned strings.
    pub fn keywords(&self) -> Vec<String> {
        string_array(&self.interest_keywords)
    }
}

fn string_array(value: &JsonValue) -> Vec<String> {
    value
        .as_array()
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}
