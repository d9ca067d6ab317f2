//! Experiment entity model
//!
//! A/B experiment definitions. Allocation maps variant name to a percentage;
//! the percentages must sum to 100 for the bucketer to cover every user.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "experiments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub experiment_key: String,

    /// Variant names, JSON array of strings
    #[sea_orm(column_type = "JsonBinary")]
    pub variants: JsonValue,

    /// Variant name -> allocation percent, JSON object
    #[sea_orm(column_type = "JsonBinary")]
    pub allocation: JsonValue,

    pub start_date: Option<DateTimeWithTimeZone>,
    pub end_date: Option<DateTimeWithTimeZone>,
    pub is_active: bool,
    pub auto_stop_enabled: bool,

    /// CTR degradation (control − treatment) that disables the experiment
    pub auto_stop_threshold: f64,

    /// Impressions per variant required before auto-stop may act
    pub minimum_sample_size: i64,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Allocation as ordered (variant, percent) pairs following the declared
    /// variant order.
    pub fn allocation_pairs(&self) -> Vec<(String, f64)> {
        let Some(order) = self.variants.as_array() else {
            return Vec::new();
        };
        let Some(map) = self.allocation.as_object() else {
            return Vec::new();
        };

        order
            .iter()
            .filter_map(|v| v.as_str())
            .map(|name| {
                let percent = map.get(name).and_then(|p| p.as_f64()).unwrap_or(0.0);
                (name.to_string(), percent)
            })
            .collect()
    }
}
