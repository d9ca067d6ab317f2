//! Feature flag entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "feature_flags")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub flag_key: String,

    /// One of boolean, double, string
    pub value_type: String,

    /// String-encoded value; parse according to value_type
    pub flag_value: String,

    pub is_enabled: bool,
    pub environment: String,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Boolean reading of the flag; a disabled flag always reads false.
    pub fn as_bool(&self) -> bool {
        self.is_enabled && matches!(self.flag_value.as_str(), "true" | "1" | "on")
    }

    /// Numeric reading of the flag, when value_type is double.
    pub fn as_f64(&self) -> Option<f64> {
        if !self.is_enabled {
            return None;
        }
        self.flag_value.parse().ok()
    }
}
