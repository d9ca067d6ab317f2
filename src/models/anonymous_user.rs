//! Anonymous user entity model
//!
//! Tracks unauthenticated visitors by their anon id (a UUID minted by the
//! client). Rows persist for at least a year.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "anonymous_users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub anon_id: String,

    pub first_seen_at: DateTimeWithTimeZone,
    pub last_seen_at: DateTimeWithTimeZone,
    pub session_count: i32,
    pub user_agent: Option<String>,
    pub country: Option<String>,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
