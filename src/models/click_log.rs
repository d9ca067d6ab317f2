//! Click log entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "click_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub anon_id: String,
    pub user_id: Option<String>,
    pub news_id: i64,
    pub clicked_at: DateTimeWithTimeZone,
    pub dwell_time_ms: Option<i64>,
    pub experiment_key: Option<String>,
    pub variant: Option<String>,

    /// YYYY-MM-DD rollup partition
    pub date_partition: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
