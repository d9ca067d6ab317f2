//! Impression log entity model
//!
//! One row per article shown in a served feed, carrying its position and the
//! ranking flags in effect so the nightly rollup can segment by experiment.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "impression_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub anon_id: String,
    pub user_id: Option<String>,
    pub news_id: i64,
    pub shown_at: DateTimeWithTimeZone,

    /// 1-based position within the served feed
    pub position: i32,

    pub importance: f64,
    pub rank_score: f64,
    pub personalized: bool,
    pub diversity_applied: bool,

    /// True when the response was served from fallbacks after a deadline
    pub degraded: bool,

    pub experiment_key: Option<String>,
    pub variant: Option<String>,

    /// YYYY-MM-DD rollup partition
    pub date_partition: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
