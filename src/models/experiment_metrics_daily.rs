//! Daily experiment metrics entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "experiment_metrics_daily")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub experiment_key: String,
    pub variant: String,

    /// YYYY-MM-DD
    pub date_partition: String,

    pub impressions: i64,
    pub clicks: i64,
    pub ctr: f64,
    pub avg_dwell_ms: f64,

    /// 1 − average pairwise similarity of articles shown that day
    pub diversity_score: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
