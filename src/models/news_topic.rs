//! News topic assignment entity model
//!
//! At most one topic per article; group_id is null or shared among
//! near-duplicate siblings within the same topic.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "news_topics")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub news_id: i64,

    pub topic_id: i64,

    /// Near-duplicate cluster within the topic
    pub group_id: Option<i64>,

    /// Representative keywords for the topic, JSON array of strings
    #[sea_orm(column_type = "JsonBinary")]
    pub topic_keywords: JsonValue,

    /// Cosine similarity to the topic centroid at assignment time
    pub similarity_score: f64,

    /// Algorithm that produced the assignment (cosine, hdbscan, kmeans)
    pub clustering_method: String,

    pub created_at: DateTimeWithTimeZone,
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
