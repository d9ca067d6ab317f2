//! News entity model
//!
//! This module contains the SeaORM entity model for the news table, which
//! stores articles exactly as ingested. Rows are immutable once saved; the
//! dedup key is unique across the store.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// News entity representing one ingested article
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "news")]
pub struct Model {
    /// Unique identifier for the article (primary key)
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Name of the RSS source that produced this article
    pub source: String,

    /// Original article URL
    pub url: String,

    /// Timestamp when the article was published (UTC)
    pub published_at: DateTimeWithTimeZone,

    /// Article title as received from the feed
    pub title: String,

    /// Cleaned article body
    #[sea_orm(column_type = "Text")]
    pub body: String,

    /// Language code (e.g. "ko")
    pub lang: String,

    /// Stable hash of canonical(title) + source + published minute
    pub dedup_key: String,

    /// Timestamp when the row was saved
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::news_score::Entity")]
    Score,
    #[sea_orm(has_one = "super::news_embedding::Entity")]
    Embedding,
    #[sea_orm(has_one = "super::news_topic::Entity")]
    Topic,
}

impl Related<super::news_score::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Score.def()
    }
}

impl Related<super::news_embedding::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Embedding.def()
    }
}

impl Related<super::news_topic::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Topic.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
