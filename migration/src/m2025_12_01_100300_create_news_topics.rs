//! Migration to create the news_topics table.
//!
//! One topic assignment per article, with an optional near-duplicate group id
//! shared among siblings of the same topic.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NewsTopics::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NewsTopics::NewsId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(NewsTopics::TopicId).big_integer().not_null())
                    .col(ColumnDef::new(NewsTopics::GroupId).big_integer().null())
                    .col(
                        ColumnDef::new(NewsTopics::TopicKeywords)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NewsTopics::SimilarityScore)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NewsTopics::ClusteringMethod)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NewsTopics::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_news_topics_news_id")
                            .from(NewsTopics::Table, NewsTopics::NewsId)
                            .to(News::Table, News::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_news_topics_topic_id ON news_topics (topic_id)"
                    .to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_news_topics_topic_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(NewsTopics::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum NewsTopics {
    Table,
    NewsId,
    TopicId,
    GroupId,
    TopicKeywords,
    SimilarityScore,
    ClusteringMethod,
    CreatedAt,
}

#[derive(DeriveIden)]
enum News {
    Table,
    Id,
}
