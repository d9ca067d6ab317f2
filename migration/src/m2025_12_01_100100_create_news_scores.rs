//! Migration to create the news_scores table.
//!
//! One row per news article holding the rule-based or ML-derived importance,
//! the structured scoring reason, and the optional model summary.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NewsScores::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NewsScores::NewsId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(NewsScores::Importance).double().not_null())
                    .col(ColumnDef::new(NewsScores::Reason).json_binary().not_null())
                    .col(ColumnDef::new(NewsScores::RankScore).double().not_null())
                    .col(ColumnDef::new(NewsScores::ImportanceP).double().null())
                    .col(ColumnDef::new(NewsScores::ModelVersion).text().null())
                    .col(ColumnDef::new(NewsScores::Summary).text().null())
                    .col(
                        ColumnDef::new(NewsScores::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(NewsScores::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_news_scores_news_id")
                            .from(NewsScores::Table, NewsScores::NewsId)
                            .to(News::Table, News::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_news_scores_rank_score")
                    .table(NewsScores::Table)
                    .col(NewsScores::RankScore)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_news_scores_rank_score").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(NewsScores::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum NewsScores {
    Table,
    NewsId,
    Importance,
    Reason,
    RankScore,
    ImportanceP,
    ModelVersion,
    Summary,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum News {
    Table,
    Id,
}
