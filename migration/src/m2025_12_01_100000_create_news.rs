//! Migration to create the news table.
//!
//! This migration creates the news table which stores immutable ingested
//! articles, deduplicated by a stable content hash.

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
                    .table(News::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(News::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(News::Source).text().not_null())
                    .col(ColumnDef::new(News::Url).text().not_null())
                    .col(
                        ColumnDef::new(News::PublishedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(News::Title).text().not_null())
                    .col(ColumnDef::new(News::Body).text().not_null())
                    .col(ColumnDef::new(News::Lang).text().not_null())
                    .col(ColumnDef::new(News::DedupKey).text().not_null())
                    .col(
                        ColumnDef::new(News::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_news_dedup_key")
                    .table(News::Table)
                    .col(News::DedupKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Feed candidate queries scan by recency
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_news_published_at ON news (published_at DESC)"
                    .to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_news_dedup_key").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_news_published_at").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(News::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum News {
    Table,
    Id,
    Source,
    Url,
    PublishedAt,
    Title,
    Body,
    Lang,
    DedupKey,
    CreatedAt,
}
