//! Migration to create the news_embeddings and embedding_backlog tables.
//!
//! Embeddings are stored as JSON arrays of f32 with application-side cosine;
//! the backlog table queues articles whose embedding fetch failed.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NewsEmbeddings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NewsEmbeddings::NewsId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(NewsEmbeddings::Vector)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(NewsEmbeddings::Norm).double().not_null())
                    .col(
                        ColumnDef::new(NewsEmbeddings::ModelVersion)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NewsEmbeddings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_news_embeddings_news_id")
                            .from(NewsEmbeddings::Table, NewsEmbeddings::NewsId)
                            .to(News::Table, News::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmbeddingBacklog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmbeddingBacklog::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EmbeddingBacklog::NewsId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmbeddingBacklog::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(EmbeddingBacklog::LastError).text().null())
                    .col(
                        ColumnDef::new(EmbeddingBacklog::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(EmbeddingBacklog::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_embedding_backlog_news_id")
                            .from(EmbeddingBacklog::Table, EmbeddingBacklog::NewsId)
                            .to(News::Table, News::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_embedding_backlog_news_id")
                    .table(EmbeddingBacklog::Table)
                    .col(EmbeddingBacklog::NewsId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_embedding_backlog_news_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(EmbeddingBacklog::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(NewsEmbeddings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum NewsEmbeddings {
    Table,
    NewsId,
    Vector,
    Norm,
    ModelVersion,
    CreatedAt,
}

#[derive(DeriveIden)]
enum EmbeddingBacklog {
    Table,
    Id,
    NewsId,
    Attempts,
    LastError,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum News {
    Table,
    Id,
}
