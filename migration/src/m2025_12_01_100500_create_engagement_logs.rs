//! Migration to create the impression_logs and click_logs tables.
//!
//! Both tables are partition-keyed by date string for the nightly rollup and
//! reference news weakly (articles may outlive their logs but not vice versa).

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
                    .table(ImpressionLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ImpressionLogs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ImpressionLogs::AnonId).text().not_null())
                    .col(ColumnDef::new(ImpressionLogs::UserId).text().null())
                    .col(ColumnDef::new(ImpressionLogs::NewsId).big_integer().not_null())
                    .col(
                        ColumnDef::new(ImpressionLogs::ShownAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(ImpressionLogs::Position).integer().not_null())
                    .col(ColumnDef::new(ImpressionLogs::Importance).double().not_null())
                    .col(ColumnDef::new(ImpressionLogs::RankScore).double().not_null())
                    .col(
                        ColumnDef::new(ImpressionLogs::Personalized)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ImpressionLogs::DiversityApplied)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ImpressionLogs::Degraded)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ImpressionLogs::ExperimentKey).text().null())
                    .col(ColumnDef::new(ImpressionLogs::Variant).text().null())
                    .col(ColumnDef::new(ImpressionLogs::DatePartition).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ClickLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClickLogs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ClickLogs::AnonId).text().not_null())
                    .col(ColumnDef::new(ClickLogs::UserId).text().null())
                    .col(ColumnDef::new(ClickLogs::NewsId).big_integer().not_null())
                    .col(
                        ColumnDef::new(ClickLogs::ClickedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(ClickLogs::DwellTimeMs).big_integer().null())
                    .col(ColumnDef::new(ClickLogs::ExperimentKey).text().null())
                    .col(ColumnDef::new(ClickLogs::Variant).text().null())
                    .col(ColumnDef::new(ClickLogs::DatePartition).text().not_null())
                    .to_owned(),
            )
            .await?;

        for sql in [
            "CREATE INDEX IF NOT EXISTS idx_impression_logs_partition ON impression_logs (date_partition, experiment_key, variant)",
            "CREATE INDEX IF NOT EXISTS idx_impression_logs_anon ON impression_logs (anon_id, shown_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_click_logs_partition ON click_logs (date_partition, experiment_key, variant)",
            "CREATE INDEX IF NOT EXISTS idx_click_logs_user_clicked ON click_logs (user_id, clicked_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_click_logs_news_clicked ON click_logs (news_id, clicked_at DESC)",
        ] {
            manager
                .get_connection()
                .execute(Statement::from_string(
                    manager.get_database_backend(),
                    sql.to_string(),
                ))
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_impression_logs_partition",
            "idx_impression_logs_anon",
            "idx_click_logs_partition",
            "idx_click_logs_user_clicked",
            "idx_click_logs_news_clicked",
        ] {
            manager
                .drop_index(Index::drop().name(name).to_owned())
                .await?;
        }

        manager
            .drop_table(Table::drop().table(ClickLogs::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ImpressionLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ImpressionLogs {
    Table,
    Id,
    AnonId,
    UserId,
    NewsId,
    ShownAt,
    Position,
    Importance,
    RankScore,
    Personalized,
    DiversityApplied,
    Degraded,
    ExperimentKey,
    Variant,
    DatePartition,
}

#[derive(DeriveIden)]
enum ClickLogs {
    Table,
    Id,
    AnonId,
    UserId,
    NewsId,
    ClickedAt,
    DwellTimeMs,
    ExperimentKey,
    Variant,
    DatePartition,
}
