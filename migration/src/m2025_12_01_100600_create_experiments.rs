//! Migration to create the experiments, experiment_metrics_daily, and
//! feature_flags tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Experiments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Experiments::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Experiments::ExperimentKey).text().not_null())
                    .col(ColumnDef::new(Experiments::Variants).json_binary().not_null())
                    .col(ColumnDef::new(Experiments::Allocation).json_binary().not_null())
                    .col(
                        ColumnDef::new(Experiments::StartDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Experiments::EndDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Experiments::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Experiments::AutoStopEnabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Experiments::AutoStopThreshold)
                            .double()
                            .not_null()
                            .default(-0.05),
                    )
                    .col(
                        ColumnDef::new(Experiments::MinimumSampleSize)
                            .big_integer()
                            .not_null()
                            .default(1000),
                    )
                    .col(
                        ColumnDef::new(Experiments::CreatedAt)
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
                    .name("idx_experiments_key")
                    .table(Experiments::Table)
                    .col(Experiments::ExperimentKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ExperimentMetricsDaily::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExperimentMetricsDaily::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ExperimentMetricsDaily::ExperimentKey)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ExperimentMetricsDaily::Variant).text().not_null())
                    .col(
                        ColumnDef::new(ExperimentMetricsDaily::DatePartition)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExperimentMetricsDaily::Impressions)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ExperimentMetricsDaily::Clicks)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ExperimentMetricsDaily::Ctr)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(ExperimentMetricsDaily::AvgDwellMs)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(ExperimentMetricsDaily::DiversityScore)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_experiment_metrics_daily_key")
                    .table(ExperimentMetricsDaily::Table)
                    .col(ExperimentMetricsDaily::ExperimentKey)
                    .col(ExperimentMetricsDaily::Variant)
                    .col(ExperimentMetricsDaily::DatePartition)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FeatureFlags::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FeatureFlags::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FeatureFlags::FlagKey).text().not_null())
                    .col(ColumnDef::new(FeatureFlags::ValueType).text().not_null())
                    .col(ColumnDef::new(FeatureFlags::FlagValue).text().not_null())
                    .col(
                        ColumnDef::new(FeatureFlags::IsEnabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(FeatureFlags::Environment)
                            .text()
                            .not_null()
                            .default("local"),
                    )
                    .col(
                        ColumnDef::new(FeatureFlags::UpdatedAt)
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
                    .name("idx_feature_flags_key")
                    .table(FeatureFlags::Table)
                    .col(FeatureFlags::FlagKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_feature_flags_key").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(FeatureFlags::Table).to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_experiment_metrics_daily_key")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ExperimentMetricsDaily::Table).to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_experiments_key").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Experiments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Experiments {
    Table,
    Id,
    ExperimentKey,
    Variants,
    Allocation,
    StartDate,
    EndDate,
    IsActive,
    AutoStopEnabled,
    AutoStopThreshold,
    MinimumSampleSize,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ExperimentMetricsDaily {
    Table,
    Id,
    ExperimentKey,
    Variant,
    DatePartition,
    Impressions,
    Clicks,
    Ctr,
    AvgDwellMs,
    DiversityScore,
}

#[derive(DeriveIden)]
enum FeatureFlags {
    Table,
    Id,
    FlagKey,
    ValueType,
    FlagValue,
    IsEnabled,
    Environment,
    UpdatedAt,
}
