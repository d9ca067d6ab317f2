//! Migration to create the bandit tables.
//!
//! bandit_states carries the unique (experiment_id, arm_id, context_key)
//! triple that makes reward upserts merge-safe.

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
                    .table(BanditExperiments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BanditExperiments::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BanditExperiments::Name).text().not_null())
                    .col(ColumnDef::new(BanditExperiments::Algorithm).text().not_null())
                    .col(
                        ColumnDef::new(BanditExperiments::Epsilon)
                            .double()
                            .not_null()
                            .default(0.1),
                    )
                    .col(
                        ColumnDef::new(BanditExperiments::Alpha)
                            .double()
                            .not_null()
                            .default(1.0),
                    )
                    .col(
                        ColumnDef::new(BanditExperiments::Beta)
                            .double()
                            .not_null()
                            .default(1.0),
                    )
                    .col(
                        ColumnDef::new(BanditExperiments::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(BanditExperiments::CreatedAt)
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
                    .name("idx_bandit_experiments_name")
                    .table(BanditExperiments::Table)
                    .col(BanditExperiments::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BanditArms::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BanditArms::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BanditArms::ExperimentId).big_integer().not_null())
                    .col(ColumnDef::new(BanditArms::Name).text().not_null())
                    .col(ColumnDef::new(BanditArms::AlgorithmType).text().not_null())
                    .col(
                        ColumnDef::new(BanditArms::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bandit_arms_experiment_id")
                            .from(BanditArms::Table, BanditArms::ExperimentId)
                            .to(BanditExperiments::Table, BanditExperiments::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_bandit_arms_experiment_name")
                    .table(BanditArms::Table)
                    .col(BanditArms::ExperimentId)
                    .col(BanditArms::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BanditStates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BanditStates::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BanditStates::ExperimentId).big_integer().not_null())
                    .col(ColumnDef::new(BanditStates::ArmId).big_integer().not_null())
                    .col(ColumnDef::new(BanditStates::ContextKey).text().not_null())
                    .col(
                        ColumnDef::new(BanditStates::Pulls)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BanditStates::TotalReward)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(BanditStates::SumRewardSquared)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(BanditStates::LastPullAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bandit_states_experiment_id")
                            .from(BanditStates::Table, BanditStates::ExperimentId)
                            .to(BanditExperiments::Table, BanditExperiments::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Merge-safe upserts depend on this triple being unique
        manager
            .create_index(
                Index::create()
                    .name("idx_bandit_states_triple")
                    .table(BanditStates::Table)
                    .col(BanditStates::ExperimentId)
                    .col(BanditStates::ArmId)
                    .col(BanditStates::ContextKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BanditDecisions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BanditDecisions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BanditDecisions::ExperimentId).big_integer().not_null())
                    .col(ColumnDef::new(BanditDecisions::ArmId).big_integer().not_null())
                    .col(ColumnDef::new(BanditDecisions::ContextKey).text().not_null())
                    .col(ColumnDef::new(BanditDecisions::UserId).text().null())
                    .col(ColumnDef::new(BanditDecisions::DecisionValue).double().not_null())
                    .col(
                        ColumnDef::new(BanditDecisions::SelectionReason)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BanditDecisions::NewsIds).json_binary().not_null())
                    .col(
                        ColumnDef::new(BanditDecisions::DecidedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bandit_decisions_experiment_id")
                            .from(BanditDecisions::Table, BanditDecisions::ExperimentId)
                            .to(BanditExperiments::Table, BanditExperiments::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BanditRewards::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BanditRewards::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BanditRewards::DecisionId).big_integer().not_null())
                    .col(ColumnDef::new(BanditRewards::RewardType).text().not_null())
                    .col(ColumnDef::new(BanditRewards::RewardValue).double().not_null())
                    .col(
                        ColumnDef::new(BanditRewards::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bandit_rewards_decision_id")
                            .from(BanditRewards::Table, BanditRewards::DecisionId)
                            .to(BanditDecisions::Table, BanditDecisions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_bandit_decisions_decided ON bandit_decisions (experiment_id, decided_at DESC)".to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_bandit_decisions_decided").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(BanditRewards::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(BanditDecisions::Table).to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_bandit_states_triple").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(BanditStates::Table).to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_bandit_arms_experiment_name")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(BanditArms::Table).to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_bandit_experiments_name").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(BanditExperiments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BanditExperiments {
    Table,
    Id,
    Name,
    Algorithm,
    Epsilon,
    Alpha,
    Beta,
    IsActive,
    CreatedAt,
}

#[derive(DeriveIden)]
enum BanditArms {
    Table,
    Id,
    ExperimentId,
    Name,
    AlgorithmType,
    Enabled,
}

#[derive(DeriveIden)]
enum BanditStates {
    Table,
    Id,
    ExperimentId,
    ArmId,
    ContextKey,
    Pulls,
    TotalReward,
    SumRewardSquared,
    LastPullAt,
}

#[derive(DeriveIden)]
enum BanditDecisions {
    Table,
    Id,
    ExperimentId,
    ArmId,
    ContextKey,
    UserId,
    DecisionValue,
    SelectionReason,
    NewsIds,
    DecidedAt,
}

#[derive(DeriveIden)]
enum BanditRewards {
    Table,
    Id,
    DecisionId,
    RewardType,
    RewardValue,
    CreatedAt,
}
