//! Migration to create the anonymous_users and user_preferences tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AnonymousUsers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AnonymousUsers::AnonId)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AnonymousUsers::FirstSeenAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(AnonymousUsers::LastSeenAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(AnonymousUsers::SessionCount)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(AnonymousUsers::UserAgent).text().null())
                    .col(ColumnDef::new(AnonymousUsers::Country).text().null())
                    .col(
                        ColumnDef::new(AnonymousUsers::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserPreferences::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserPreferences::UserId)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UserPreferences::InterestTickers)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserPreferences::InterestKeywords)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserPreferences::PersonalizationEnabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(UserPreferences::DiversityWeight)
                            .double()
                            .not_null()
                            .default(0.3),
                    )
                    .col(
                        ColumnDef::new(UserPreferences::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(UserPreferences::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserPreferences::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(AnonymousUsers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AnonymousUsers {
    Table,
    AnonId,
    FirstSeenAt,
    LastSeenAt,
    SessionCount,
    UserAgent,
    Country,
    IsActive,
}

#[derive(DeriveIden)]
enum UserPreferences {
    Table,
    UserId,
    InterestTickers,
    InterestKeywords,
    PersonalizationEnabled,
    DiversityWeight,
    IsActive,
    UpdatedAt,
}
