//! Database migrations for the newsrank service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_12_01_100000_create_news;
mod m2025_12_01_100100_create_news_scores;
mod m2025_12_01_100200_create_news_embeddings;
mod m2025_12_01_100300_create_news_topics;
mod m2025_12_01_100400_create_users;
mod m2025_12_01_100500_create_engagement_logs;
mod m2025_12_01_100600_create_experiments;
mod m2025_12_01_100700_create_bandit;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_12_01_100000_create_news::Migration),
            Box::new(m2025_12_01_100100_create_news_scores::Migration),
            Box::new(m2025_12_01_100200_create_news_embeddings::Migration),
            Box::new(m2025_12_01_100300_create_news_topics::Migration),
            Box::new(m2025_12_01_100400_create_users::Migration),
            Box::new(m2025_12_01_100500_create_engagement_logs::Migration),
            Box::new(m2025_12_01_100600_create_experiments::Migration),
            Box::new(m2025_12_01_100700_create_bandit::Migration),
        ]
    }
}
