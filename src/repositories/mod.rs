//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for database entities, providing a clean API for data access.

pub mod bandit;
pub mod embedding;
pub mod engagement;
pub mod experiment;
pub mod news;
pub mod score;
pub mod topic;
pub mod user;

pub use bandit::{ArmPerformance, BanditRepository};
pub use embedding::EmbeddingRepository;
pub use engagement::EngagementRepository;
pub use experiment::{ExperimentRepository, FeatureFlagRepository, MetricsRepository};
pub use news::{NewNews, NewsRepository};
pub use score::ScoreRepository;
pub use topic::{TopicAssignment, TopicRepository};
pub use user::{AnonymousUserRepository, UserPreferenceRepository};

use chrono::{DateTime, FixedOffset, Utc};

/// Convert a UTC timestamp into the fixed-offset representation SeaORM
/// persists.
pub fn to_db_time(dt: DateTime<Utc>) -> DateTime<FixedOffset> {
    DateTime::from_naive_utc_and_offset(
        dt.naive_utc(),
        FixedOffset::east_opt(0).expect("UTC offset"),
    )
}

/// Rollup partition string (YYYY-MM-DD) for a timestamp.
pub fn date_partition(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d").to_string()
}
