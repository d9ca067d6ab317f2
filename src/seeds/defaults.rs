//! Seeds the bandit and experiment tables with their default rows.

use anyhow::Result;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde_json::json;

use crate::models::bandit_arm::{self, ALL_ARM_KINDS};
use crate::models::{bandit_experiment, experiment};
use crate::repositories::to_db_time;

/// Name of the default bandit experiment over the ranking arms.
pub const DEFAULT_BANDIT_EXPERIMENT: &str = "ranking-arms";

/// Key of the default ranking A/B experiment.
pub const DEFAULT_AB_EXPERIMENT: &str = "ranking_personalization";

/// Install the default bandit experiment, its arms, and the ranking A/B
/// experiment when absent.
pub async fn seed_defaults(db: &DatabaseConnection) -> Result<()> {
    seed_bandit(db).await?;
    seed_ab_experiment(db).await?;
    log::info!("Default seeding completed");
    Ok(())
}

async fn seed_bandit(db: &DatabaseConnection) -> Result<()> {
    let existing = bandit_experiment::Entity::find()
        .filter(bandit_experiment::Column::Name.eq(DEFAULT_BANDIT_EXPERIMENT))
        .one(db)
        .await?;

    let experiment = match existing {
        Some(found) => {
            log::info!(
                "Bandit experiment '{}' already exists, skipping",
                DEFAULT_BANDIT_EXPERIMENT
            );
            found
        }
        None => {
            log::info!("Creating bandit experiment: {}", DEFAULT_BANDIT_EXPERIMENT);
            bandit_experiment::ActiveModel {
                name: Set(DEFAULT_BANDIT_EXPERIMENT.to_string()),
                algorithm: Set("epsilon_greedy".to_string()),
                epsilon: Set(0.1),
                alpha: Set(1.0),
                beta: Set(1.0),
                is_active: Set(true),
                created_at: Set(to_db_time(Utc::now())),
                ..Default::default()
            }
            .insert(db)
            .await?
        }
    };

    for kind in ALL_ARM_KINDS {
        let exists = bandit_arm::Entity::find()
            .filter(bandit_arm::Column::ExperimentId.eq(experiment.id))
            .filter(bandit_arm::Column::AlgorithmType.eq(kind.as_str()))
            .one(db)
            .await?
            .is_some();

        if !exists {
            log::info!("Creating bandit arm: {}", kind);
            bandit_arm::ActiveModel {
                experiment_id: Set(experiment.id),
                name: Set(kind.as_str().to_lowercase()),
                algorithm_type: Set(kind.as_str().to_string()),
                enabled: Set(true),
                ..Default::default()
            }
            .insert(db)
            .await?;
        }
    }

    Ok(())
}

async fn seed_ab_experiment(db: &DatabaseConnection) -> Result<()> {
    let exists = experiment::Entity::find()
        .filter(experiment::Column::ExperimentKey.eq(DEFAULT_AB_EXPERIMENT))
        .one(db)
        .await?
        .is_some();

    if exists {
        log::info!(
            "Experiment '{}' already exists, skipping",
            DEFAULT_AB_EXPERIMENT
        );
        return Ok(());
    }

    log::info!("Creating experiment: {}", DEFAULT_AB_EXPERIMENT);
    experiment::ActiveModel {
        experiment_key: Set(DEFAULT_AB_EXPERIMENT.to_string()),
        variants: Set(json!(["control", "treatment"])),
        allocation: Set(json!({"control": 50.0, "treatment": 50.0})),
        start_date: Set(None),
        end_date: Set(None),
        is_active: Set(true),
        auto_stop_enabled: Set(true),
        auto_stop_threshold: Set(-0.05),
        minimum_sample_size: Set(1000),
        created_at: Set(to_db_time(Utc::now())),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(())
}
