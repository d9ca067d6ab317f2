//! # Newsrank Main Entry Point
//!
//! This is the main entry point for the newsrank service.

use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use newsrank::{
    config::{AppConfig, ClusteringAlgorithm, ConfigLoader},
    db, seeds,
    server::run_server,
    telemetry,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "newsrank")]
#[command(about = "Korean financial news ranking service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Run one RSS collection pass and exit
    Ingest,
    /// Run one topic clustering batch and exit
    Cluster {
        /// Override the configured algorithm
        #[arg(long)]
        algorithm: Option<String>,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    // Initialize tracing subscriber based on configuration
    telemetry::init_tracing(&config)?;

    // Initialize database connection
    let db = db::init_pool(&config).await?;

    if let Some(command) = cli.command {
        match command {
            Commands::Migrate { action } => {
                handle_migrate_command(&db, action).await?;
                return Ok(());
            }
            Commands::Ingest => {
                prepare_database(&config, &db).await?;
                handle_ingest_command(config, db).await?;
                return Ok(());
            }
            Commands::Cluster { algorithm } => {
                prepare_database(&config, &db).await?;
                handle_cluster_command(config, db, algorithm).await?;
                return Ok(());
            }
        }
    }

    prepare_database(&config, &db).await?;

    // Log the loaded configuration (no secrets in current schema)
    log::info!("Loaded configuration for profile: {}", config.profile);
    if let Ok(redacted_json) = config.redacted_json() {
        log::debug!("Configuration: {}", redacted_json);
    }

    // Start the server with the loaded configuration
    run_server(config, db).await
}

/// Migrations and seeds run automatically for local and test profiles.
async fn prepare_database(
    config: &AppConfig,
    db: &DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if config.profile == "local" || config.profile == "test" {
        log::info!("Running migrations automatically for profile: {}", config.profile);
        Migrator::up(db, None).await?;
        seeds::seed_defaults(db).await?;
    }
    Ok(())
}

async fn handle_migrate_command(
    db: &DatabaseConnection,
    action: MigrateAction,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match action {
        MigrateAction::Up => {
            println!("Applying migrations...");
            Migrator::up(db, None).await?;
            println!("All migrations applied successfully");
        }
        MigrateAction::Down => {
            println!("Rolling back last migration...");
            Migrator::down(db, Some(1)).await?;
            println!("Migration rolled back successfully");
        }
        MigrateAction::Status => {
            println!("Checking migration status...");
            let applied = Migrator::get_applied_migrations(db).await?;
            let pending = Migrator::get_pending_migrations(db).await?;

            if applied.is_empty() {
                println!("No migrations have been applied");
            } else {
                println!("Applied migrations: {} migration(s)", applied.len());
            }

            if pending.is_empty() {
                println!("No pending migrations");
            } else {
                println!("Pending migrations: {} migration(s)", pending.len());
            }
        }
    }
    Ok(())
}

async fn handle_ingest_command(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // One-shot collection: enrichment events have no consumer here, so
    // saved articles land in the embedding backlog for the serving process.
    let (events_tx, _events_rx) = tokio::sync::mpsc::channel(1);
    let ingestor = newsrank::ingest::RssIngestor::new(config.ingest, Arc::new(db), events_tx);

    let result = ingestor.collect_all().await;
    println!(
        "Ingest completed: fetched={} saved={} skipped={} errors={}",
        result.items_fetched,
        result.items_saved,
        result.items_skipped,
        result.errors.len()
    );
    for error in &result.errors {
        println!("  error: {}", error);
    }

    Ok(())
}

async fn handle_cluster_command(
    config: AppConfig,
    db: DatabaseConnection,
    algorithm: Option<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let algorithm = match algorithm {
        Some(raw) => Some(
            ClusteringAlgorithm::parse(&raw)
                .ok_or_else(|| format!("unknown clustering algorithm '{}'", raw))?,
        ),
        None => None,
    };

    let ml = Arc::new(newsrank::ml::MlClient::new(&config.ml));
    let clusterer =
        newsrank::clustering::TopicClusterer::new(config.clustering, Arc::new(db), ml);

    let summary = match algorithm {
        Some(algorithm) => clusterer.run_with(algorithm).await?,
        None => clusterer.run().await?,
    };

    println!(
        "Clustering completed: articles={} topics={} method={}",
        summary.articles, summary.topics, summary.method
    );

    Ok(())
}
