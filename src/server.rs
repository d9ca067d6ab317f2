//! # Server Configuration
//!
//! Wires every component together, builds the Axum router, and runs the API
//! with its background tasks until shutdown.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::analytics::{MetricsRollup, TelemetryFlusher, TelemetrySink};
use crate::bandit::arms::build_arms;
use crate::bandit::service::BanditService;
use crate::clustering::TopicClusterer;
use crate::config::AppConfig;
use crate::enrichment::EnrichmentPipeline;
use crate::experiments::ExperimentService;
use crate::experiments::autostop::AutoStopMonitor;
use crate::experiments::flags::FlagStore;
use crate::handlers;
use crate::ingest::RssIngestor;
use crate::ml::MlClient;
use crate::ranking::facade::NewsQueryService;
use crate::repositories::{
    BanditRepository, ExperimentRepository, FeatureFlagRepository, MetricsRepository,
    UserPreferenceRepository,
};
use crate::scheduler::Scheduler;
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub facade: Arc<NewsQueryService>,
    pub bandit: Arc<BanditService>,
    pub ingestor: Arc<RssIngestor>,
    pub clusterer: Arc<TopicClusterer>,
    pub preferences: UserPreferenceRepository,
    pub flags: FlagStore,
    pub metrics_handle: PrometheusHandle,
}

/// Everything that runs outside the request path.
pub struct BackgroundTasks {
    pub scheduler: Scheduler,
    pub enrichment: Arc<EnrichmentPipeline>,
    pub enrichment_events: mpsc::Receiver<crate::ingest::NewsSaved>,
    pub flusher: TelemetryFlusher,
    pub telemetry_events: mpsc::Receiver<crate::analytics::TelemetryEvent>,
}

/// Size of the saved-article event queue feeding enrichment.
const ENRICHMENT_QUEUE: usize = 256;

/// Size of the telemetry event queue feeding the flusher.
const TELEMETRY_QUEUE: usize = 4096;

/// Construct the full component graph.
pub async fn build_state(config: AppConfig, db: DatabaseConnection) -> (AppState, BackgroundTasks) {
    let config = Arc::new(config);
    let db_arc = Arc::new(db.clone());

    let ml = Arc::new(MlClient::new(&config.ml));

    let flags = FlagStore::new(FeatureFlagRepository::new(Arc::clone(&db_arc)));
    if let Err(err) = flags.refresh().await {
        warn!(error = %err, "initial feature flag load failed");
    }

    let experiments = ExperimentService::new(
        ExperimentRepository::new(Arc::clone(&db_arc)),
        flags.clone(),
    );

    let (sink, telemetry_events) = TelemetrySink::channel(TELEMETRY_QUEUE);

    let facade = Arc::new(NewsQueryService::new(
        Arc::clone(&db_arc),
        experiments,
        sink.clone(),
        ml.breaker(),
        config.ranking.clone(),
    ));

    let bandit = Arc::new(BanditService::new(
        BanditRepository::new(Arc::clone(&db_arc)),
        build_arms(Arc::clone(&db_arc), Arc::clone(&facade)),
    ));

    let (events_tx, enrichment_events) = mpsc::channel(ENRICHMENT_QUEUE);
    let ingestor = Arc::new(RssIngestor::new(
        config.ingest.clone(),
        Arc::clone(&db_arc),
        events_tx,
    ));

    let clusterer = Arc::new(TopicClusterer::new(
        config.clustering.clone(),
        Arc::clone(&db_arc),
        Arc::clone(&ml),
    ));

    let enrichment = Arc::new(EnrichmentPipeline::new(Arc::clone(&db_arc), ml));

    let flusher = TelemetryFlusher::new(
        Arc::clone(&db_arc),
        config.telemetry_flush_interval_ms,
        config.telemetry_flush_batch_size,
    );

    let autostop = AutoStopMonitor::new(
        ExperimentRepository::new(Arc::clone(&db_arc)),
        MetricsRepository::new(Arc::clone(&db_arc)),
        flags.clone(),
        config.profile.clone(),
    );

    let scheduler = Scheduler::new(
        Arc::clone(&config),
        Arc::clone(&ingestor),
        Arc::clone(&clusterer),
        Arc::clone(&enrichment),
        autostop,
        MetricsRollup::new(Arc::clone(&db_arc)),
    );

    let state = AppState {
        db,
        config,
        facade,
        bandit,
        ingestor,
        clusterer,
        preferences: UserPreferenceRepository::new(db_arc),
        flags,
        metrics_handle: telemetry::prometheus_handle(),
    };

    let tasks = BackgroundTasks {
        scheduler,
        enrichment,
        enrichment_events,
        flusher,
        telemetry_events,
    };

    (state, tasks)
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .route("/news/top", get(handlers::news::top_news))
        .route("/news/{id}", get(handlers::news::news_by_id))
        .route("/news/{id}/click", post(handlers::news::click))
        .route(
            "/users/{user_id}/preferences",
            get(handlers::preferences::get_preferences).put(handlers::preferences::put_preferences),
        )
        .route("/admin/ingest", post(handlers::admin::trigger_ingest))
        .route("/admin/clustering", post(handlers::admin::trigger_clustering))
        .route(
            "/admin/clustering/hdbscan",
            post(handlers::admin::trigger_hdbscan),
        )
        .route(
            "/admin/clustering/kmeans",
            post(handlers::admin::trigger_kmeans),
        )
        .route(
            "/admin/clustering/optimize",
            post(handlers::admin::trigger_optimize),
        )
        .route(
            "/bandit/recommendations",
            get(handlers::bandit::recommendations),
        )
        .route("/bandit/reward", post(handlers::bandit::reward))
        .route("/bandit/click", post(handlers::bandit::click))
        .route("/bandit/engagement", post(handlers::bandit::engagement))
        .route("/bandit/performance", get(handlers::bandit::performance))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server and its background tasks with the given configuration.
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (state, tasks) = build_state(config, db).await;

    let shutdown = CancellationToken::new();
    let mut handles = tasks.scheduler.spawn_all(shutdown.clone());
    handles.push(tokio::spawn(
        Arc::clone(&tasks.enrichment).run(tasks.enrichment_events, shutdown.clone()),
    ));
    handles.push(tokio::spawn(
        tasks.flusher.run(tasks.telemetry_events, shutdown.clone()),
    ));

    let addr = state
        .config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = state.config.profile.clone();

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile, "Server listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            serve_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::metrics,
        crate::handlers::news::top_news,
        crate::handlers::news::news_by_id,
        crate::handlers::news::click,
        crate::handlers::preferences::get_preferences,
        crate::handlers::preferences::put_preferences,
        crate::handlers::admin::trigger_ingest,
        crate::handlers::admin::trigger_clustering,
        crate::handlers::admin::trigger_hdbscan,
        crate::handlers::admin::trigger_kmeans,
        crate::handlers::admin::trigger_optimize,
        crate::handlers::bandit::recommendations,
        crate::handlers::bandit::reward,
        crate::handlers::bandit::click,
        crate::handlers::bandit::engagement,
        crate::handlers::bandit::performance,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::error::ApiError,
            crate::ingest::IngestResult,
            crate::clustering::ClusterRunSummary,
            crate::ranking::facade::FeedItem,
            crate::ranking::facade::FeedResponse,
            crate::ranking::facade::NewsDetail,
            crate::models::news_score::ScoreReason,
            crate::experiments::ExperimentAssignment,
            crate::handlers::news::ClickBody,
            crate::handlers::preferences::PreferencesBody,
            crate::handlers::preferences::PreferencesResponse,
            crate::handlers::bandit::RewardBody,
            crate::handlers::bandit::RewardResponse,
            crate::handlers::bandit::DecisionClickBody,
            crate::handlers::bandit::EngagementBody,
            crate::bandit::service::BanditRecommendation,
            crate::bandit::service::BanditPerformance,
            crate::repositories::bandit::ArmPerformance,
        )
    ),
    info(
        title = "Newsrank API",
        description = "Korean financial news aggregation and ranking service",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
