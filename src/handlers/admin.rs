//! # Admin Endpoint Handlers
//!
//! Operational triggers: run an ingest pass or a clustering batch on demand.

use axum::{extract::State, http::StatusCode, response::Json};

use crate::clustering::{ClusterError, ClusterRunSummary};
use crate::config::ClusteringAlgorithm;
use crate::error::ApiError;
use crate::ingest::IngestResult;
use crate::server::AppState;

/// Run one RSS collection pass across all configured sources
#[utoipa::path(
    post,
    path = "/admin/ingest",
    responses(
        (status = 200, description = "Collection run totals", body = IngestResult)
    ),
    tag = "admin"
)]
pub async fn trigger_ingest(State(state): State<AppState>) -> Json<IngestResult> {
    Json(state.ingestor.collect_all().await)
}

/// Run a clustering batch with the configured algorithm
#[utoipa::path(
    post,
    path = "/admin/clustering",
    responses(
        (status = 200, description = "Clustering run summary", body = ClusterRunSummary),
        (status = 502, description = "Remote clustering failed", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn trigger_clustering(
    State(state): State<AppState>,
) -> Result<Json<ClusterRunSummary>, ApiError> {
    run_clustering(&state, None).await
}

/// Run a clustering batch with HDBSCAN
#[utoipa::path(
    post,
    path = "/admin/clustering/hdbscan",
    responses(
        (status = 200, description = "Clustering run summary", body = ClusterRunSummary),
        (status = 502, description = "Remote clustering failed", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn trigger_hdbscan(
    State(state): State<AppState>,
) -> Result<Json<ClusterRunSummary>, ApiError> {
    run_clustering(&state, Some(ClusteringAlgorithm::Hdbscan)).await
}

/// Run a clustering batch with k-means
#[utoipa::path(
    post,
    path = "/admin/clustering/kmeans",
    responses(
        (status = 200, description = "Clustering run summary", body = ClusterRunSummary),
        (status = 502, description = "Remote clustering failed", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn trigger_kmeans(
    State(state): State<AppState>,
) -> Result<Json<ClusterRunSummary>, ApiError> {
    run_clustering(&state, Some(ClusteringAlgorithm::Kmeans)).await
}

/// Re-run the configured algorithm over the full window, refreshing stale
/// assignments
#[utoipa::path(
    post,
    path = "/admin/clustering/optimize",
    responses(
        (status = 200, description = "Clustering run summary", body = ClusterRunSummary),
        (status = 502, description = "Remote clustering failed", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn trigger_optimize(
    State(state): State<AppState>,
) -> Result<Json<ClusterRunSummary>, ApiError> {
    run_clustering(&state, None).await
}

async fn run_clustering(
    state: &AppState,
    algorithm: Option<ClusteringAlgorithm>,
) -> Result<Json<ClusterRunSummary>, ApiError> {
    let outcome = match algorithm {
        Some(algorithm) => state.clusterer.run_with(algorithm).await,
        None => state.clusterer.run().await,
    };

    match outcome {
        Ok(summary) => Ok(Json(summary)),
        Err(ClusterError::Repository(err)) => Err(err.into()),
        Err(ClusterError::Remote(err)) => Err(ApiError::new(
            StatusCode::BAD_GATEWAY,
            "ML_UNAVAILABLE",
            &err.to_string(),
        )),
    }
}
