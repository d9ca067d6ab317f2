//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the newsrank API.

pub mod admin;
pub mod bandit;
pub mod news;
pub mod preferences;

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::health_check;
use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root(State(_state): State<AppState>) -> Result<Json<ServiceInfo>, ApiError> {
    Ok(Json(ServiceInfo::default()))
}

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Service identifier
    pub service: String,
    /// Service version
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            service: "newsrank".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Liveness probe. Verifies the database connection is usable.
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 500, description = "Database unreachable", body = ApiError)
    ),
    tag = "health"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    health_check(&state.db).await.map_err(|err| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            &err.to_string(),
        )
    })?;

    Ok(Json(HealthResponse::default()))
}

/// Prometheus metrics exposition.
#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, description = "Prometheus exposition text", body = String)
    ),
    tag = "health"
)]
pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}
