//! # Preference Endpoint Handlers

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::server::AppState;

/// Stored preferences for one user
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesResponse {
    pub user_id: String,
    pub interest_tickers: Vec<String>,
    pub interest_keywords: Vec<String>,
    pub personalization_enabled: bool,
    pub diversity_weight: f64,
}

/// Preference update body
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesBody {
    #[serde(default)]
    pub interest_tickers: Vec<String>,
    #[serde(default)]
    pub interest_keywords: Vec<String>,
    #[serde(default = "default_true")]
    pub personalization_enabled: bool,
    #[serde(default = "default_diversity_weight")]
    pub diversity_weight: f64,
}

fn default_true() -> bool {
    true
}

fn default_diversity_weight() -> f64 {
    0.3
}

/// Fetch a user's preferences
#[utoipa::path(
    get,
    path = "/users/{user_id}/preferences",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Stored preferences", body = PreferencesResponse),
        (status = 404, description = "No preferences stored", body = ApiError)
    ),
    tag = "preferences"
)]
pub async fn get_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let preferences = state
        .preferences
        .get(&user_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("preferences for {} not found", user_id)))?;

    Ok(Json(PreferencesResponse {
        user_id: preferences.user_id.clone(),
        interest_tickers: preferences.tickers(),
        interest_keywords: preferences.keywords(),
        personalization_enabled: preferences.personalization_enabled,
        diversity_weight: preferences.diversity_weight,
    }))
}

/// Create or replace a user's preferences
#[utoipa::path(
    put,
    path = "/users/{user_id}/preferences",
    params(("user_id" = String, Path, description = "User id")),
    request_body = PreferencesBody,
    responses(
        (status = 200, description = "Stored preferences", body = PreferencesResponse),
        (status = 400, description = "Invalid body", body = ApiError)
    ),
    tag = "preferences"
)]
pub async fn put_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<PreferencesBody>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    if !(0.0..=1.0).contains(&body.diversity_weight) {
        return Err(ApiError::validation("diversityWeight must be within [0, 1]"));
    }
    if body.interest_tickers.iter().any(|ticker| {
        ticker.len() != 6 || !ticker.chars().all(|c| c.is_ascii_digit())
    }) {
        return Err(ApiError::validation(
            "interestTickers must be 6-digit issuer codes",
        ));
    }

    let stored = state
        .preferences
        .upsert(
            &user_id,
            body.interest_tickers,
            body.interest_keywords,
            body.personalization_enabled,
            body.diversity_weight,
        )
        .await
        .map_err(ApiError::from)?;

    Ok(Json(PreferencesResponse {
        user_id: stored.user_id.clone(),
        interest_tickers: stored.tickers(),
        interest_keywords: stored.keywords(),
        personalization_enabled: stored.personalization_enabled,
        diversity_weight: stored.diversity_weight,
    }))
}
