//! # Bandit Endpoint Handlers
//!
//! Recommendations served by the bandit's chosen arm plus the feedback
//! endpoints that reward it.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::bandit::service::{BanditError, BanditPerformance, BanditRecommendation};
use crate::error::ApiError;
use crate::models::RewardType;
use crate::server::AppState;

/// Query parameters for bandit recommendations
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationsQuery {
    pub user_id: Option<String>,
    /// Items to return (default 10, max 50)
    pub limit: Option<usize>,
}

/// Bandit-selected recommendations
#[utoipa::path(
    get,
    path = "/bandit/recommendations",
    params(RecommendationsQuery),
    responses(
        (status = 200, description = "Recommendations from the chosen arm", body = BanditRecommendation),
        (status = 400, description = "Invalid parameters", body = ApiError),
        (status = 503, description = "No active bandit experiment", body = ApiError)
    ),
    tag = "bandit"
)]
pub async fn recommendations(
    State(state): State<AppState>,
    Query(query): Query<RecommendationsQuery>,
) -> Result<Json<BanditRecommendation>, ApiError> {
    let limit = query.limit.unwrap_or(10);
    if !(1..=50).contains(&limit) {
        return Err(ApiError::validation("limit must be between 1 and 50"));
    }

    state
        .bandit
        .recommend(query.user_id, limit)
        .await
        .map(Json)
        .map_err(map_bandit_error)
}

/// Generic reward body
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RewardBody {
    pub decision_id: i64,
    /// One of CLICK, DWELL_TIME, ENGAGEMENT
    pub reward_type: String,
    /// Raw value; CLICK ignores it, DWELL_TIME reads seconds, ENGAGEMENT
    /// reads a [0, 1] score
    #[serde(default)]
    pub reward_value: f64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RewardResponse {
    pub decision_id: i64,
    pub reward_value: f64,
}

/// Record a reward for a decision
#[utoipa::path(
    post,
    path = "/bandit/reward",
    request_body = RewardBody,
    responses(
        (status = 200, description = "Normalized reward recorded", body = RewardResponse),
        (status = 400, description = "Invalid body", body = ApiError),
        (status = 404, description = "Unknown decision", body = ApiError)
    ),
    tag = "bandit"
)]
pub async fn reward(
    State(state): State<AppState>,
    Json(body): Json<RewardBody>,
) -> Result<Json<RewardResponse>, ApiError> {
    let reward_type = RewardType::parse(&body.reward_type).ok_or_else(|| {
        ApiError::validation("rewardType must be CLICK, DWELL_TIME, or ENGAGEMENT")
    })?;

    record(state, body.decision_id, reward_type, body.reward_value).await
}

/// Decision-scoped click body
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecisionClickBody {
    pub decision_id: i64,
}

/// Record a click reward for a decision
#[utoipa::path(
    post,
    path = "/bandit/click",
    request_body = DecisionClickBody,
    responses(
        (status = 200, description = "Click reward recorded", body = RewardResponse),
        (status = 404, description = "Unknown decision", body = ApiError)
    ),
    tag = "bandit"
)]
pub async fn click(
    State(state): State<AppState>,
    Json(body): Json<DecisionClickBody>,
) -> Result<Json<RewardResponse>, ApiError> {
    record(state, body.decision_id, RewardType::Click, 1.0).await
}

/// Engagement reward body
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EngagementBody {
    pub decision_id: i64,
    /// Engagement score in [0, 1]
    pub value: f64,
}

/// Record an engagement reward for a decision
#[utoipa::path(
    post,
    path = "/bandit/engagement",
    request_body = EngagementBody,
    responses(
        (status = 200, description = "Engagement reward recorded", body = RewardResponse),
        (status = 400, description = "Invalid body", body = ApiError),
        (status = 404, description = "Unknown decision", body = ApiError)
    ),
    tag = "bandit"
)]
pub async fn engagement(
    State(state): State<AppState>,
    Json(body): Json<EngagementBody>,
) -> Result<Json<RewardResponse>, ApiError> {
    if !(0.0..=1.0).contains(&body.value) {
        return Err(ApiError::validation("value must be within [0, 1]"));
    }

    record(state, body.decision_id, RewardType::Engagement, body.value).await
}

/// Per-arm performance for the active experiment
#[utoipa::path(
    get,
    path = "/bandit/performance",
    responses(
        (status = 200, description = "Per-arm aggregates", body = BanditPerformance),
        (status = 503, description = "No active bandit experiment", body = ApiError)
    ),
    tag = "bandit"
)]
pub async fn performance(
    State(state): State<AppState>,
) -> Result<Json<BanditPerformance>, ApiError> {
    state
        .bandit
        .performance()
        .await
        .map(Json)
        .map_err(map_bandit_error)
}

async fn record(
    state: AppState,
    decision_id: i64,
    reward_type: RewardType,
    raw_value: f64,
) -> Result<Json<RewardResponse>, ApiError> {
    let reward_value = state
        .bandit
        .reward(decision_id, reward_type, raw_value)
        .await
        .map_err(map_bandit_error)?;

    Ok(Json(RewardResponse {
        decision_id,
        reward_value,
    }))
}

fn map_bandit_error(err: BanditError) -> ApiError {
    match err {
        BanditError::Unavailable(message) => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "BANDIT_UNAVAILABLE",
            &message,
        ),
        BanditError::Repository(err) => err.into(),
    }
}
