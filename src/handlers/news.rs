//! # News Endpoint Handlers
//!
//! The public feed: ranked top news, article detail, and click reporting.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::ranking::facade::{FeedRequest, FeedResponse, FeedSort, NewsDetail};
use crate::server::AppState;

/// Query parameters for the ranked feed
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopNewsQuery {
    /// Number of items to return (default 20, max 100)
    pub n: Option<usize>,
    /// Comma-separated issuer codes to filter by
    pub tickers: Option<String>,
    /// Language filter (currently informational)
    pub lang: Option<String>,
    /// Apply per-user re-ranking
    pub personalized: Option<bool>,
    /// User whose preferences drive personalization
    pub user_id: Option<String>,
    /// Apply the MMR diversity filter
    pub diversity: Option<bool>,
    /// Ordering: rank (default) or latest
    pub sort: Option<String>,
}

/// Ranked top news feed
#[utoipa::path(
    get,
    path = "/news/top",
    params(TopNewsQuery),
    responses(
        (status = 200, description = "Ranked feed", body = FeedResponse),
        (status = 400, description = "Invalid query parameters", body = ApiError),
        (status = 500, description = "Storage failure", body = ApiError)
    ),
    tag = "news"
)]
pub async fn top_news(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TopNewsQuery>,
) -> Result<Json<FeedResponse>, ApiError> {
    let n = query.n.unwrap_or(20);
    if !(1..=100).contains(&n) {
        return Err(ApiError::validation("n must be between 1 and 100"));
    }

    let sort = match query.sort.as_deref() {
        None => FeedSort::Rank,
        Some(raw) => {
            FeedSort::parse(raw).ok_or_else(|| ApiError::validation("sort must be rank or latest"))?
        }
    };

    let tickers = query
        .tickers
        .map(|raw| {
            raw.split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let request = FeedRequest {
        n,
        tickers,
        lang: query.lang,
        personalized: query.personalized.unwrap_or(false),
        user_id: query.user_id,
        diversity: query.diversity.unwrap_or(true),
        sort,
    };

    let anon_id = anon_id_from(&headers);
    let user_agent = headers
        .get("user-agent")
        .and_then(|value| value.to_str().ok());

    let feed = state
        .facade
        .top_news(&request, &anon_id, user_agent)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(feed))
}

/// One article with its score detail
#[utoipa::path(
    get,
    path = "/news/{id}",
    params(("id" = i64, Path, description = "Article id")),
    responses(
        (status = 200, description = "Article detail", body = NewsDetail),
        (status = 404, description = "Unknown article", body = ApiError)
    ),
    tag = "news"
)]
pub async fn news_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<NewsDetail>, ApiError> {
    let detail = state
        .facade
        .news_detail(id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("news {} not found", id)))?;

    Ok(Json(detail))
}

/// Click report body
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClickBody {
    /// Authenticated user id, when known
    pub user_id: Option<String>,
    /// Anonymous visitor id (UUID)
    pub anon_id: String,
    /// Milliseconds the reader spent on the article
    pub dwell_time_ms: Option<i64>,
}

/// Record a click on an article
#[utoipa::path(
    post,
    path = "/news/{id}/click",
    params(("id" = i64, Path, description = "Article id")),
    request_body = ClickBody,
    responses(
        (status = 202, description = "Click accepted"),
        (status = 400, description = "Invalid body", body = ApiError),
        (status = 404, description = "Unknown article", body = ApiError)
    ),
    tag = "news"
)]
pub async fn click(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ClickBody>,
) -> Result<StatusCode, ApiError> {
    if body.anon_id.is_empty() {
        return Err(ApiError::validation("anonId is required"));
    }
    if let Some(dwell) = body.dwell_time_ms
        && dwell < 0
    {
        return Err(ApiError::validation("dwellTimeMs must be non-negative"));
    }

    state
        .facade
        .record_click(id, &body.anon_id, body.user_id, body.dwell_time_ms)
        .await
        .map_err(ApiError::from)?;

    Ok(StatusCode::ACCEPTED)
}

/// The anon id travels in a header; absent one, each request gets a fresh
/// identity (no assignment stability, but nothing breaks).
fn anon_id_from(headers: &HeaderMap) -> String {
    headers
        .get("x-anon-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
