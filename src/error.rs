//! # Error Handling
//!
//! This module provides unified error handling for the newsrank API,
//! implementing a consistent problem+json response format with trace ID
//! propagation. Only the outermost boundary maps errors to HTTP; components
//! return typed results and recover locally where the contract allows.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
            trace_id: None,
        }
    }

    /// Attach the request trace id extracted from headers
    pub fn with_headers(mut self, headers: &HeaderMap) -> Self {
        self.trace_id = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        self
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(details.into());
        self
    }

    /// 400 with a machine-readable validation code
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::new::<String>(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED".to_string(),
            message.into(),
        )
    }

    /// 404 for an unknown resource
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new::<String>(StatusCode::NOT_FOUND, "NOT_FOUND".to_string(), message.into())
    }

    /// 500 for storage failures on the critical read path
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new::<String>(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR".to_string(),
            message.into(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}

/// Errors bubbling out of request handlers.
pub enum AppError {
    Api(ApiError),
    Anyhow(anyhow::Error),
    Json(JsonRejection),
    Db(sea_orm::DbErr),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            AppError::Api(err) => {
                return err.into_response();
            }
            AppError::Anyhow(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                err.to_string(),
            ),
            AppError::Json(err) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED", err.to_string()),
            AppError::Db(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                err.to_string(),
            ),
        };

        let api_error = ApiError::new(status, error_code, &message);

        (api_error.status, axum::Json(api_error)).into_response()
    }
}

impl From<ApiError> for AppError {
    fn from(error: ApiError) -> Self {
        AppError::Api(error)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Anyhow(error)
    }
}

impl From<JsonRejection> for AppError {
    fn from(error: JsonRejection) -> Self {
        AppError::Json(error)
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(error: sea_orm::DbErr) -> Self {
        AppError::Db(error)
    }
}

/// Errors surfaced by the repository layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
}

impl RepositoryError {
    /// Wrap a SeaORM error, keeping the call sites terse.
    pub fn database_error(err: sea_orm::DbErr) -> Self {
        RepositoryError::Database(err)
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        RepositoryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::not_found(format!("{} {} not found", entity, id))
            }
            RepositoryError::Database(db_err) => ApiError::internal(db_err.to_string()),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        AppError::Api(err.into())
    }
}
