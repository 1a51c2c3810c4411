//! API error taxonomy and its `IntoResponse` mapping to the problem+json
//! envelope spec.md §6 describes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("invalid video id: {0}")]
    InvalidVideoId(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found")]
    NotFound,

    #[error("rate limit exceeded")]
    RateLimited { retry_after: u64, reset_at: u64 },

    #[error("server authentication not configured")]
    AuthNotConfigured,

    #[error("cache error: {0}")]
    Cache(#[from] subtitle_cache::CacheError),

    #[error("database error: {0}")]
    Db(#[from] subtitle_db::DbError),

    #[error("queue error: {0}")]
    Queue(#[from] subtitle_queue::QueueError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "INVALID_REQUEST",
            ApiError::InvalidVideoId(_) => "INVALID_VIDEO_ID",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound => "SUBTITLE_NOT_FOUND",
            ApiError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::AuthNotConfigured => "INTERNAL_ERROR",
            ApiError::Cache(_) | ApiError::Db(_) | ApiError::Queue(_) | ApiError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidVideoId(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::AuthNotConfigured
            | ApiError::Cache(_)
            | ApiError::Db(_)
            | ApiError::Queue(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<Value>,
    timestamp: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Internal details never cross the boundary as-is; only the
        // redacted message does, mirroring the corpus's production-mode
        // error redaction.
        let message = match &self {
            ApiError::Cache(_) | ApiError::Db(_) | ApiError::Queue(_) | ApiError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            ApiError::AuthNotConfigured => self.to_string(),
            other => other.to_string(),
        };

        let meta = match &self {
            ApiError::RateLimited {
                retry_after,
                reset_at,
            } => Some(serde_json::json!({
                "retry_after": retry_after,
                "reset_at": reset_at,
            })),
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message,
                hint: None,
                request_id: uuid::Uuid::new_v4().to_string(),
                meta,
                timestamp: Utc::now().to_rfc3339(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        response
            .headers_mut()
            .insert("X-Error-Code", code.parse().unwrap());
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            "application/problem+json".parse().unwrap(),
        );
        response
    }
}
