//! Core error taxonomy (spec §7) and the HTTP response envelope.
//!
//! Every error response follows `{code, message, status_code, request_id, details?}`.
//! 5xx responses never carry stack traces or SQL text; 4xx responses may
//! carry field-level validation detail via `details`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("authentication required")]
    AuthError,

    #[error("{0}")]
    Forbidden(String),

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    PlanLimitExceeded {
        message: String,
        content_type: String,
        used: i64,
        limit: i64,
        plan: String,
    },

    #[error("content blocked by moderation")]
    ContentBlocked,

    #[error("input blocked by moderation")]
    InputBlocked,

    #[error("rate limited")]
    RateLimited,

    #[error("request too large")]
    RequestTooLarge,

    #[error("database connection error: {0}")]
    DatabaseConnectionError(String),

    #[error("database constraint error: {0}")]
    DatabaseConstraintError(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::AuthError => "AUTH_ERROR",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::PlanLimitExceeded { .. } => "PLAN_LIMIT_EXCEEDED",
            ApiError::ContentBlocked => "CONTENT_BLOCKED",
            ApiError::InputBlocked => "INPUT_BLOCKED",
            ApiError::RateLimited => "RATE_LIMITED",
            ApiError::RequestTooLarge => "REQUEST_TOO_LARGE",
            ApiError::DatabaseConnectionError(_) => "DATABASE_CONNECTION_ERROR",
            ApiError::DatabaseConstraintError(_) => "DATABASE_CONSTRAINT_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::AuthError => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::PlanLimitExceeded { .. } | ApiError::ContentBlocked | ApiError::InputBlocked => {
                StatusCode::FORBIDDEN
            }
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::DatabaseConnectionError(_) | ApiError::ServiceUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::DatabaseConstraintError(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::PlanLimitExceeded {
                content_type,
                used,
                limit,
                plan,
                ..
            } => Some(serde_json::json!({
                "content_type": content_type,
                "used": used,
                "limit": limit,
                "plan": plan,
            })),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    status_code: u16,
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "internal error");
        }

        let request_id = crate::server::middleware::request_id::current();
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            status_code: status.as_u16(),
            request_id,
            details: self.details(),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
