//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`cuti_core::DomainError`] and database failures to HTTP status codes
//! and JSON bodies of the form `{"error": {"code", "message", "details"?}}`.
//! Internal error details are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cuti_core::DomainError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "QUOTA_EXCEEDED").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for some client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("{0}")]
    NotFound(String),

    /// Request body failed business-rule validation (422).
    #[error("{0}")]
    Validation(String),

    /// Malformed request or rejected domain input (400).
    #[error("{0}")]
    BadRequest(String),

    /// Requested days exceed the remaining balance (400).
    #[error("{message}")]
    QuotaExceeded {
        message: String,
        remaining: i32,
        requested: i32,
    },

    /// Missing or invalid credentials (401).
    #[error("{0}")]
    Unauthorized(String),

    /// Insufficient role (403).
    #[error("{0}")]
    Forbidden(String),

    /// Uniqueness conflict (409).
    #[error("{0}")]
    Conflict(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::QuotaExceeded { .. } => (StatusCode::BAD_REQUEST, "QUOTA_EXCEEDED"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Shorthand for wrapping an infrastructure failure.
    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Internal(format!("{context}: {err}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let details = match &self {
            Self::QuotaExceeded {
                remaining,
                requested,
                ..
            } => Some(serde_json::json!({ "remaining": remaining, "requested": requested })),
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { .. } => Self::NotFound(err.to_string()),
            DomainError::Conflict(msg) => Self::Conflict(msg),
            DomainError::Validation(msg) => Self::BadRequest(msg),
            DomainError::QuotaExceeded {
                remaining,
                requested,
                ..
            } => Self::QuotaExceeded {
                message: err.to_string(),
                remaining,
                requested,
            },
            DomainError::Forbidden(msg) => Self::Forbidden(msg),
        }
    }
}

/// Unique-constraint violations surface as conflicts; everything else is internal.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some("23505") {
                return Self::Conflict(db.message().to_string());
            }
        }
        Self::Internal(format!("database error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn response_parts(err: AppError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        (status, body)
    }

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (
                AppError::Validation("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
            ),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT, "CONFLICT"),
            (
                AppError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_and_code(), (status, code));
        }
    }

    #[test]
    fn domain_errors_map_to_http_semantics() {
        let nf = AppError::from(DomainError::not_found("personnel", "85011001"));
        assert_eq!(nf.status_and_code().0, StatusCode::NOT_FOUND);

        let gender = AppError::from(DomainError::Validation("restricted".into()));
        assert_eq!(gender.status_and_code().0, StatusCode::BAD_REQUEST);

        let conflict = AppError::from(DomainError::Conflict("dup".into()));
        assert_eq!(conflict.status_and_code().0, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn quota_exceeded_carries_details() {
        let err = AppError::from(DomainError::QuotaExceeded {
            leave_type: "Cuti Tahunan".into(),
            remaining: 7,
            requested: 8,
        });
        let (status, body) = response_parts(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error.code, "QUOTA_EXCEEDED");
        assert_eq!(
            body.error.message,
            "Quota for Cuti Tahunan insufficient. Remaining: 7 days, Requested: 8 days"
        );
        let details = body.error.details.unwrap();
        assert_eq!(details["remaining"], 7);
        assert_eq!(details["requested"], 8);
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let (status, body) =
            response_parts(AppError::Internal("db connection failed".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.message, "An internal error occurred");
        assert!(body.error.details.is_none());
    }

    #[tokio::test]
    async fn client_errors_keep_message() {
        let (status, body) = response_parts(AppError::Conflict("nrp exists".into())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.error.message, "nrp exists");
    }
}
