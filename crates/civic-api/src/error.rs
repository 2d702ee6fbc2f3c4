//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps access denials, validation failures, and storage faults to HTTP
//! status codes with a JSON body of error code, message, and details.
//! Internal error details are never returned to clients.
//!
//! ## Denial mapping
//!
//! | Denial reason | Status |
//! |---------------|--------|
//! | `NODE_NOT_FOUND` | 404 |
//! | `HAS_ACTIVE_CHILDREN`, `HAS_BOUND_USERS`, `DUPLICATE_CODE` | 409 |
//! | `AMBIGUOUS_TARGET`, `LEVEL_NODE_MISMATCH`, `INVALID_PARENT`, `CYCLE_DETECTED`, `MUST_BIND_DEEPEST_LEVEL` | 422 |
//! | `INSUFFICIENT_LEVEL`, `OUT_OF_JURISDICTION`, `HIERARCHY_KIND_MISMATCH` | 403 |
//!
//! The reason code itself is returned in `details.reason`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use civic_core::{Denial, DenialReason};
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
    /// Machine-readable error code (e.g., "NOT_FOUND", "FORBIDDEN").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A jurisdiction or structural rule refused the request.
    #[error("{0}")]
    Denied(Denial),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

/// HTTP status for a denial reason.
pub fn denial_status(reason: DenialReason) -> StatusCode {
    match reason {
        DenialReason::NodeNotFound => StatusCode::NOT_FOUND,
        DenialReason::HasActiveChildren
        | DenialReason::HasBoundUsers
        | DenialReason::DuplicateCode => StatusCode::CONFLICT,
        DenialReason::AmbiguousTarget
        | DenialReason::LevelNodeMismatch
        | DenialReason::InvalidParent
        | DenialReason::CycleDetected
        | DenialReason::MustBindDeepestLevel => StatusCode::UNPROCESSABLE_ENTITY,
        DenialReason::InsufficientLevel
        | DenialReason::OutOfJurisdiction
        | DenialReason::HierarchyKindMismatch => StatusCode::FORBIDDEN,
    }
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Denied(denial) => {
                let status = denial_status(denial.reason);
                let code = match status {
                    StatusCode::NOT_FOUND => "NOT_FOUND",
                    StatusCode::CONFLICT => "CONFLICT",
                    StatusCode::UNPROCESSABLE_ENTITY => "VALIDATION_ERROR",
                    _ => "FORBIDDEN",
                };
                (status, code)
            }
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
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
            Self::Denied(denial) => {
                metrics::counter!(
                    "civic_access_denials_total",
                    "reason" => denial.reason.as_str()
                )
                .increment(1);
                Some(serde_json::json!({ "reason": denial.reason.as_str() }))
            }
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

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        Self::Denied(denial)
    }
}

impl From<civic_core::ValidationError> for AppError {
    fn from(err: civic_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(format!("database error: {err}"))
    }
}

impl From<crate::db::WriteError> for AppError {
    fn from(err: crate::db::WriteError) -> Self {
        match err {
            crate::db::WriteError::Denied(denial) => Self::Denied(denial),
            crate::db::WriteError::Conflict(msg) => Self::Conflict(msg),
            crate::db::WriteError::Database(e) => Self::from(e),
        }
    }
}
