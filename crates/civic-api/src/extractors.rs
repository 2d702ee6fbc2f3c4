//! # Request Extraction & Validation
//!
//! The [`Validate`] trait for request DTOs, helpers to extract and validate
//! JSON bodies in handlers, and shared list pagination.

use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::AppError;

/// Business-rule validation beyond what serde checks.
pub trait Validate {
    /// Validate business rules. Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and run its [`Validate`] rules.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// `?limit=&offset=` on list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
pub struct PaginationParams {
    /// Maximum number of items to return (default 100, max 1000).
    pub limit: Option<usize>,
    /// Number of items to skip (default 0).
    pub offset: Option<usize>,
}

impl PaginationParams {
    const DEFAULT_LIMIT: usize = 100;
    const MAX_LIMIT: usize = 1000;

    fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).min(Self::MAX_LIMIT)
    }

    /// Apply the window to an already ordered list.
    pub fn page<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = self.offset.unwrap_or(0);
        items
            .into_iter()
            .skip(offset)
            .take(self.effective_limit())
            .collect()
    }
}
