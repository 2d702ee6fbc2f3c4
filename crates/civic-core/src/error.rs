//! # Error Types
//!
//! Construction and parsing failures for the core vocabulary. All errors
//! use `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! Expected refusals from the jurisdiction engine are *not* errors in this
//! sense; they are [`Denial`](crate::decision::Denial) values. The
//! top-level [`CivicError`] wraps both so binaries can propagate either
//! with `?`.

use thiserror::Error;

use crate::decision::Denial;

/// Top-level error type for the civic engine.
#[derive(Error, Debug)]
pub enum CivicError {
    /// A domain value failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A jurisdiction or structural check refused the operation.
    #[error("denied: {0}")]
    Denied(#[from] Denial),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validation errors for domain primitive newtypes and enum codes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Node code is empty, too long, or contains whitespace.
    #[error("invalid node code: {0:?}")]
    InvalidNodeCode(String),

    /// Mobile number is not 8–15 digits with an optional leading `+`.
    #[error("invalid mobile number: {0:?}")]
    InvalidMobileNumber(String),

    /// Email address is structurally invalid.
    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),

    /// Display name (node name, user full name) is empty or too long.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// A string did not match any variant of a coded enum.
    #[error("unknown {kind}: {value:?}")]
    UnknownCode {
        /// The enum being parsed (e.g. `"admin level"`).
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}

impl From<serde_json::Error> for CivicError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Validate a human-readable display name: non-empty after trimming and at
/// most 200 characters. Returns the trimmed name.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidName`] when the name is blank or
/// too long.
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > 200 {
        return Err(ValidationError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DenialReason;

    #[test]
    fn validation_error_display() {
        let err = ValidationError::UnknownCode {
            kind: "tier",
            value: "CITY".into(),
        };
        assert_eq!(err.to_string(), "unknown tier: \"CITY\"");
    }

    #[test]
    fn denial_converts_into_civic_error() {
        let err: CivicError = Denial::new(DenialReason::HasBoundUsers, "2 users").into();
        assert!(matches!(err, CivicError::Denied(_)));
        assert!(err.to_string().contains("HAS_BOUND_USERS"));
    }

    #[test]
    fn validate_name_trims() {
        assert_eq!(validate_name("  الخرطوم ").unwrap(), "الخرطوم");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"n".repeat(201)).is_err());
    }
}
