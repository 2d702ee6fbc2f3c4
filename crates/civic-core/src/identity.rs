//! # Identity Newtypes
//!
//! Domain-primitive newtypes for identifiers throughout the engine.
//! Each identifier is a distinct type: you cannot pass a [`UserId`]
//! where a [`NodeId`] is expected.
//!
//! ## Validation
//!
//! String-based values ([`NodeCode`], [`MobileNumber`], [`Email`]) validate
//! format at construction time and at deserialization time. UUID-based
//! identifiers ([`NodeId`], [`UserId`], [`ContentId`]) are always valid by
//! construction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Implements `Deserialize` for string newtypes by routing the raw string
/// through the type's `new()` constructor, so invalid values are rejected
/// at deserialization time instead of silently accepted.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Generates a UUID-backed identifier with the usual constructors and
/// trait impls. Serialized transparently as the bare UUID string.
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $ty(Uuid);

        impl $ty {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $ty {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s).map(Self)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// UUID-based identifiers (always valid by construction)
// ---------------------------------------------------------------------------

uuid_identifier!(
    /// Surrogate identifier of a node in any of the three hierarchies.
    ///
    /// The engine addresses nodes only by this id; human-readable
    /// [`NodeCode`]s exist for seed and import tooling.
    NodeId
);

uuid_identifier!(
    /// Identifier of a registered member or administrator.
    UserId
);

uuid_identifier!(
    /// Identifier of a targetable content item (bulletin, survey, ...).
    ContentId
);

// ---------------------------------------------------------------------------
// String-based values (validated at construction)
// ---------------------------------------------------------------------------

/// Human-readable node code, unique within a node class (e.g. `"KRT"`
/// for a region, `"KRT-E-07"` for a district).
///
/// # Validation
///
/// - Non-empty after trimming
/// - At most 64 characters
/// - No interior whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeCode(String);

impl_validating_deserialize!(NodeCode);

impl NodeCode {
    /// Maximum accepted code length, in characters.
    pub const MAX_LEN: usize = 64;

    /// Create a node code, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidNodeCode`] if the code is empty,
    /// too long, or contains whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let trimmed = value.into().trim().to_string();
        if trimmed.is_empty()
            || trimmed.chars().count() > Self::MAX_LEN
            || trimmed.chars().any(char::is_whitespace)
        {
            return Err(ValidationError::InvalidNodeCode(trimmed));
        }
        Ok(Self(trimmed))
    }

    /// Access the code string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A member's mobile number, stored normalized (separators stripped).
///
/// Accepts an optional leading `+` followed by 8–15 digits. Spaces and
/// dashes are accepted on input and removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MobileNumber(String);

impl_validating_deserialize!(MobileNumber);

impl MobileNumber {
    /// Create a mobile number, normalizing separators.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidMobileNumber`] if the value does not
    /// contain 8–15 digits with an optional leading `+`.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = value.into();
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| *c != ' ' && *c != '-')
            .collect();
        let digits = normalized.strip_prefix('+').unwrap_or(&normalized);
        if !(8..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidMobileNumber(raw));
        }
        Ok(Self(normalized))
    }

    /// Access the normalized number.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MobileNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A member's email address, stored lowercase.
///
/// Validation is structural only: exactly one `@`, a non-empty local part,
/// and a domain containing a dot. Deliverability is not checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Email(String);

impl_validating_deserialize!(Email);

impl Email {
    /// Create an email address, lowercasing it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidEmail`] if the address is not
    /// structurally valid or exceeds 254 characters.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let lowered = value.into().trim().to_lowercase();
        let valid = lowered.len() <= 254
            && !lowered.chars().any(char::is_whitespace)
            && match lowered.split_once('@') {
                Some((local, domain)) => {
                    !local.is_empty()
                        && !domain.contains('@')
                        && domain.contains('.')
                        && !domain.starts_with('.')
                        && !domain.ends_with('.')
                }
                None => false,
            };
        if !valid {
            return Err(ValidationError::InvalidEmail(lowered));
        }
        Ok(Self(lowered))
    }

    /// Access the email string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_unique() {
        assert_ne!(NodeId::new(), NodeId::new());
    }

    #[test]
    fn node_id_serializes_as_bare_uuid() {
        let id = NodeId::from_uuid(Uuid::nil());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn user_id_parses_from_str() {
        let uuid = Uuid::new_v4();
        let parsed: UserId = uuid.to_string().parse().unwrap();
        assert_eq!(*parsed.as_uuid(), uuid);
    }

    #[test]
    fn node_code_trims_and_accepts_unicode() {
        let code = NodeCode::new("  الخرطوم  ").unwrap();
        assert_eq!(code.as_str(), "الخرطوم");
    }

    #[test]
    fn node_code_rejects_empty_and_whitespace() {
        assert!(NodeCode::new("").is_err());
        assert!(NodeCode::new("   ").is_err());
        assert!(NodeCode::new("KRT 01").is_err());
    }

    #[test]
    fn node_code_rejects_overlong() {
        assert!(NodeCode::new("x".repeat(65)).is_err());
        assert!(NodeCode::new("x".repeat(64)).is_ok());
    }

    #[test]
    fn node_code_deserialize_validates() {
        assert!(serde_json::from_str::<NodeCode>("\"KRT\"").is_ok());
        assert!(serde_json::from_str::<NodeCode>("\"\"").is_err());
    }

    #[test]
    fn mobile_number_normalizes_separators() {
        let m = MobileNumber::new("+249 912-345-678").unwrap();
        assert_eq!(m.as_str(), "+249912345678");
    }

    #[test]
    fn mobile_number_rejects_bad_input() {
        assert!(MobileNumber::new("12345").is_err());
        assert!(MobileNumber::new("0912abc678").is_err());
        assert!(MobileNumber::new("+1234567890123456").is_err());
    }

    #[test]
    fn email_lowercases() {
        let e = Email::new("Member@Example.ORG").unwrap();
        assert_eq!(e.as_str(), "member@example.org");
    }

    #[test]
    fn email_rejects_malformed() {
        assert!(Email::new("no-at-sign").is_err());
        assert!(Email::new("@example.org").is_err());
        assert!(Email::new("a@b@example.org").is_err());
        assert!(Email::new("a@localhost").is_err());
        assert!(Email::new("a@.org").is_err());
    }
}
