//! # User Record
//!
//! A member or administrator with their bindings. The record is a plain
//! snapshot; the jurisdiction engine never mutates it in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::binding::{Bindings, HierarchyBinding};
use crate::error::ValidationError;
use crate::hierarchy::{HierarchyKind, Lineage};
use crate::identity::{Email, MobileNumber, UserId};
use crate::level::{AdminLevel, Role};

/// Account status. Users are suspended, never hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    /// Normal.
    Active,
    /// Soft-disabled; bindings are kept for history.
    Suspended,
}

impl UserStatus {
    /// Wire code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Suspended => "SUSPENDED",
        }
    }
}

impl FromStr for UserStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "SUSPENDED" => Ok(Self::Suspended),
            other => Err(ValidationError::UnknownCode {
                kind: "user status",
                value: other.to_string(),
            }),
        }
    }
}

/// A registered member or administrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Identifier.
    pub id: UserId,
    /// Display name.
    pub full_name: String,
    /// Unique mobile number.
    pub mobile: MobileNumber,
    /// Unique email.
    pub email: Email,
    /// Coarse role, derived from `admin_level`.
    pub role: Role,
    /// Administrative level.
    pub admin_level: AdminLevel,
    /// Which binding governs jurisdiction and visibility.
    pub active_hierarchy: HierarchyKind,
    /// At most one binding per kind.
    pub bindings: Bindings,
    /// Ancestor ids of the active binding's node.
    pub lineage: Lineage,
    /// Account status.
    pub status: UserStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The binding selected by `active_hierarchy`, if present.
    pub fn active_binding(&self) -> Option<&HierarchyBinding> {
        self.bindings.get(self.active_hierarchy)
    }
}
