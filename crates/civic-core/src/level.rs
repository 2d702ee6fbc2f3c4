//! # Administrative Levels
//!
//! [`AdminLevel`] is ordered by an explicit rank table, not by declaration
//! order. Two levels may share a rank (`NATIONAL_LEVEL` and
//! `EXPATRIATE_GENERAL`; `REGION` and `EXPATRIATE_REGION`); neither is then
//! narrower than the other.
//!
//! | Level | Rank | Scope |
//! |-------|------|-------|
//! | ADMIN | 100 | unscoped |
//! | GENERAL_SECRETARIAT | 90 | unscoped |
//! | NATIONAL_LEVEL | 80 | geographic or sector node at NATIONAL |
//! | EXPATRIATE_GENERAL | 80 | whole expatriate kind, or one region |
//! | REGION | 70 | node at REGION |
//! | EXPATRIATE_REGION | 70 | one expatriate region |
//! | LOCALITY | 60 | node at LOCALITY |
//! | ADMIN_UNIT | 50 | node at ADMIN_UNIT |
//! | DISTRICT | 40 | node at DISTRICT |
//! | USER | 0 | member, any node |

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ValidationError;
use crate::hierarchy::Tier;

/// Coarse legacy role flag, derived from [`AdminLevel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Any non-`USER` level.
    Admin,
    /// Ordinary member.
    User,
}

impl Role {
    /// Wire code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::User => "USER",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Self::Admin),
            "USER" => Ok(Self::User),
            other => Err(ValidationError::UnknownCode {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// Administrative level of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminLevel {
    /// Root administrator.
    Admin,
    /// General secretariat.
    GeneralSecretariat,
    /// National level of the geographic or a sector tree.
    NationalLevel,
    /// Head of the expatriate hierarchy.
    ExpatriateGeneral,
    /// Region administrator.
    Region,
    /// Expatriate region administrator.
    ExpatriateRegion,
    /// Locality administrator.
    Locality,
    /// Administrative unit administrator.
    AdminUnit,
    /// District administrator.
    District,
    /// Ordinary member.
    User,
}

impl AdminLevel {
    /// All levels, widest first.
    pub fn all() -> &'static [AdminLevel] {
        &[
            Self::Admin,
            Self::GeneralSecretariat,
            Self::NationalLevel,
            Self::ExpatriateGeneral,
            Self::Region,
            Self::ExpatriateRegion,
            Self::Locality,
            Self::AdminUnit,
            Self::District,
            Self::User,
        ]
    }

    /// Position in the total order. Higher is wider.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Admin => 100,
            Self::GeneralSecretariat => 90,
            Self::NationalLevel | Self::ExpatriateGeneral => 80,
            Self::Region | Self::ExpatriateRegion => 70,
            Self::Locality => 60,
            Self::AdminUnit => 50,
            Self::District => 40,
            Self::User => 0,
        }
    }

    /// `self` is strictly narrower than `other`.
    pub fn is_narrower_than(&self, other: AdminLevel) -> bool {
        self.rank() < other.rank()
    }

    /// `ADMIN` and `GENERAL_SECRETARIAT` carry no node binding and control
    /// everything.
    pub fn is_unscoped(&self) -> bool {
        matches!(self, Self::Admin | Self::GeneralSecretariat)
    }

    /// Levels that exist only in the expatriate hierarchy.
    pub fn is_expatriate(&self) -> bool {
        matches!(self, Self::ExpatriateGeneral | Self::ExpatriateRegion)
    }

    /// The node tier a tiered administrator is bound at.
    pub fn tier(&self) -> Option<Tier> {
        match self {
            Self::NationalLevel => Some(Tier::National),
            Self::Region => Some(Tier::Region),
            Self::Locality => Some(Tier::Locality),
            Self::AdminUnit => Some(Tier::AdminUnit),
            Self::District => Some(Tier::District),
            _ => None,
        }
    }

    /// `ADMIN` for any non-`USER` level.
    pub fn derived_role(&self) -> Role {
        match self {
            Self::User => Role::User,
            _ => Role::Admin,
        }
    }

    /// Wire code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::GeneralSecretariat => "GENERAL_SECRETARIAT",
            Self::NationalLevel => "NATIONAL_LEVEL",
            Self::ExpatriateGeneral => "EXPATRIATE_GENERAL",
            Self::Region => "REGION",
            Self::ExpatriateRegion => "EXPATRIATE_REGION",
            Self::Locality => "LOCALITY",
            Self::AdminUnit => "ADMIN_UNIT",
            Self::District => "DISTRICT",
            Self::User => "USER",
        }
    }
}

impl std::fmt::Display for AdminLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownCode {
                kind: "admin level",
                value: s.to_string(),
            })
    }
}
