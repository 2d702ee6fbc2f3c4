//! # Decisions and Denials
//!
//! Every check in the engine returns a [`Decision`]: `Ok` on allow, or a
//! [`Denial`] naming a stable [`DenialReason`] code. Callers translate the
//! code to their own surface (HTTP status, CLI exit code). Denials are
//! never panics and never swallowed.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::error::ValidationError;

/// Outcome of a jurisdiction or structural check.
pub type Decision<T = ()> = Result<T, Denial>;

/// Stable machine-readable reason for a refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialReason {
    /// Requested admin level is not strictly below the creator's level.
    InsufficientLevel,
    /// Target node is outside the actor's controlled subtree.
    OutOfJurisdiction,
    /// A binding, target, or reparent crosses hierarchy kinds or sector types.
    HierarchyKindMismatch,
    /// Public signup attempted at a node that is not the deepest of its branch.
    MustBindDeepestLevel,
    /// Node still has at least one active child.
    HasActiveChildren,
    /// At least one user is bound to the node.
    HasBoundUsers,
    /// Referenced node does not exist or is inactive.
    NodeNotFound,
    /// Content targeting is set on incompatible kinds or branches.
    AmbiguousTarget,
    /// The node's class does not match the requested admin level or target slot.
    LevelNodeMismatch,
    /// The node class cannot be placed under the given parent.
    InvalidParent,
    /// Reparenting would place a node under itself or a descendant.
    CycleDetected,
    /// A node with the same code already exists in the class.
    DuplicateCode,
}

impl DenialReason {
    /// Every reason, in declaration order.
    pub fn all() -> &'static [DenialReason] {
        &[
            Self::InsufficientLevel,
            Self::OutOfJurisdiction,
            Self::HierarchyKindMismatch,
            Self::MustBindDeepestLevel,
            Self::HasActiveChildren,
            Self::HasBoundUsers,
            Self::NodeNotFound,
            Self::AmbiguousTarget,
            Self::LevelNodeMismatch,
            Self::InvalidParent,
            Self::CycleDetected,
            Self::DuplicateCode,
        ]
    }

    /// The stable wire code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientLevel => "INSUFFICIENT_LEVEL",
            Self::OutOfJurisdiction => "OUT_OF_JURISDICTION",
            Self::HierarchyKindMismatch => "HIERARCHY_KIND_MISMATCH",
            Self::MustBindDeepestLevel => "MUST_BIND_DEEPEST_LEVEL",
            Self::HasActiveChildren => "HAS_ACTIVE_CHILDREN",
            Self::HasBoundUsers => "HAS_BOUND_USERS",
            Self::NodeNotFound => "NODE_NOT_FOUND",
            Self::AmbiguousTarget => "AMBIGUOUS_TARGET",
            Self::LevelNodeMismatch => "LEVEL_NODE_MISMATCH",
            Self::InvalidParent => "INVALID_PARENT",
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::DuplicateCode => "DUPLICATE_CODE",
        }
    }
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DenialReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownCode {
                kind: "denial reason",
                value: s.to_string(),
            })
    }
}

/// A refusal with its reason code and a human-readable detail.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{reason}: {detail}")]
pub struct Denial {
    /// Stable reason code.
    pub reason: DenialReason,
    /// What was refused, for logs and error bodies.
    pub detail: String,
}

impl Denial {
    /// Build a denial.
    pub fn new(reason: DenialReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    /// Shorthand for a [`DenialReason::NodeNotFound`] denial about `node`.
    pub fn node_not_found(node: impl std::fmt::Display) -> Self {
        Self::new(
            DenialReason::NodeNotFound,
            format!("node {node} does not exist or is inactive"),
        )
    }
}
