#![deny(missing_docs)]

//! # civic-core: Foundational Types for the Civic Jurisdiction Engine
//!
//! This crate defines the vocabulary every other crate in the workspace
//! speaks. It has no internal crate dependencies, only `serde`,
//! `serde_json`, `thiserror`, `chrono`, and `uuid` from the ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** A [`NodeId`] cannot be passed
//!    where a [`UserId`] is expected. Codes, mobile numbers, and emails are
//!    validated at construction and at deserialization.
//!
//! 2. **One sum type per binding.** A user's place in a hierarchy is a
//!    [`HierarchyBinding`], not a bundle of nullable foreign keys. The
//!    resolver dispatches on the tag.
//!
//! 3. **Explicit rank table.** [`AdminLevel::rank`] is the single source of
//!    truth for "strictly narrower than". No ordering is inferred from
//!    declaration order or string comparison.
//!
//! 4. **Denials are values.** Every expected refusal is a [`Denial`] carrying
//!    a stable [`DenialReason`] code. Only infrastructure faults are errors
//!    in the exceptional sense.

pub mod binding;
pub mod decision;
pub mod error;
pub mod hierarchy;
pub mod identity;
pub mod level;
pub mod user;

// Re-export primary types at crate root for ergonomic imports.
pub use binding::{Bindings, HierarchyBinding};
pub use decision::{Decision, Denial, DenialReason};
pub use error::{validate_name, CivicError, ValidationError};
pub use hierarchy::{HierarchyKind, Lineage, NodeClass, NodeSlot, SectorType, Tier};
pub use identity::{ContentId, Email, MobileNumber, NodeCode, NodeId, UserId};
pub use level::{AdminLevel, Role};
pub use user::{User, UserStatus};
