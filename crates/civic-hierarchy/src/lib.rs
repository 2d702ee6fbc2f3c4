//! # civic-hierarchy: Hierarchy Store and Mutation Guard
//!
//! Holds the three administrative hierarchies in a single arena and
//! enforces their structural rules.
//!
//! ## Modules
//!
//! - **Store** (`store.rs`): [`HierarchyStore`], an arena keyed by
//!   [`civic_core::NodeId`] with child and code indexes. Closure, chain,
//!   and lineage queries walk the arena and never cross a kind boundary.
//!
//! - **Guard** (`guard.rs`): the checks run before every structural write.
//!   Parent fit, sector-type consistency, code uniqueness, cycle
//!   prevention, and the no-orphan rule on deactivation.
//!
//! - **Seed** (`seed.rs`): YAML import through the guard, used by the API
//!   at boot and by the `civic` CLI.
//!
//! ## Design
//!
//! Child lookups are index-based rather than relation-based, so every
//! traversal is a plain loop over the arena and is testable without a
//! database. Nodes are never removed: deactivation is a terminal status
//! change.

pub mod guard;
pub mod seed;
pub mod store;

pub use guard::{can_create_child, can_deactivate, can_reparent, BoundUsers};
pub use seed::{load_seed, load_seed_file, SeedDocument, SeedError};
pub use store::{HierarchyNode, HierarchyStore, NewNode, NodeStatus};
