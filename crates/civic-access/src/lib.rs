//! # civic-access: Jurisdiction and Visibility Decisions
//!
//! The access layer of the civic engine. Every function here takes the
//! actor or viewer explicitly, reads the [`civic_hierarchy::HierarchyStore`],
//! and returns a [`civic_core::Decision`] or a plain boolean. Nothing here
//! performs I/O beyond logging.
//!
//! ## Modules
//!
//! - **Actor** (`actor.rs`): the authenticated caller snapshot.
//! - **Jurisdiction** (`jurisdiction.rs`): [`resolve`] and
//!   [`is_in_jurisdiction`], the bulk and point forms of "which nodes does
//!   this administrator control", plus [`can_administer`] for structural
//!   edits.
//! - **Visibility** (`visibility.rs`): [`is_visible`] and
//!   [`build_predicate`] for member reads; [`can_manage`] for
//!   administrator writes; [`resolve_target`] and [`normalize_targeting`]
//!   for stamping targets on new content.
//! - **Admission** (`admission.rs`): [`can_create_admin`] and
//!   [`can_rebind_user`].
//! - **Audit** (`audit.rs`): structured `warn` records for every denial.

pub mod actor;
pub mod admission;
pub mod audit;
pub mod jurisdiction;
pub mod visibility;

pub use actor::Actor;
pub use admission::{can_create_admin, can_rebind_user, Admission, AdmissionRequest, Creator};
pub use audit::{record_denial, AuditExt, Operation, AUDIT_TARGET};
pub use jurisdiction::{
    can_administer, is_in_jurisdiction, resolve, resolve_for_kind, JurisdictionScope, SqlBind,
    SqlPredicate,
};
pub use visibility::{
    build_predicate, can_manage, is_manageable, is_visible, normalize_targeting, resolve_target,
    ContentTarget, TargetColumns, VisibilityPredicate,
};
