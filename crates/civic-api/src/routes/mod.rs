//! # Route Modules
//!
//! Each module defines an Axum Router for one API surface area.
//! Routers are assembled in [`crate::app`].
//!
//! - `public`: unauthenticated signup and node pickers.
//! - `hierarchy`: node administration.
//! - `users`: the caller's own record, administrator creation, user
//!   listing and rebinding.
//! - `content`: targeted content publishing and reading.
//! - `audit`: audit chain verification.
//!
//! Handlers decide with `civic-access` against a snapshot of the hierarchy
//! taken under the read lock, release the lock, then record the outcome.
//! Denials go through [`enforce`] so they are both returned with their
//! reason code and appended to the audit chain.

pub mod audit;
pub mod content;
pub mod hierarchy;
pub mod public;
pub mod users;

use civic_access::Operation;
use civic_core::{Decision, NodeId};

use crate::db::audit::{AuditEvent, Outcome};
use crate::db::WriteError;
use crate::error::AppError;
use crate::state::AppState;

/// Append an audit event when a database is attached. Failures are logged
/// and never fail the request.
pub(crate) async fn audit(
    state: &AppState,
    actor: &str,
    operation: Operation,
    node: Option<NodeId>,
    outcome: Outcome,
    metadata: serde_json::Value,
) {
    let Some(pool) = &state.db_pool else {
        return;
    };
    let event = AuditEvent {
        operation,
        actor: actor.to_string(),
        outcome,
        node_id: node,
        metadata,
    };
    if let Err(e) = crate::db::audit::append(pool, event).await {
        tracing::error!(operation = %operation, error = %e, "failed to append audit event");
    }
}

/// Unwrap a decision, auditing and converting a denial.
pub(crate) async fn enforce<T>(
    state: &AppState,
    actor: &str,
    operation: Operation,
    node: Option<NodeId>,
    decision: Decision<T>,
) -> Result<T, AppError> {
    match decision {
        Ok(value) => Ok(value),
        Err(denial) => {
            audit(
                state,
                actor,
                operation,
                node,
                Outcome::Denied(denial.reason),
                serde_json::json!({ "detail": denial.detail }),
            )
            .await;
            Err(AppError::Denied(denial))
        }
    }
}

/// Convert a write-through result. A precondition that failed under the
/// database's locks is audited like any other denial.
pub(crate) async fn persisted(
    state: &AppState,
    actor: &str,
    operation: Operation,
    node: Option<NodeId>,
    result: Result<(), WriteError>,
) -> Result<(), AppError> {
    match result {
        Ok(()) => Ok(()),
        Err(WriteError::Denied(denial)) => {
            tracing::warn!(
                target: civic_access::AUDIT_TARGET,
                actor = %actor,
                operation = %operation,
                reason = %denial.reason,
                detail = %denial.detail,
                "write refused under lock"
            );
            enforce(state, actor, operation, node, Err(denial)).await
        }
        Err(other) => {
            if let WriteError::Database(e) = &other {
                tracing::error!(operation = %operation, error = %e, "write-through failed");
            }
            Err(other.into())
        }
    }
}
