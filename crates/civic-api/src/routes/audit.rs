//! # Audit API
//!
//! Verifies the tamper-evident audit chain. Restricted to the unscoped
//! levels (`ADMIN`, `GENERAL_SECRETARIAT`).

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use civic_core::{Denial, DenialReason};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::Caller;
use crate::db::audit::ChainIntegrity;
use crate::error::AppError;
use crate::state::AppState;

/// Chain verification report.
#[derive(Debug, Serialize, ToSchema)]
pub struct IntegrityReport {
    pub valid: bool,
    #[serde(flatten)]
    pub chain: ChainIntegrity,
}

/// Build the audit router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/audit/integrity", get(verify_integrity))
}

/// GET /v1/audit/integrity: Recompute and check every link of the chain.
#[utoipa::path(
    get,
    path = "/v1/audit/integrity",
    responses(
        (status = 200, description = "Verification report", body = IntegrityReport),
        (status = 403, description = "Caller is not an unscoped administrator", body = crate::error::ErrorBody),
        (status = 404, description = "No database attached", body = crate::error::ErrorBody),
    ),
    tag = "audit"
)]
async fn verify_integrity(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<IntegrityReport>, AppError> {
    if !caller.actor.admin_level.is_unscoped() {
        return Err(Denial::new(
            DenialReason::InsufficientLevel,
            "only unscoped administrators may verify the audit chain",
        )
        .into());
    }
    let Some(pool) = &state.db_pool else {
        return Err(AppError::NotFound("audit chain requires a database".into()));
    };
    let chain = crate::db::audit::verify_chain(pool).await?;
    if !chain.is_valid() {
        tracing::error!(
            broken_links = chain.broken_links,
            tampered = chain.tampered,
            "audit chain verification failed"
        );
    }
    Ok(Json(IntegrityReport {
        valid: chain.is_valid(),
        chain,
    }))
}
