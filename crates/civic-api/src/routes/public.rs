//! # Public API
//!
//! Unauthenticated endpoints for self-signup: browse active nodes level by
//! level, then register as a member bound to a district.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use civic_access::{can_create_admin, AdmissionRequest, Creator, Operation};
use civic_core::{AdminLevel, HierarchyKind, NodeId};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::enforce;
use super::hierarchy::{NodeFilter, NodeView};
use super::users::{insert_account, new_user, AccountFields, UserView};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

/// Actor label recorded for unauthenticated requests.
const PUBLIC_ACTOR: &str = "public";

/// Self-signup request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SignupRequest {
    #[serde(flatten)]
    pub account: AccountFields,
    /// The district (or sector district, or expatriate region) to join.
    pub node_id: Uuid,
}

impl Validate for SignupRequest {
    fn validate(&self) -> Result<(), String> {
        self.account.validate()
    }
}

/// `?parent_id=` on the node picker.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PickerParams {
    /// List this node's active children. Omit to list active roots.
    pub parent_id: Option<Uuid>,
}

/// Build the public router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/public/signup", post(signup))
        .route("/v1/public/nodes", get(list_public_nodes))
}

/// POST /v1/public/signup: Register as a member.
#[utoipa::path(
    post,
    path = "/v1/public/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Member registered", body = UserView),
        (status = 404, description = "Node not found or inactive", body = crate::error::ErrorBody),
        (status = 409, description = "Mobile or email taken", body = crate::error::ErrorBody),
        (status = 422, description = "Node is not at the deepest level", body = crate::error::ErrorBody),
    ),
    tag = "public"
)]
async fn signup(
    State(state): State<AppState>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserView>), AppError> {
    let req = extract_validated_json(body)?;
    let node = NodeId::from_uuid(req.node_id);

    let _structure = state.structure_lock.lock().await;
    let decision = {
        let store = state.hierarchy.read();
        can_create_admin(
            &store,
            Creator::PublicSignup,
            AdmissionRequest {
                level: AdminLevel::User,
                node_id: Some(node),
            },
        )
    };
    let admission =
        enforce(&state, PUBLIC_ACTOR, Operation::PublicSignup, Some(node), decision).await?;
    let user = new_user(req.account, admission)?;
    let user = insert_account(&state, PUBLIC_ACTOR, Operation::PublicSignup, user).await?;
    Ok((StatusCode::CREATED, Json(UserView::from(&user))))
}

/// GET /v1/public/nodes: Active nodes for signup pickers.
///
/// With `parent_id`, the parent's active children; otherwise the active
/// roots of `kind` (default `GEOGRAPHIC`).
#[utoipa::path(
    get,
    path = "/v1/public/nodes",
    params(PickerParams, NodeFilter),
    responses(
        (status = 200, description = "Active nodes ordered by name", body = Vec<NodeView>),
        (status = 404, description = "Parent not found or inactive", body = crate::error::ErrorBody),
    ),
    tag = "public"
)]
async fn list_public_nodes(
    State(state): State<AppState>,
    Query(picker): Query<PickerParams>,
    Query(filter): Query<NodeFilter>,
) -> Result<Json<Vec<NodeView>>, AppError> {
    let kind = filter.parsed_kind()?;
    let store = state.hierarchy.read();
    let candidates = match picker.parent_id.map(NodeId::from_uuid) {
        Some(parent) => {
            if store.get_active(parent).is_none() {
                return Err(AppError::NotFound(format!("node {parent} not found")));
            }
            store.children(parent)
        }
        None => store.roots(),
    };
    let wanted = match (picker.parent_id, kind) {
        (None, None) => Some(HierarchyKind::Geographic),
        (_, k) => k,
    };
    let mut nodes: Vec<NodeView> = candidates
        .into_iter()
        .filter(|n| n.is_active())
        .filter(|n| wanted.map_or(true, |k| n.kind() == k))
        .map(NodeView::from)
        .collect();
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(nodes))
}
