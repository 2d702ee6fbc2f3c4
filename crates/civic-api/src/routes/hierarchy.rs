//! # Hierarchy Administration API
//!
//! Create, inspect, rename, move, reassign, and deactivate nodes of the
//! three hierarchies. Every mutation needs the caller to administer the
//! node (or, for creation, the parent) and passes the structural guard.
//! Mutations hold the structure lock from the check to the in-memory
//! commit.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use civic_access::{can_administer, AuditExt, Operation};
use civic_core::{validate_name, HierarchyKind, NodeClass, NodeCode, NodeId, User, UserId};
use civic_hierarchy::{can_deactivate, can_reparent, HierarchyNode, NewNode};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{audit, enforce, persisted};
use crate::auth::Caller;
use crate::db::audit::Outcome;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, PaginationParams, Validate};
use crate::state::AppState;

// -- Views --------------------------------------------------------------------

/// A hierarchy node as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NodeView {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    /// Class code, e.g. `GEOGRAPHIC/DISTRICT` or `SECTOR/POLITICAL/REGION`.
    pub class: String,
    pub kind: String,
    pub tier: Option<String>,
    pub sector_type: Option<String>,
    pub parent_id: Option<Uuid>,
    pub status: String,
    pub admin_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&HierarchyNode> for NodeView {
    fn from(node: &HierarchyNode) -> Self {
        Self {
            id: *node.id.as_uuid(),
            code: node.code.to_string(),
            name: node.name.clone(),
            class: node.class.to_string(),
            kind: node.kind().to_string(),
            tier: node.class.tier().map(|t| t.to_string()),
            sector_type: node.class.sector_type().map(|s| s.to_string()),
            parent_id: node.parent_id.map(|p| *p.as_uuid()),
            status: node.status.to_string(),
            admin_id: node.admin_id.map(|a| *a.as_uuid()),
            created_at: node.created_at,
            updated_at: node.updated_at,
        }
    }
}

// -- Requests -----------------------------------------------------------------

/// Request to create a node.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateNodeRequest {
    /// Code, unique within the class.
    pub code: String,
    pub name: String,
    /// Class code, e.g. `GEOGRAPHIC/LOCALITY`, `EXPATRIATE_REGION`,
    /// `SECTOR/SOCIAL/NATIONAL`.
    pub class: String,
    /// Parent node. Omit for a root.
    pub parent_id: Option<Uuid>,
}

impl Validate for CreateNodeRequest {
    fn validate(&self) -> Result<(), String> {
        if self.code.trim().is_empty() {
            return Err("code must not be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.class.trim().is_empty() {
            return Err("class must not be empty".to_string());
        }
        Ok(())
    }
}

/// Request to change a node. Fields left out are unchanged.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateNodeRequest {
    /// New display name.
    pub name: Option<String>,
    /// Move under this node, in the same hierarchy kind.
    pub parent_id: Option<Uuid>,
    /// Make this user the node's administrator.
    pub admin_id: Option<Uuid>,
    /// Clear the node's administrator.
    #[serde(default)]
    pub remove_admin: bool,
}

impl Validate for UpdateNodeRequest {
    fn validate(&self) -> Result<(), String> {
        if self.name.is_none()
            && self.parent_id.is_none()
            && self.admin_id.is_none()
            && !self.remove_admin
        {
            return Err("nothing to update".to_string());
        }
        if self.admin_id.is_some() && self.remove_admin {
            return Err("admin_id and remove_admin are mutually exclusive".to_string());
        }
        Ok(())
    }
}

/// `?kind=` on node listings.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct NodeFilter {
    /// `GEOGRAPHIC`, `EXPATRIATE`, or `SECTOR`.
    pub kind: Option<String>,
}

impl NodeFilter {
    pub(crate) fn parsed_kind(&self) -> Result<Option<HierarchyKind>, AppError> {
        self.kind
            .as_deref()
            .map(str::parse::<HierarchyKind>)
            .transpose()
            .map_err(AppError::from)
    }
}

// -- Router -------------------------------------------------------------------

/// Build the hierarchy router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/hierarchy/nodes", get(list_nodes).post(create_node))
        .route(
            "/v1/hierarchy/nodes/{id}",
            get(get_node).patch(update_node).delete(deactivate_node),
        )
        .route("/v1/hierarchy/nodes/{id}/children", get(list_children))
}

fn node_view(state: &AppState, id: NodeId) -> Result<NodeView, AppError> {
    state
        .hierarchy
        .read()
        .get(id)
        .map(NodeView::from)
        .ok_or_else(|| AppError::NotFound(format!("node {id} not found")))
}

/// POST /v1/hierarchy/nodes: Create a node.
#[utoipa::path(
    post,
    path = "/v1/hierarchy/nodes",
    request_body = CreateNodeRequest,
    responses(
        (status = 201, description = "Node created", body = NodeView),
        (status = 403, description = "Outside the caller's jurisdiction", body = crate::error::ErrorBody),
        (status = 404, description = "Parent not found or inactive", body = crate::error::ErrorBody),
        (status = 409, description = "Code already taken", body = crate::error::ErrorBody),
        (status = 422, description = "Class does not fit the parent", body = crate::error::ErrorBody),
    ),
    tag = "hierarchy"
)]
async fn create_node(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<CreateNodeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<NodeView>), AppError> {
    let req = extract_validated_json(body)?;
    let class: NodeClass = req.class.parse()?;
    let code = NodeCode::new(req.code)?;
    let name = validate_name(&req.name)?;
    let parent = req.parent_id.map(NodeId::from_uuid);
    let actor = &caller.actor;
    let label = actor.label();

    let _structure = state.structure_lock.lock().await;
    let decision = {
        let store = state.hierarchy.read();
        can_administer(&store, actor, parent, Operation::CreateNode).and_then(|()| {
            store
                .plan_node(NewNode {
                    code,
                    name,
                    class,
                    parent_id: parent,
                })
                .audited(actor, Operation::CreateNode, parent)
        })
    };
    let node = enforce(&state, &label, Operation::CreateNode, parent, decision).await?;

    if let Some(pool) = &state.db_pool {
        let result = crate::db::hierarchy::insert_node(pool, &node).await;
        persisted(&state, &label, Operation::CreateNode, parent, result).await?;
    }
    let committed = state.hierarchy.write().commit_node(node.clone());
    enforce(&state, &label, Operation::CreateNode, parent, committed).await?;

    tracing::info!(
        node = %node.id,
        code = %node.code,
        class = %node.class,
        actor = %label,
        "node created"
    );
    audit(
        &state,
        &label,
        Operation::CreateNode,
        Some(node.id),
        Outcome::Allowed,
        serde_json::json!({ "code": node.code.as_str(), "class": node.class.to_string() }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(NodeView::from(&node))))
}

/// GET /v1/hierarchy/nodes: List nodes, any status.
#[utoipa::path(
    get,
    path = "/v1/hierarchy/nodes",
    params(NodeFilter, PaginationParams),
    responses(
        (status = 200, description = "Nodes ordered by class and code", body = Vec<NodeView>),
    ),
    tag = "hierarchy"
)]
async fn list_nodes(
    State(state): State<AppState>,
    _caller: Caller,
    Query(filter): Query<NodeFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Vec<NodeView>>, AppError> {
    let kind = filter.parsed_kind()?;
    let mut nodes: Vec<NodeView> = {
        let store = state.hierarchy.read();
        store
            .iter()
            .filter(|n| kind.map_or(true, |k| n.kind() == k))
            .map(NodeView::from)
            .collect()
    };
    nodes.sort_by(|a, b| (&a.class, &a.code).cmp(&(&b.class, &b.code)));
    Ok(Json(pagination.page(nodes)))
}

/// GET /v1/hierarchy/nodes/{id}: Get a node.
#[utoipa::path(
    get,
    path = "/v1/hierarchy/nodes/{id}",
    params(("id" = Uuid, Path, description = "Node ID")),
    responses(
        (status = 200, description = "Node found", body = NodeView),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "hierarchy"
)]
async fn get_node(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<NodeView>, AppError> {
    node_view(&state, NodeId::from_uuid(id)).map(Json)
}

/// GET /v1/hierarchy/nodes/{id}/children: Direct children, any status.
#[utoipa::path(
    get,
    path = "/v1/hierarchy/nodes/{id}/children",
    params(("id" = Uuid, Path, description = "Node ID")),
    responses(
        (status = 200, description = "Children ordered by code", body = Vec<NodeView>),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "hierarchy"
)]
async fn list_children(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<NodeView>>, AppError> {
    let id = NodeId::from_uuid(id);
    let store = state.hierarchy.read();
    if store.get(id).is_none() {
        return Err(AppError::NotFound(format!("node {id} not found")));
    }
    let mut children: Vec<NodeView> = store.children(id).into_iter().map(NodeView::from).collect();
    children.sort_by(|a, b| a.code.cmp(&b.code));
    Ok(Json(children))
}

/// PATCH /v1/hierarchy/nodes/{id}: Rename, move, or reassign a node.
///
/// All requested changes are checked before any is applied.
#[utoipa::path(
    patch,
    path = "/v1/hierarchy/nodes/{id}",
    params(("id" = Uuid, Path, description = "Node ID")),
    request_body = UpdateNodeRequest,
    responses(
        (status = 200, description = "Node updated", body = NodeView),
        (status = 403, description = "Outside the caller's jurisdiction", body = crate::error::ErrorBody),
        (status = 404, description = "Node, parent, or admin not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid parent or cycle", body = crate::error::ErrorBody),
    ),
    tag = "hierarchy"
)]
async fn update_node(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateNodeRequest>, JsonRejection>,
) -> Result<Json<NodeView>, AppError> {
    let req = extract_validated_json(body)?;
    let id = NodeId::from_uuid(id);
    let name = req.name.as_deref().map(validate_name).transpose()?;
    let new_parent = req.parent_id.map(NodeId::from_uuid);
    let admin = match req.admin_id.map(UserId::from_uuid) {
        Some(user) if state.users.get(&user).is_none() => {
            return Err(AppError::NotFound(format!("user {user} not found")));
        }
        Some(user) => Some(Some(user)),
        None if req.remove_admin => Some(None),
        None => None,
    };
    let actor = &caller.actor;
    let label = actor.label();
    let operation = if new_parent.is_some() {
        Operation::ReparentNode
    } else {
        Operation::UpdateNode
    };

    let _structure = state.structure_lock.lock().await;
    let decision = {
        let store = state.hierarchy.read();
        can_administer(&store, actor, Some(id), operation).and_then(|()| match new_parent {
            Some(parent) => {
                can_administer(&store, actor, Some(parent), operation).and_then(|()| {
                    can_reparent(&store, id, parent).audited(actor, operation, Some(id))
                })
            }
            None => store
                .get_active(id)
                .map(|_| ())
                .ok_or_else(|| civic_core::Denial::node_not_found(id))
                .audited(actor, operation, Some(id)),
        })
    };
    enforce(&state, &label, operation, Some(id), decision).await?;

    let now = Utc::now();
    if let Some(parent) = new_parent {
        if let Some(pool) = &state.db_pool {
            let result = crate::db::hierarchy::reparent(pool, id, parent, now).await;
            persisted(&state, &label, Operation::ReparentNode, Some(id), result).await?;
        }
        let moved = state.hierarchy.write().reparent(id, parent);
        enforce(&state, &label, Operation::ReparentNode, Some(id), moved).await?;
        let refreshed = refresh_lineages(&state, &label, id).await?;
        if refreshed > 0 {
            tracing::info!(node = %id, users = refreshed, "lineage refreshed after move");
        }
    }
    if let Some(name) = &name {
        if let Some(pool) = &state.db_pool {
            let result = crate::db::hierarchy::rename(pool, id, name, now).await;
            persisted(&state, &label, Operation::UpdateNode, Some(id), result).await?;
        }
        let renamed = state.hierarchy.write().rename(id, name.clone());
        enforce(&state, &label, Operation::UpdateNode, Some(id), renamed).await?;
    }
    if let Some(admin) = admin {
        if let Some(pool) = &state.db_pool {
            let result = crate::db::hierarchy::assign_admin(pool, id, admin, now).await;
            persisted(&state, &label, Operation::UpdateNode, Some(id), result).await?;
        }
        let assigned = state.hierarchy.write().assign_admin(id, admin);
        enforce(&state, &label, Operation::UpdateNode, Some(id), assigned).await?;
    }

    tracing::info!(node = %id, actor = %label, operation = %operation, "node updated");
    audit(
        &state,
        &label,
        operation,
        Some(id),
        Outcome::Allowed,
        serde_json::json!({
            "name": name,
            "parent_id": new_parent.map(|p| p.to_string()),
            "admin_id": admin.map(|a| a.map(|u| u.to_string())),
        }),
    )
    .await;
    node_view(&state, id).map(Json)
}

/// Recompute the stored lineage of every user whose active binding lies in
/// the subtree rooted at `moved`. Runs under the structure lock.
async fn refresh_lineages(state: &AppState, actor: &str, moved: NodeId) -> Result<usize, AppError> {
    let now = Utc::now();
    let stale: Vec<User> = {
        let store = state.hierarchy.read();
        let subtree = store.closure(moved);
        state
            .users
            .filter(|u| u.active_binding().is_some_and(|b| subtree.contains(&b.node_id())))
            .into_iter()
            .filter_map(|mut user| {
                let node = user.active_binding()?.node_id();
                user.lineage = store.lineage(node);
                user.updated_at = now;
                Some(user)
            })
            .collect()
    };

    for user in &stale {
        if let Some(pool) = &state.db_pool {
            let result = crate::db::users::update(pool, user).await;
            persisted(state, actor, Operation::ReparentNode, Some(moved), result).await?;
        }
        state.users.update(&user.id, |u| {
            u.lineage = user.lineage.clone();
            u.updated_at = now;
        });
    }
    Ok(stale.len())
}

/// DELETE /v1/hierarchy/nodes/{id}: Soft-deactivate a node.
///
/// Refused while the node has active children or bound users.
#[utoipa::path(
    delete,
    path = "/v1/hierarchy/nodes/{id}",
    params(("id" = Uuid, Path, description = "Node ID")),
    responses(
        (status = 200, description = "Node deactivated", body = NodeView),
        (status = 403, description = "Outside the caller's jurisdiction", body = crate::error::ErrorBody),
        (status = 404, description = "Not found or already inactive", body = crate::error::ErrorBody),
        (status = 409, description = "Active children or bound users remain", body = crate::error::ErrorBody),
    ),
    tag = "hierarchy"
)]
async fn deactivate_node(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<NodeView>, AppError> {
    let id = NodeId::from_uuid(id);
    let actor = &caller.actor;
    let label = actor.label();
    let operation = Operation::DeactivateNode;

    let _structure = state.structure_lock.lock().await;
    let decision = {
        let store = state.hierarchy.read();
        can_administer(&store, actor, Some(id), operation).and_then(|()| {
            can_deactivate(&store, &state.users, id).audited(actor, operation, Some(id))
        })
    };
    enforce(&state, &label, operation, Some(id), decision).await?;

    if let Some(pool) = &state.db_pool {
        let result = crate::db::hierarchy::deactivate(pool, id, Utc::now()).await;
        persisted(&state, &label, operation, Some(id), result).await?;
    }
    let deactivated = state.hierarchy.write().deactivate(id, &state.users);
    enforce(&state, &label, operation, Some(id), deactivated).await?;

    tracing::info!(node = %id, actor = %label, "node deactivated");
    audit(&state, &label, operation, Some(id), Outcome::Allowed, serde_json::json!({})).await;
    node_view(&state, id).map(Json)
}
