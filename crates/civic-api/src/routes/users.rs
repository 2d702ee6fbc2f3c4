//! # Users and Administrators API
//!
//! The caller's own record and jurisdiction, administrator creation,
//! jurisdiction-scoped user listing, and binding reassignment.
//!
//! A user is visible to an administrator when any of the user's bindings
//! lies inside the administrator's jurisdiction. Users outside it are
//! reported as not found.

use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use civic_access::{
    can_create_admin, can_rebind_user, resolve, Actor, Admission, AdmissionRequest, AuditExt,
    Creator, JurisdictionScope, Operation,
};
use civic_core::{
    validate_name, AdminLevel, Bindings, Denial, Email, HierarchyKind, MobileNumber, NodeId, User,
    UserId, UserStatus,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{audit, enforce, persisted};
use crate::auth::Caller;
use crate::db::audit::Outcome;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, PaginationParams, Validate};
use crate::state::AppState;

// -- Views --------------------------------------------------------------------

/// One hierarchy binding.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BindingView {
    pub kind: String,
    pub node_id: Uuid,
    pub class: String,
}

/// A user as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    pub id: Uuid,
    pub full_name: String,
    pub mobile: String,
    pub email: String,
    pub role: String,
    pub admin_level: String,
    pub active_hierarchy: String,
    pub bindings: Vec<BindingView>,
    /// Ancestor ids of the active binding's node, keyed by slot.
    pub lineage: BTreeMap<String, Uuid>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: *user.id.as_uuid(),
            full_name: user.full_name.clone(),
            mobile: user.mobile.to_string(),
            email: user.email.to_string(),
            role: user.role.to_string(),
            admin_level: user.admin_level.to_string(),
            active_hierarchy: user.active_hierarchy.to_string(),
            bindings: user
                .bindings
                .iter()
                .map(|b| BindingView {
                    kind: b.kind().to_string(),
                    node_id: *b.node_id().as_uuid(),
                    class: b.class().to_string(),
                })
                .collect(),
            lineage: user
                .lineage
                .iter()
                .map(|(slot, node)| (slot.to_string(), *node.as_uuid()))
                .collect(),
            status: user.status.as_str().to_string(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// The caller's resolved jurisdiction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JurisdictionView {
    /// `UNRESTRICTED`, `WHOLE_KIND`, `SUBTREE`, or `EMPTY`.
    pub scope: String,
    pub kind: Option<String>,
    /// The bound node, for a subtree.
    pub root: Option<Uuid>,
    /// Every node in a subtree, in id order.
    pub nodes: Vec<Uuid>,
}

impl From<&JurisdictionScope> for JurisdictionView {
    fn from(scope: &JurisdictionScope) -> Self {
        let (name, root, nodes) = match scope {
            JurisdictionScope::Unrestricted => ("UNRESTRICTED", None, Vec::new()),
            JurisdictionScope::WholeKind(_) => ("WHOLE_KIND", None, Vec::new()),
            JurisdictionScope::Subtree { root, nodes, .. } => (
                "SUBTREE",
                Some(*root.as_uuid()),
                nodes.iter().map(|n| *n.as_uuid()).collect(),
            ),
            JurisdictionScope::Empty => ("EMPTY", None, Vec::new()),
        };
        Self {
            scope: name.to_string(),
            kind: scope.kind().map(|k| k.to_string()),
            root,
            nodes,
        }
    }
}

// -- Requests -----------------------------------------------------------------

/// Identity fields shared by signup and administrator creation.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AccountFields {
    pub full_name: String,
    /// E.164 mobile number, e.g. `+249912345678`.
    pub mobile: String,
    pub email: String,
}

impl Validate for AccountFields {
    fn validate(&self) -> Result<(), String> {
        validate_name(&self.full_name).map_err(|e| e.to_string())?;
        MobileNumber::new(self.mobile.clone()).map_err(|e| e.to_string())?;
        Email::new(self.email.clone()).map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Request to create an administrator (or a member) bound to a node.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAdminRequest {
    #[serde(flatten)]
    pub account: AccountFields,
    /// Level code, e.g. `REGION`, `EXPATRIATE_GENERAL`, `USER`.
    pub admin_level: String,
    /// Node to bind. Omit for unscoped levels.
    pub node_id: Option<Uuid>,
}

impl Validate for CreateAdminRequest {
    fn validate(&self) -> Result<(), String> {
        self.account.validate()
    }
}

/// Request to move a user's binding.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RebindRequest {
    pub node_id: Uuid,
}

/// Request to switch which binding governs the caller.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ActiveHierarchyRequest {
    /// `GEOGRAPHIC`, `EXPATRIATE`, or `SECTOR`.
    pub kind: String,
}

impl Validate for ActiveHierarchyRequest {
    fn validate(&self) -> Result<(), String> {
        self.kind
            .parse::<HierarchyKind>()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

// -- Shared -------------------------------------------------------------------

/// Build the record for an admitted account.
pub(crate) fn new_user(account: AccountFields, admission: Admission) -> Result<User, AppError> {
    let now = Utc::now();
    Ok(User {
        id: UserId::new(),
        full_name: validate_name(&account.full_name)?,
        mobile: MobileNumber::new(account.mobile)?,
        email: Email::new(account.email)?,
        role: admission.role,
        admin_level: admission.admin_level,
        active_hierarchy: admission.active_hierarchy,
        bindings: admission.binding.map(Bindings::single).unwrap_or_default(),
        lineage: admission.lineage,
        status: UserStatus::Active,
        created_at: now,
        updated_at: now,
    })
}

/// Persist and store a new account. Caller holds the structure lock.
pub(crate) async fn insert_account(
    state: &AppState,
    label: &str,
    operation: Operation,
    user: User,
) -> Result<User, AppError> {
    if state
        .users
        .any(|u| u.mobile == user.mobile || u.email == user.email)
    {
        return Err(AppError::Conflict(
            "mobile number or email is already registered".into(),
        ));
    }
    let node = user.active_binding().map(|b| b.node_id());
    if let Some(pool) = &state.db_pool {
        let result = crate::db::users::insert(pool, &user).await;
        persisted(state, label, operation, node, result).await?;
    }
    state.users.insert(user.id, user.clone());
    tracing::info!(user = %user.id, level = %user.admin_level, actor = %label, "account created");
    audit(
        state,
        label,
        operation,
        node,
        Outcome::Allowed,
        serde_json::json!({
            "user_id": user.id.to_string(),
            "admin_level": user.admin_level.as_str(),
        }),
    )
    .await;
    Ok(user)
}

/// Whether `actor` may see `user`.
fn can_see(state: &AppState, actor: &Actor, user: &User) -> bool {
    if actor.id == Some(user.id) {
        return true;
    }
    if actor.admin_level == AdminLevel::User {
        return false;
    }
    let store = state.hierarchy.read();
    let scope = resolve(&store, actor);
    scope == JurisdictionScope::Unrestricted
        || user
            .bindings
            .iter()
            .any(|b| scope.contains(b.node_id(), b.kind()))
}

fn require_user(caller: &Caller) -> Result<&User, AppError> {
    caller
        .user
        .as_ref()
        .ok_or_else(|| AppError::NotFound("the service identity has no user record".into()))
}

// -- Router -------------------------------------------------------------------

/// Build the users router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/me", get(get_me))
        .route("/v1/me/jurisdiction", get(get_my_jurisdiction))
        .route("/v1/me/active-hierarchy", put(set_active_hierarchy))
        .route("/v1/admins", post(create_admin))
        .route("/v1/users", get(list_users))
        .route("/v1/users/{id}", get(get_user))
        .route("/v1/users/{id}/binding", put(rebind_user))
}

/// GET /v1/me: The caller's user record.
#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Caller's record", body = UserView),
        (status = 404, description = "Service identity", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn get_me(caller: Caller) -> Result<Json<UserView>, AppError> {
    require_user(&caller).map(|u| Json(UserView::from(u)))
}

/// GET /v1/me/jurisdiction: The nodes the caller administers.
#[utoipa::path(
    get,
    path = "/v1/me/jurisdiction",
    responses(
        (status = 200, description = "Resolved jurisdiction", body = JurisdictionView),
    ),
    tag = "users"
)]
async fn get_my_jurisdiction(
    State(state): State<AppState>,
    caller: Caller,
) -> Json<JurisdictionView> {
    let store = state.hierarchy.read();
    Json(JurisdictionView::from(&resolve(&store, &caller.actor)))
}

/// PUT /v1/me/active-hierarchy: Switch the governing binding.
#[utoipa::path(
    put,
    path = "/v1/me/active-hierarchy",
    request_body = ActiveHierarchyRequest,
    responses(
        (status = 200, description = "Active hierarchy switched", body = UserView),
        (status = 404, description = "Bound node not found or inactive", body = crate::error::ErrorBody),
        (status = 422, description = "No binding in that hierarchy", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn set_active_hierarchy(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<ActiveHierarchyRequest>, JsonRejection>,
) -> Result<Json<UserView>, AppError> {
    let req = extract_validated_json(body)?;
    let kind: HierarchyKind = req.kind.parse()?;
    let user_id = require_user(&caller)?.id;
    let label = caller.actor.label();
    let operation = Operation::SwitchHierarchy;

    // Re-read under the lock: a rebind may have landed since authentication.
    let _structure = state.structure_lock.lock().await;
    let mut user = state
        .users
        .get(&user_id)
        .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))?;
    let Some(binding) = user.bindings.get(kind).copied() else {
        return Err(AppError::Validation(format!("user has no {kind} binding")));
    };
    let node = binding.node_id();
    let lineage = {
        let store = state.hierarchy.read();
        store
            .get_active(node)
            .map(|_| store.lineage(node))
            .ok_or_else(|| Denial::node_not_found(node))
            .audited(&caller.actor, operation, Some(node))
    };
    let lineage = enforce(&state, &label, operation, Some(node), lineage).await?;

    user.active_hierarchy = kind;
    user.lineage = lineage;
    user.updated_at = Utc::now();
    if let Some(pool) = &state.db_pool {
        let result = crate::db::users::update(pool, &user).await;
        persisted(&state, &label, operation, Some(node), result).await?;
    }
    state.users.insert(user.id, user.clone());
    tracing::info!(user = %user.id, kind = %kind, "active hierarchy switched");
    Ok(Json(UserView::from(&user)))
}

/// POST /v1/admins: Create an administrator or member.
#[utoipa::path(
    post,
    path = "/v1/admins",
    request_body = CreateAdminRequest,
    responses(
        (status = 201, description = "Account created", body = UserView),
        (status = 403, description = "Level too broad or node outside jurisdiction", body = crate::error::ErrorBody),
        (status = 404, description = "Node not found or inactive", body = crate::error::ErrorBody),
        (status = 409, description = "Mobile or email taken", body = crate::error::ErrorBody),
        (status = 422, description = "Node does not fit the level", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn create_admin(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<CreateAdminRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserView>), AppError> {
    let req = extract_validated_json(body)?;
    let level: AdminLevel = req.admin_level.parse()?;
    let node = req.node_id.map(NodeId::from_uuid);
    let actor = &caller.actor;
    let label = actor.label();

    let _structure = state.structure_lock.lock().await;
    let decision = {
        let store = state.hierarchy.read();
        can_create_admin(
            &store,
            Creator::Actor(actor),
            AdmissionRequest {
                level,
                node_id: node,
            },
        )
    };
    let admission = enforce(&state, &label, Operation::CreateAdmin, node, decision).await?;
    let user = new_user(req.account, admission)?;
    let user = insert_account(&state, &label, Operation::CreateAdmin, user).await?;
    Ok((StatusCode::CREATED, Json(UserView::from(&user))))
}

/// GET /v1/users: Users bound inside the caller's jurisdiction.
#[utoipa::path(
    get,
    path = "/v1/users",
    params(PaginationParams),
    responses(
        (status = 200, description = "Users ordered by creation time", body = Vec<UserView>),
        (status = 403, description = "Caller is a member", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn list_users(
    State(state): State<AppState>,
    caller: Caller,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Vec<UserView>>, AppError> {
    let actor = &caller.actor;
    if actor.admin_level == AdminLevel::User {
        return Err(AppError::Denied(civic_core::Denial::new(
            civic_core::DenialReason::InsufficientLevel,
            "members cannot list users",
        )));
    }
    let scope = resolve(&state.hierarchy.read(), actor);

    let mut users = match (&scope, &state.db_pool) {
        (JurisdictionScope::Unrestricted, _) => state.users.list(),
        (_, Some(pool)) => {
            let predicate = scope.to_sql("b.node_id", "b.kind", 1);
            let ids = crate::db::users::ids_in_scope(pool, predicate).await?;
            ids.iter().filter_map(|id| state.users.get(id)).collect()
        }
        (_, None) => state.users.filter(|u| {
            u.bindings
                .iter()
                .any(|b| scope.contains(b.node_id(), b.kind()))
        }),
    };
    users.sort_by_key(|u| (u.created_at, *u.id.as_uuid()));
    Ok(Json(
        pagination
            .page(users)
            .iter()
            .map(UserView::from)
            .collect(),
    ))
}

/// GET /v1/users/{id}: A user the caller may see.
#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User found", body = UserView),
        (status = 404, description = "Not found or outside jurisdiction", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn get_user(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<UserView>, AppError> {
    let id = UserId::from_uuid(id);
    state
        .users
        .get(&id)
        .filter(|u| can_see(&state, &caller.actor, u))
        .map(|u| Json(UserView::from(&u)))
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
}

/// PUT /v1/users/{id}/binding: Reassign a user's binding.
///
/// Used to move members off a node before it is deactivated.
#[utoipa::path(
    put,
    path = "/v1/users/{id}/binding",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = RebindRequest,
    responses(
        (status = 200, description = "Binding moved", body = UserView),
        (status = 403, description = "User or node outside jurisdiction", body = crate::error::ErrorBody),
        (status = 404, description = "User or node not found", body = crate::error::ErrorBody),
        (status = 422, description = "Node does not fit the user's level", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn rebind_user(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Result<Json<RebindRequest>, JsonRejection>,
) -> Result<Json<UserView>, AppError> {
    let req = extract_json(body)?;
    let id = UserId::from_uuid(id);
    let node = NodeId::from_uuid(req.node_id);
    let actor = &caller.actor;
    let label = actor.label();

    let _structure = state.structure_lock.lock().await;
    let mut user = state
        .users
        .get(&id)
        .filter(|u| can_see(&state, actor, u))
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
    let decision = {
        let store = state.hierarchy.read();
        can_rebind_user(&store, actor, &user, node)
    };
    let admission = enforce(&state, &label, Operation::RebindUser, Some(node), decision).await?;

    let Some(binding) = admission.binding else {
        return Err(AppError::Internal("rebind admitted without a binding".into()));
    };
    user.bindings.set(binding);
    user.active_hierarchy = admission.active_hierarchy;
    user.lineage = admission.lineage;
    user.updated_at = Utc::now();

    if let Some(pool) = &state.db_pool {
        let result = crate::db::users::update(pool, &user).await;
        persisted(&state, &label, Operation::RebindUser, Some(node), result).await?;
    }
    state.users.insert(user.id, user.clone());
    tracing::info!(user = %user.id, node = %node, actor = %label, "user rebound");
    audit(
        &state,
        &label,
        Operation::RebindUser,
        Some(node),
        Outcome::Allowed,
        serde_json::json!({ "user_id": user.id.to_string() }),
    )
    .await;
    Ok(Json(UserView::from(&user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::{DenialReason, HierarchyBinding, NodeSlot, Role, Tier};
    use std::collections::BTreeSet;

    const SEED: &str = include_str!("../../../civic-hierarchy/fixtures/sudan.yaml");

    fn seeded() -> AppState {
        AppState::new().with_hierarchy(civic_hierarchy::load_seed(SEED).unwrap())
    }

    fn node(state: &AppState, code: &str) -> NodeId {
        state
            .hierarchy
            .read()
            .iter()
            .find(|n| n.code.as_str() == code)
            .map(|n| n.id)
            .unwrap()
    }

    fn member_at(district: NodeId) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(),
            full_name: "Member".into(),
            mobile: MobileNumber::new("+249912345600").unwrap(),
            email: Email::new("switch@example.org").unwrap(),
            role: Role::User,
            admin_level: AdminLevel::User,
            active_hierarchy: HierarchyKind::Geographic,
            bindings: Bindings::single(HierarchyBinding::Geographic {
                node_id: district,
                tier: Tier::District,
            }),
            lineage: Default::default(),
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    fn switch_to_geographic() -> Result<Json<ActiveHierarchyRequest>, JsonRejection> {
        Ok(Json(ActiveHierarchyRequest {
            kind: "GEOGRAPHIC".into(),
        }))
    }

    #[tokio::test]
    async fn switch_keeps_a_rebind_made_after_authentication() {
        let state = seeded();
        let old = node(&state, "KRT-KRT-E-JS");
        let new = node(&state, "KRT-KRT-E-BR");
        let snapshot = member_at(old);
        let mut current = snapshot.clone();
        current.bindings = Bindings::single(HierarchyBinding::Geographic {
            node_id: new,
            tier: Tier::District,
        });
        state.users.insert(current.id, current);

        let caller = Caller {
            actor: Actor::from_user(&snapshot),
            user: Some(snapshot.clone()),
        };
        let Json(view) = set_active_hierarchy(State(state.clone()), caller, switch_to_geographic())
            .await
            .unwrap();

        let stored = state.users.get(&snapshot.id).unwrap();
        let bound = stored.bindings.get(HierarchyKind::Geographic).unwrap();
        assert_eq!(bound.node_id(), new);
        assert_eq!(stored.lineage.get(NodeSlot::District), Some(new));
        assert_eq!(view.lineage.get("DISTRICT"), Some(new.as_uuid()));
    }

    #[tokio::test]
    async fn switch_to_inactive_node_is_refused() {
        let state = seeded();
        let district = node(&state, "KRT-KRT-E-JS");
        state
            .hierarchy
            .write()
            .deactivate(district, &|_: NodeId| 0usize)
            .unwrap();
        let user = member_at(district);
        state.users.insert(user.id, user.clone());

        let caller = Caller {
            actor: Actor::from_user(&user),
            user: Some(user.clone()),
        };
        let err = set_active_hierarchy(State(state.clone()), caller, switch_to_geographic())
            .await
            .unwrap_err();
        match err {
            AppError::Denied(denial) => assert_eq!(denial.reason, DenialReason::NodeNotFound),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(state.users.get(&user.id).unwrap().lineage.is_empty());
    }

    #[test]
    fn account_fields_validate_contact_details() {
        let ok = AccountFields {
            full_name: "Amna Osman".into(),
            mobile: "+249912345678".into(),
            email: "amna@example.org".into(),
        };
        assert!(ok.validate().is_ok());
        let bad_email = AccountFields {
            email: "not-an-email".into(),
            ..ok
        };
        assert!(bad_email.validate().is_err());
    }

    #[test]
    fn jurisdiction_view_names_the_scope() {
        let root = NodeId::new();
        let subtree = JurisdictionScope::Subtree {
            kind: HierarchyKind::Geographic,
            root,
            nodes: BTreeSet::from([root]),
        };
        let view = JurisdictionView::from(&subtree);
        assert_eq!(view.scope, "SUBTREE");
        assert_eq!(view.kind.as_deref(), Some("GEOGRAPHIC"));
        assert_eq!(view.root, Some(*root.as_uuid()));
        assert_eq!(view.nodes.len(), 1);

        let view = JurisdictionView::from(&JurisdictionScope::Unrestricted);
        assert_eq!(view.scope, "UNRESTRICTED");
        assert!(view.kind.is_none());
    }
}
