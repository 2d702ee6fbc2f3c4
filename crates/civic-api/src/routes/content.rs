//! # Content API
//!
//! Publish targeted content and read it back through the visibility
//! filter. Administrators publish into their jurisdiction; omitted
//! targeting defaults to the publisher's own node. Members read what is
//! aimed at their node, its ancestors, or everyone. Management listings
//! are jurisdiction based and keep content whose target has since been
//! deactivated.

use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use civic_access::{
    build_predicate, can_manage, is_manageable, is_visible, resolve_target, Actor, Operation,
    TargetColumns,
};
use civic_core::{AdminLevel, ContentId, Denial, DenialReason, NodeId, NodeSlot};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{audit, enforce, persisted};
use crate::auth::Caller;
use crate::db::audit::Outcome;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, PaginationParams, Validate};
use crate::state::{AppState, ContentKind, ContentRecord};

// -- Views --------------------------------------------------------------------

/// A content item as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContentView {
    pub id: Uuid,
    pub kind: ContentKind,
    pub title: String,
    #[schema(value_type = Object)]
    pub body: serde_json::Value,
    /// Targeted nodes keyed by slot, e.g. `{"DISTRICT": "…"}`. Empty for
    /// content aimed at everyone.
    pub targets: BTreeMap<String, Uuid>,
    pub author_id: Option<Uuid>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ContentRecord> for ContentView {
    fn from(record: &ContentRecord) -> Self {
        Self {
            id: *record.id.as_uuid(),
            kind: record.kind,
            title: record.title.clone(),
            body: record.body.clone(),
            targets: record
                .targets
                .entries()
                .into_iter()
                .map(|(slot, node)| (slot.to_string(), *node.as_uuid()))
                .collect(),
            author_id: record.author_id.map(|a| *a.as_uuid()),
            archived: record.archived,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

// -- Requests -----------------------------------------------------------------

/// Request to publish content.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateContentRequest {
    pub kind: ContentKind,
    pub title: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub body: serde_json::Value,
    /// Targeted nodes keyed by slot (`NATIONAL`, `REGION`, `LOCALITY`,
    /// `ADMIN_UNIT`, `DISTRICT`, `EXPATRIATE_REGION`, `SECTOR_NATIONAL` …
    /// `SECTOR_DISTRICT`).
    /// Omit to target the publisher's own node.
    pub targets: Option<BTreeMap<String, Uuid>>,
}

const MAX_TITLE_CHARS: usize = 500;

fn validate_title(title: &str) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("title must not be empty".to_string());
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(format!("title must not exceed {MAX_TITLE_CHARS} characters"));
    }
    Ok(())
}

impl Validate for CreateContentRequest {
    fn validate(&self) -> Result<(), String> {
        validate_title(&self.title)?;
        if let Some(targets) = &self.targets {
            parse_targets(targets)?;
        }
        Ok(())
    }
}

/// Request to edit content. Targets are fixed at creation.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateContentRequest {
    pub title: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub body: Option<serde_json::Value>,
}

impl Validate for UpdateContentRequest {
    fn validate(&self) -> Result<(), String> {
        if self.title.is_none() && self.body.is_none() {
            return Err("nothing to update".to_string());
        }
        match &self.title {
            Some(title) => validate_title(title),
            None => Ok(()),
        }
    }
}

/// Map slot-keyed targets onto the targeting columns.
fn parse_targets(targets: &BTreeMap<String, Uuid>) -> Result<TargetColumns, String> {
    let mut columns = TargetColumns::default();
    for (key, node) in targets {
        let slot = NodeSlot::all()
            .iter()
            .copied()
            .find(|s| s.as_str() == key)
            .ok_or_else(|| format!("unknown target slot '{key}'"))?;
        columns.set(slot, Some(NodeId::from_uuid(*node)));
    }
    Ok(columns)
}

fn newest_first(items: &mut [ContentRecord]) {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.as_uuid().cmp(b.id.as_uuid())));
}

fn require_admin(actor: &Actor, what: &str) -> Result<(), Denial> {
    if actor.admin_level == AdminLevel::User {
        return Err(Denial::new(
            DenialReason::InsufficientLevel,
            format!("members cannot {what}"),
        ));
    }
    Ok(())
}

// -- Router -------------------------------------------------------------------

/// Build the content router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/content", get(list_visible).post(create_content))
        .route("/v1/content/managed", get(list_managed))
        .route(
            "/v1/content/{id}",
            get(get_content).patch(update_content).delete(archive_content),
        )
}

/// POST /v1/content: Publish content.
#[utoipa::path(
    post,
    path = "/v1/content",
    request_body = CreateContentRequest,
    responses(
        (status = 201, description = "Content published", body = ContentView),
        (status = 403, description = "Target outside the publisher's jurisdiction", body = crate::error::ErrorBody),
        (status = 404, description = "Target not found or inactive", body = crate::error::ErrorBody),
        (status = 422, description = "Ambiguous or mismatched targeting", body = crate::error::ErrorBody),
    ),
    tag = "content"
)]
async fn create_content(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<CreateContentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ContentView>), AppError> {
    let req = extract_validated_json(body)?;
    let requested = req
        .targets
        .as_ref()
        .map(parse_targets)
        .transpose()
        .map_err(AppError::Validation)?;
    let actor = &caller.actor;
    let label = actor.label();

    let _structure = state.structure_lock.lock().await;
    let decision = {
        let store = state.hierarchy.read();
        resolve_target(&store, actor, requested.as_ref())
    };
    let hint = requested
        .as_ref()
        .and_then(|t| t.entries().first().map(|(_, n)| *n))
        .or(actor.node_id());
    let target = enforce(&state, &label, Operation::TargetContent, hint, decision).await?;

    let now = Utc::now();
    let record = ContentRecord {
        id: ContentId::new(),
        kind: req.kind,
        title: req.title.trim().to_string(),
        body: req.body,
        targets: target.to_columns(),
        author_id: actor.id,
        archived: false,
        created_at: now,
        updated_at: now,
    };
    if let Some(pool) = &state.db_pool {
        let result = crate::db::content::insert(pool, &record).await;
        persisted(&state, &label, Operation::TargetContent, target.node_id(), result).await?;
    }
    state.content.insert(record.id, record.clone());
    tracing::info!(
        content = %record.id,
        kind = %record.kind,
        target = %target.node_id().map(|n| n.to_string()).unwrap_or_else(|| "global".into()),
        actor = %label,
        "content published"
    );
    Ok((StatusCode::CREATED, Json(ContentView::from(&record))))
}

/// GET /v1/content: Live content visible to the caller, newest first.
#[utoipa::path(
    get,
    path = "/v1/content",
    params(PaginationParams),
    responses(
        (status = 200, description = "Visible content", body = Vec<ContentView>),
    ),
    tag = "content"
)]
async fn list_visible(
    State(state): State<AppState>,
    caller: Caller,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Vec<ContentView>>, AppError> {
    let predicate = build_predicate(&state.hierarchy.read(), &caller.actor);
    let mut items: Vec<ContentRecord> = match &state.db_pool {
        Some(pool) => crate::db::content::visible_ids(pool, predicate.to_sql(1))
            .await?
            .iter()
            .filter_map(|id| state.content.get(id))
            .collect(),
        None => state
            .content
            .filter(|c| !c.archived && predicate.matches(&c.targets)),
    };
    newest_first(&mut items);
    Ok(Json(
        pagination
            .page(items)
            .iter()
            .map(ContentView::from)
            .collect(),
    ))
}

/// GET /v1/content/managed: Content the caller may manage, archived
/// included, newest first.
#[utoipa::path(
    get,
    path = "/v1/content/managed",
    params(PaginationParams),
    responses(
        (status = 200, description = "Manageable content", body = Vec<ContentView>),
        (status = 403, description = "Caller is a member", body = crate::error::ErrorBody),
    ),
    tag = "content"
)]
async fn list_managed(
    State(state): State<AppState>,
    caller: Caller,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Vec<ContentView>>, AppError> {
    let actor = &caller.actor;
    require_admin(actor, "manage content")?;
    let mut items = {
        let store = state.hierarchy.read();
        state
            .content
            .filter(|c| is_manageable(&store, actor, &c.targets))
    };
    newest_first(&mut items);
    Ok(Json(
        pagination
            .page(items)
            .iter()
            .map(ContentView::from)
            .collect(),
    ))
}

/// GET /v1/content/{id}: One item the caller may read or manage.
#[utoipa::path(
    get,
    path = "/v1/content/{id}",
    params(("id" = Uuid, Path, description = "Content ID")),
    responses(
        (status = 200, description = "Content found", body = ContentView),
        (status = 404, description = "Not found or not visible", body = crate::error::ErrorBody),
    ),
    tag = "content"
)]
async fn get_content(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ContentView>, AppError> {
    let id = ContentId::from_uuid(id);
    let actor = &caller.actor;
    let record = state.content.get(&id).filter(|c| {
        let store = state.hierarchy.read();
        (!c.archived && is_visible(&store, actor, &c.targets))
            || (actor.admin_level != AdminLevel::User && is_manageable(&store, actor, &c.targets))
    });
    record
        .map(|c| Json(ContentView::from(&c)))
        .ok_or_else(|| AppError::NotFound(format!("content {id} not found")))
}

/// Load an item and check the caller may manage it.
async fn managed_record(
    state: &AppState,
    actor: &Actor,
    id: ContentId,
) -> Result<ContentRecord, AppError> {
    let record = state
        .content
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("content {id} not found")))?;
    let decision = {
        let store = state.hierarchy.read();
        can_manage(&store, actor, &record.targets)
    };
    let hint = record.targets.entries().first().map(|(_, n)| *n);
    enforce(state, &actor.label(), Operation::ManageContent, hint, decision).await?;
    Ok(record)
}

async fn save(
    state: &AppState,
    actor: &Actor,
    record: ContentRecord,
    action: &str,
) -> Result<ContentRecord, AppError> {
    let label = actor.label();
    let hint = record.targets.entries().first().map(|(_, n)| *n);
    if let Some(pool) = &state.db_pool {
        let result = crate::db::content::update(pool, &record).await;
        persisted(state, &label, Operation::ManageContent, hint, result).await?;
    }
    state.content.insert(record.id, record.clone());
    tracing::info!(content = %record.id, actor = %label, action, "content changed");
    audit(
        state,
        &label,
        Operation::ManageContent,
        hint,
        Outcome::Allowed,
        serde_json::json!({ "content_id": record.id.to_string(), "action": action }),
    )
    .await;
    Ok(record)
}

/// PATCH /v1/content/{id}: Edit title or body.
#[utoipa::path(
    patch,
    path = "/v1/content/{id}",
    params(("id" = Uuid, Path, description = "Content ID")),
    request_body = UpdateContentRequest,
    responses(
        (status = 200, description = "Content updated", body = ContentView),
        (status = 403, description = "Outside the caller's jurisdiction", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Content is archived", body = crate::error::ErrorBody),
    ),
    tag = "content"
)]
async fn update_content(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateContentRequest>, JsonRejection>,
) -> Result<Json<ContentView>, AppError> {
    let req = extract_validated_json(body)?;
    let mut record = managed_record(&state, &caller.actor, ContentId::from_uuid(id)).await?;
    if record.archived {
        return Err(AppError::Conflict(format!("content {} is archived", record.id)));
    }
    if let Some(title) = req.title {
        record.title = title.trim().to_string();
    }
    if let Some(body) = req.body {
        record.body = body;
    }
    record.updated_at = Utc::now();
    let record = save(&state, &caller.actor, record, "update").await?;
    Ok(Json(ContentView::from(&record)))
}

/// DELETE /v1/content/{id}: Archive content. Archived content leaves
/// every member listing but stays in the managed listing.
#[utoipa::path(
    delete,
    path = "/v1/content/{id}",
    params(("id" = Uuid, Path, description = "Content ID")),
    responses(
        (status = 200, description = "Content archived", body = ContentView),
        (status = 403, description = "Outside the caller's jurisdiction", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "content"
)]
async fn archive_content(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ContentView>, AppError> {
    let mut record = managed_record(&state, &caller.actor, ContentId::from_uuid(id)).await?;
    if !record.archived {
        record.archived = true;
        record.updated_at = Utc::now();
        record = save(&state, &caller.actor, record, "archive").await?;
    }
    Ok(Json(ContentView::from(&record)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::UserId;

    #[test]
    fn targets_parse_by_slot_code() {
        let district = Uuid::new_v4();
        let map = BTreeMap::from([("DISTRICT".to_string(), district)]);
        let columns = parse_targets(&map).unwrap();
        assert_eq!(columns.district, Some(NodeId::from_uuid(district)));
        assert_eq!(columns.entries().len(), 1);

        let bad = BTreeMap::from([("target_district_id".to_string(), district)]);
        assert!(parse_targets(&bad).unwrap_err().contains("unknown target slot"));
    }

    #[test]
    fn create_request_rejects_blank_title() {
        let req = CreateContentRequest {
            kind: ContentKind::Bulletin,
            title: "   ".into(),
            body: serde_json::Value::Null,
            targets: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn title_limit_counts_characters() {
        let arabic = |n: usize| "ب".repeat(n);
        let req = CreateContentRequest {
            kind: ContentKind::Bulletin,
            title: arabic(400),
            body: serde_json::Value::Null,
            targets: None,
        };
        assert!(req.validate().is_ok());
        let req = CreateContentRequest {
            title: arabic(501),
            ..req
        };
        assert!(req.validate().is_err());

        let edit = UpdateContentRequest {
            title: Some(arabic(500)),
            ..Default::default()
        };
        assert!(edit.validate().is_ok());
    }

    #[test]
    fn view_keys_targets_by_slot() {
        let node = NodeId::new();
        let now = Utc::now();
        let record = ContentRecord {
            id: ContentId::new(),
            kind: ContentKind::Survey,
            title: "Water access".into(),
            body: serde_json::json!({ "questions": [] }),
            targets: TargetColumns::single(NodeSlot::SectorRegion, node),
            author_id: Some(UserId::new()),
            archived: false,
            created_at: now,
            updated_at: now,
        };
        let view = ContentView::from(&record);
        assert_eq!(view.targets.get("SECTOR_REGION"), Some(node.as_uuid()));
        assert_eq!(view.kind, ContentKind::Survey);
    }
}
