//! Hierarchy node persistence.
//!
//! Structural writes (create, reparent, deactivate) re-check the guard's
//! preconditions inside a `SERIALIZABLE` transaction with the affected
//! rows locked `FOR UPDATE`, so the in-memory decision cannot be
//! invalidated by a write from another process between check and commit.

use chrono::{DateTime, Utc};
use civic_core::{Denial, DenialReason, NodeClass, NodeCode, NodeId, UserId};
use civic_hierarchy::{HierarchyNode, NodeStatus};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{is_unique_violation, WriteError};

const SELECT_COLUMNS: &str =
    "id, code, name, class, parent_id, status, admin_id, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct NodeRow {
    id: Uuid,
    code: String,
    name: String,
    class: String,
    parent_id: Option<Uuid>,
    status: String,
    admin_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl NodeRow {
    fn into_node(self) -> Result<HierarchyNode, sqlx::Error> {
        let corrupt = |field: &str, e: &dyn std::fmt::Display| {
            sqlx::Error::Protocol(format!("hierarchy node {}: bad {field}: {e}", self.id))
        };
        Ok(HierarchyNode {
            id: NodeId::from_uuid(self.id),
            code: NodeCode::new(self.code.clone()).map_err(|e| corrupt("code", &e))?,
            name: self.name.clone(),
            class: self.class.parse().map_err(|e| corrupt("class", &e))?,
            parent_id: self.parent_id.map(NodeId::from_uuid),
            status: self.status.parse().map_err(|e| corrupt("status", &e))?,
            admin_id: self.admin_id.map(UserId::from_uuid),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Load every node, any status.
pub async fn load_all(pool: &PgPool) -> Result<Vec<HierarchyNode>, sqlx::Error> {
    let rows = sqlx::query_as::<_, NodeRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM hierarchy_nodes ORDER BY created_at ASC"
    ))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(NodeRow::into_node).collect()
}

async fn begin_serializable(pool: &PgPool) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// Lock a node row and require it to be active.
async fn lock_active(
    tx: &mut Transaction<'static, Postgres>,
    id: NodeId,
    mode: &str,
) -> Result<(), WriteError> {
    let status: Option<String> = sqlx::query_scalar(&format!(
        "SELECT status FROM hierarchy_nodes WHERE id = $1 {mode}"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await?;
    match status.as_deref() {
        Some(s) if s == NodeStatus::Active.as_str() => Ok(()),
        _ => Err(WriteError::Denied(Denial::node_not_found(id))),
    }
}

/// Lock `id` for update and require it to be active.
pub(crate) async fn lock_for_update(
    tx: &mut Transaction<'static, Postgres>,
    id: NodeId,
) -> Result<(), WriteError> {
    lock_active(tx, id, "FOR UPDATE").await
}

/// Lock `id` for share and require it to be active.
pub(crate) async fn lock_for_share(
    tx: &mut Transaction<'static, Postgres>,
    id: NodeId,
) -> Result<(), WriteError> {
    lock_active(tx, id, "FOR SHARE").await
}

fn class_columns(class: &NodeClass) -> (&'static str, Option<&'static str>, Option<&'static str>) {
    (
        class.kind().as_str(),
        class.tier().map(|t| t.as_str()),
        class.sector_type().map(|s| s.as_str()),
    )
}

async fn insert_row<'e, E>(
    executor: E,
    node: &HierarchyNode,
    on_conflict: &str,
) -> Result<u64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let (kind, tier, sector_type) = class_columns(&node.class);
    let result = sqlx::query(&format!(
        "INSERT INTO hierarchy_nodes (id, code, name, class, kind, tier, sector_type,
         parent_id, status, admin_id, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) {on_conflict}"
    ))
    .bind(node.id.as_uuid())
    .bind(node.code.as_str())
    .bind(&node.name)
    .bind(node.class.to_string())
    .bind(kind)
    .bind(tier)
    .bind(sector_type)
    .bind(node.parent_id.map(|p| *p.as_uuid()))
    .bind(node.status.as_str())
    .bind(node.admin_id.map(|a| *a.as_uuid()))
    .bind(node.created_at)
    .bind(node.updated_at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Insert a planned node after re-checking its parent under lock.
pub async fn insert_node(pool: &PgPool, node: &HierarchyNode) -> Result<(), WriteError> {
    let mut tx = begin_serializable(pool).await?;
    if let Some(parent) = node.parent_id {
        lock_for_update(&mut tx, parent).await?;
    }
    if let Err(e) = insert_row(&mut *tx, node, "").await {
        if is_unique_violation(&e) {
            return Err(WriteError::Denied(Denial::new(
                DenialReason::DuplicateCode,
                format!("{} code {} is already taken", node.class, node.code),
            )));
        }
        return Err(e.into());
    }
    tx.commit().await?;
    Ok(())
}

/// Insert a node from a seed file. Existing rows are left alone.
pub async fn insert_seed_node(pool: &PgPool, node: &HierarchyNode) -> Result<(), sqlx::Error> {
    insert_row(pool, node, "ON CONFLICT DO NOTHING").await?;
    Ok(())
}

/// Move `id` under `new_parent`, re-checking activity and acyclicity.
pub async fn reparent(
    pool: &PgPool,
    id: NodeId,
    new_parent: NodeId,
    updated_at: DateTime<Utc>,
) -> Result<(), WriteError> {
    let mut tx = begin_serializable(pool).await?;
    lock_for_update(&mut tx, id).await?;
    lock_for_update(&mut tx, new_parent).await?;

    let cycle: bool = sqlx::query_scalar(
        "WITH RECURSIVE up AS (
             SELECT id, parent_id FROM hierarchy_nodes WHERE id = $1
             UNION ALL
             SELECT n.id, n.parent_id FROM hierarchy_nodes n JOIN up ON n.id = up.parent_id
         )
         SELECT EXISTS (SELECT 1 FROM up WHERE id = $2)",
    )
    .bind(new_parent.as_uuid())
    .bind(id.as_uuid())
    .fetch_one(&mut *tx)
    .await?;
    if cycle {
        return Err(WriteError::Denied(Denial::new(
            DenialReason::CycleDetected,
            format!("node {id} cannot be placed under its descendant {new_parent}"),
        )));
    }

    sqlx::query("UPDATE hierarchy_nodes SET parent_id = $1, updated_at = $2 WHERE id = $3")
        .bind(new_parent.as_uuid())
        .bind(updated_at)
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Rename an active node.
pub async fn rename(
    pool: &PgPool,
    id: NodeId,
    name: &str,
    updated_at: DateTime<Utc>,
) -> Result<(), WriteError> {
    let result = sqlx::query(
        "UPDATE hierarchy_nodes SET name = $1, updated_at = $2 WHERE id = $3 AND status = 'ACTIVE'",
    )
    .bind(name)
    .bind(updated_at)
    .bind(id.as_uuid())
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(WriteError::Denied(Denial::node_not_found(id)));
    }
    Ok(())
}

/// Set or clear an active node's administrator.
pub async fn assign_admin(
    pool: &PgPool,
    id: NodeId,
    admin: Option<UserId>,
    updated_at: DateTime<Utc>,
) -> Result<(), WriteError> {
    let result = sqlx::query(
        "UPDATE hierarchy_nodes SET admin_id = $1, updated_at = $2
         WHERE id = $3 AND status = 'ACTIVE'",
    )
    .bind(admin.map(|a| *a.as_uuid()))
    .bind(updated_at)
    .bind(id.as_uuid())
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(WriteError::Denied(Denial::node_not_found(id)));
    }
    Ok(())
}

/// Soft-deactivate `id`, re-checking for active children and bound users.
pub async fn deactivate(
    pool: &PgPool,
    id: NodeId,
    updated_at: DateTime<Utc>,
) -> Result<(), WriteError> {
    let mut tx = begin_serializable(pool).await?;
    lock_for_update(&mut tx, id).await?;

    let children: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM hierarchy_nodes WHERE parent_id = $1 AND status = 'ACTIVE'",
    )
    .bind(id.as_uuid())
    .fetch_one(&mut *tx)
    .await?;
    if children > 0 {
        return Err(WriteError::Denied(Denial::new(
            DenialReason::HasActiveChildren,
            format!("node {id} has {children} active child node(s)"),
        )));
    }

    let bound: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_bindings WHERE node_id = $1")
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
    if bound > 0 {
        return Err(WriteError::Denied(Denial::new(
            DenialReason::HasBoundUsers,
            format!("node {id} has {bound} bound user(s)"),
        )));
    }

    sqlx::query("UPDATE hierarchy_nodes SET status = 'INACTIVE', updated_at = $1 WHERE id = $2")
        .bind(updated_at)
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
