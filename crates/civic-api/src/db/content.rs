//! Content persistence.
//!
//! The eleven targeting columns are read and written by iterating
//! [`NodeSlot::all`], so the column list has one source.

use civic_access::{SqlPredicate, TargetColumns};
use civic_core::{ContentId, NodeId, NodeSlot, UserId};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::hierarchy::lock_for_share;
use super::{bind_predicate, WriteError};
use crate::state::ContentRecord;

fn target_column_list() -> String {
    NodeSlot::all()
        .iter()
        .map(|s| s.column())
        .collect::<Vec<_>>()
        .join(", ")
}

fn from_row(row: &PgRow) -> Result<ContentRecord, sqlx::Error> {
    let id: Uuid = row.try_get("id")?;
    let mut targets = TargetColumns::default();
    for slot in NodeSlot::all() {
        let node: Option<Uuid> = row.try_get(slot.column())?;
        targets.set(*slot, node.map(NodeId::from_uuid));
    }
    let kind: String = row.try_get("kind")?;
    Ok(ContentRecord {
        id: ContentId::from_uuid(id),
        kind: kind
            .parse()
            .map_err(|e| sqlx::Error::Protocol(format!("content {id}: bad kind: {e}")))?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        targets,
        author_id: row
            .try_get::<Option<Uuid>, _>("author_id")?
            .map(UserId::from_uuid),
        archived: row.try_get("archived")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Load every content item, newest first.
pub async fn load_all(pool: &PgPool) -> Result<Vec<ContentRecord>, sqlx::Error> {
    let sql = format!(
        "SELECT id, kind, title, body, {}, author_id, archived, created_at, updated_at
         FROM content_items ORDER BY created_at DESC",
        target_column_list()
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(from_row).collect()
}

/// Insert a content item, holding its target nodes active until commit.
pub async fn insert(pool: &PgPool, record: &ContentRecord) -> Result<(), WriteError> {
    let mut tx = pool.begin().await?;
    for (_, node) in record.targets.entries() {
        lock_for_share(&mut tx, node).await?;
    }

    let slots = NodeSlot::all();
    let placeholders = (0..slots.len())
        .map(|i| format!("${}", i + 5))
        .collect::<Vec<_>>()
        .join(", ");
    let tail = slots.len() + 5;
    let sql = format!(
        "INSERT INTO content_items
             (id, kind, title, body, {}, author_id, archived, created_at, updated_at)
         VALUES ($1, $2, $3, $4, {placeholders}, ${}, ${}, ${}, ${})",
        target_column_list(),
        tail,
        tail + 1,
        tail + 2,
        tail + 3,
    );
    let mut query = sqlx::query(&sql)
        .bind(record.id.as_uuid())
        .bind(record.kind.as_str())
        .bind(&record.title)
        .bind(&record.body);
    for slot in slots {
        query = query.bind(record.targets.get(*slot).map(|n| *n.as_uuid()));
    }
    query
        .bind(record.author_id.map(|a| *a.as_uuid()))
        .bind(record.archived)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Persist edits to title, body, and archive flag. Targets never change
/// after creation.
pub async fn update(pool: &PgPool, record: &ContentRecord) -> Result<(), WriteError> {
    let result = sqlx::query(
        "UPDATE content_items SET title = $1, body = $2, archived = $3, updated_at = $4
         WHERE id = $5",
    )
    .bind(&record.title)
    .bind(&record.body)
    .bind(record.archived)
    .bind(record.updated_at)
    .bind(record.id.as_uuid())
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(WriteError::Conflict(format!(
            "content {} no longer exists",
            record.id
        )));
    }
    Ok(())
}

/// Ids of live content matching a visibility predicate rendered from `$1`,
/// newest first.
pub async fn visible_ids(
    pool: &PgPool,
    predicate: SqlPredicate,
) -> Result<Vec<ContentId>, sqlx::Error> {
    let sql = format!(
        "SELECT id FROM content_items WHERE NOT archived AND {} ORDER BY created_at DESC",
        predicate.clause
    );
    let ids = bind_predicate(sqlx::query_scalar::<_, Uuid>(&sql), predicate.binds)
        .fetch_all(pool)
        .await?;
    Ok(ids.into_iter().map(ContentId::from_uuid).collect())
}
