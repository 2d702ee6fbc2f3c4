//! User and binding persistence.
//!
//! Bindings live in `user_bindings`, one row per (user, kind), keeping the
//! node id as a real foreign key next to the tagged binding document so
//! deactivation can count bound users in SQL.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use civic_access::SqlPredicate;
use civic_core::{Bindings, Email, HierarchyBinding, MobileNumber, User, UserId};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::hierarchy::lock_for_share;
use super::{bind_predicate, is_unique_violation, WriteError};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    full_name: String,
    mobile: String,
    email: String,
    role: String,
    admin_level: String,
    active_hierarchy: String,
    lineage: serde_json::Value,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self, bindings: Bindings) -> Result<User, sqlx::Error> {
        let id = self.id;
        let corrupt = |field: &str, e: &dyn std::fmt::Display| {
            sqlx::Error::Protocol(format!("user {id}: bad {field}: {e}"))
        };
        Ok(User {
            id: UserId::from_uuid(id),
            full_name: self.full_name,
            mobile: MobileNumber::new(self.mobile).map_err(|e| corrupt("mobile", &e))?,
            email: Email::new(self.email).map_err(|e| corrupt("email", &e))?,
            role: self.role.parse().map_err(|e| corrupt("role", &e))?,
            admin_level: self.admin_level.parse().map_err(|e| corrupt("admin_level", &e))?,
            active_hierarchy: self
                .active_hierarchy
                .parse()
                .map_err(|e| corrupt("active_hierarchy", &e))?,
            bindings,
            lineage: serde_json::from_value(self.lineage).map_err(|e| corrupt("lineage", &e))?,
            status: self.status.parse().map_err(|e| corrupt("status", &e))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Load every user with their bindings.
pub async fn load_all(pool: &PgPool) -> Result<Vec<User>, sqlx::Error> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT id, full_name, mobile, email, role, admin_level, active_hierarchy,
                lineage, status, created_at, updated_at
         FROM users ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await?;

    let binding_rows: Vec<(Uuid, serde_json::Value)> =
        sqlx::query_as("SELECT user_id, binding FROM user_bindings")
            .fetch_all(pool)
            .await?;
    let mut bindings: HashMap<Uuid, Bindings> = HashMap::new();
    for (user_id, doc) in binding_rows {
        let binding: HierarchyBinding = serde_json::from_value(doc).map_err(|e| {
            sqlx::Error::Protocol(format!("user {user_id}: bad binding: {e}"))
        })?;
        bindings.entry(user_id).or_default().set(binding);
    }

    rows.into_iter()
        .map(|row| {
            let b = bindings.remove(&row.id).unwrap_or_default();
            row.into_user(b)
        })
        .collect()
}

fn encode_lineage(user: &User) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(&user.lineage).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Replace the user's binding rows, locking each bound node for share.
async fn write_bindings(
    tx: &mut Transaction<'static, Postgres>,
    user: &User,
) -> Result<(), WriteError> {
    sqlx::query("DELETE FROM user_bindings WHERE user_id = $1")
        .bind(user.id.as_uuid())
        .execute(&mut **tx)
        .await?;
    for binding in user.bindings.iter() {
        lock_for_share(tx, binding.node_id()).await?;
        let doc = serde_json::to_value(binding).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query(
            "INSERT INTO user_bindings (user_id, kind, node_id, binding) VALUES ($1, $2, $3, $4)",
        )
        .bind(user.id.as_uuid())
        .bind(binding.kind().as_str())
        .bind(binding.node_id().as_uuid())
        .bind(doc)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Insert a new user. A taken mobile number or email is a conflict.
pub async fn insert(pool: &PgPool, user: &User) -> Result<(), WriteError> {
    let mut tx = pool.begin().await?;
    let inserted = sqlx::query(
        "INSERT INTO users (id, full_name, mobile, email, role, admin_level, active_hierarchy,
                            lineage, status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(user.id.as_uuid())
    .bind(&user.full_name)
    .bind(user.mobile.as_str())
    .bind(user.email.as_str())
    .bind(user.role.as_str())
    .bind(user.admin_level.as_str())
    .bind(user.active_hierarchy.as_str())
    .bind(encode_lineage(user)?)
    .bind(user.status.as_str())
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(&mut *tx)
    .await;
    if let Err(e) = inserted {
        if is_unique_violation(&e) {
            return Err(WriteError::Conflict(
                "mobile number or email is already registered".into(),
            ));
        }
        return Err(e.into());
    }
    write_bindings(&mut tx, user).await?;
    tx.commit().await?;
    Ok(())
}

/// Persist a changed user: level, active hierarchy, lineage, status, and
/// the full binding set.
pub async fn update(pool: &PgPool, user: &User) -> Result<(), WriteError> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "UPDATE users SET full_name = $1, role = $2, admin_level = $3, active_hierarchy = $4,
                          lineage = $5, status = $6, updated_at = $7
         WHERE id = $8",
    )
    .bind(&user.full_name)
    .bind(user.role.as_str())
    .bind(user.admin_level.as_str())
    .bind(user.active_hierarchy.as_str())
    .bind(encode_lineage(user)?)
    .bind(user.status.as_str())
    .bind(user.updated_at)
    .bind(user.id.as_uuid())
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(WriteError::Conflict(format!("user {} no longer exists", user.id)));
    }
    write_bindings(&mut tx, user).await?;
    tx.commit().await?;
    Ok(())
}

/// Ids of users holding any binding inside `scope`, where the predicate was
/// rendered over `b.node_id` and `b.kind` starting at `$1`.
pub async fn ids_in_scope(pool: &PgPool, scope: SqlPredicate) -> Result<Vec<UserId>, sqlx::Error> {
    let sql = format!(
        "SELECT DISTINCT b.user_id FROM user_bindings b WHERE {} ORDER BY b.user_id",
        scope.clause
    );
    let ids = bind_predicate(sqlx::query_scalar::<_, Uuid>(&sql), scope.binds)
        .fetch_all(pool)
        .await?;
    Ok(ids.into_iter().map(UserId::from_uuid).collect())
}
