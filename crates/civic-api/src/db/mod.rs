//! # Database Persistence Layer
//!
//! Postgres persistence for the hierarchy, users, content, and the audit
//! log via SQLx.
//!
//! ## Architecture
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, every
//! write is persisted here before the in-memory stores change, and the
//! stores are hydrated from these tables on boot. When absent, the API runs
//! in-memory only (development and tests).
//!
//! Structural hierarchy writes run in `SERIALIZABLE` transactions that
//! re-check the guard's preconditions under row locks. Inserts that depend
//! on a node being active take `FOR SHARE` locks on it, which conflict with
//! the `FOR UPDATE` lock taken by deactivation.

pub mod audit;
pub mod content;
pub mod hierarchy;
pub mod users;

use civic_access::SqlBind;
use civic_core::Denial;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::QueryScalar;
use sqlx::Postgres;
use thiserror::Error;
use uuid::Uuid;

/// Open the connection pool and run migrations.
///
/// Returns `None` when no URL is configured.
pub async fn init_pool(url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = url else {
        tracing::warn!(
            "DATABASE_URL not set, running in-memory only. State will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;
    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(Some(pool))
}

/// Failure of a guarded write.
#[derive(Error, Debug)]
pub enum WriteError {
    /// A precondition re-checked inside the transaction no longer holds.
    #[error("{0}")]
    Denied(Denial),

    /// A concurrent transaction won, or a unique key is taken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other storage failure.
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for WriteError {
    fn from(err: sqlx::Error) -> Self {
        match sql_state(&err).as_deref() {
            Some("40001") | Some("40P01") => {
                Self::Conflict("a concurrent change touched the same nodes, retry".into())
            }
            _ => Self::Database(err),
        }
    }
}

/// The SQLSTATE of a database error, if any.
pub(crate) fn sql_state(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|d| d.code())
        .map(|c| c.into_owned())
}

/// Whether `err` is a unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    sql_state(err).as_deref() == Some("23505")
}

/// Bind rendered predicate parameters, in order.
pub(crate) fn bind_predicate<'q>(
    mut query: QueryScalar<'q, Postgres, Uuid, PgArguments>,
    binds: Vec<SqlBind>,
) -> QueryScalar<'q, Postgres, Uuid, PgArguments> {
    for bind in binds {
        query = match bind {
            SqlBind::Kind(kind) => query.bind(kind),
            SqlBind::Nodes(nodes) => query.bind(nodes),
        };
    }
    query
}
