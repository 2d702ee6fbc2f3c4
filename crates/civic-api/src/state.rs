//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! - **Hierarchy**: the [`HierarchyStore`] arena behind a `parking_lot`
//!   read-write lock. Reads never hold the lock across `.await`.
//! - **Users** and **Content**: keyed in-memory stores.
//! - **Structure lock**: an async mutex held across the guard check, the
//!   database write, and the in-memory commit of every mutation whose
//!   preconditions read the hierarchy (node writes, binding writes, and
//!   content inserts), so no other mutation can interleave.
//! - **Database**: optional Postgres pool. When present, every write is
//!   persisted before the in-memory commit and the stores are hydrated from
//!   it on boot.

use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use civic_access::TargetColumns;
use civic_core::{ContentId, NodeId, User, UserId, ValidationError};
use civic_hierarchy::{BoundUsers, HierarchyStore};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store.
///
/// All operations are synchronous: the lock is `parking_lot` and is never
/// held across an `.await`.
#[derive(Debug)]
pub struct Store<K, T> {
    data: Arc<RwLock<HashMap<K, T>>>,
}

impl<K, T> Clone for Store<K, T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<K: Eq + Hash + Copy, T: Clone> Store<K, T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: K, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    /// Retrieve a record by ID.
    pub fn get(&self, id: &K) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    /// List all records.
    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    /// Records matching `pred`.
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.data
            .read()
            .values()
            .filter(|v| pred(v))
            .cloned()
            .collect()
    }

    /// Whether any record matches `pred`.
    pub fn any(&self, pred: impl Fn(&T) -> bool) -> bool {
        self.data.read().values().any(pred)
    }

    /// Update a record in place. Returns the updated record, or `None` if not found.
    pub fn update(&self, id: &K, f: impl FnOnce(&mut T)) -> Option<T> {
        let mut guard = self.data.write();
        let entry = guard.get_mut(id)?;
        f(entry);
        Some(entry.clone())
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Copy, T: Clone> Default for Store<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The user store answers the deactivation guard's bound-user question.
impl BoundUsers for Store<UserId, User> {
    fn users_bound_to(&self, node: NodeId) -> usize {
        self.data
            .read()
            .values()
            .filter(|u| u.bindings.binds(node))
            .count()
    }
}

// -- Content ------------------------------------------------------------------

/// Content categories that carry targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentKind {
    Bulletin,
    Survey,
    Voting,
    Report,
    SubscriptionPlan,
}

impl ContentKind {
    /// Every kind.
    pub fn all() -> &'static [ContentKind] {
        &[
            Self::Bulletin,
            Self::Survey,
            Self::Voting,
            Self::Report,
            Self::SubscriptionPlan,
        ]
    }

    /// Stable code, as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bulletin => "BULLETIN",
            Self::Survey => "SURVEY",
            Self::Voting => "VOTING",
            Self::Report => "REPORT",
            Self::SubscriptionPlan => "SUBSCRIPTION_PLAN",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownCode {
                kind: "content kind",
                value: s.to_string(),
            })
    }
}

/// A targeted content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: ContentId,
    pub kind: ContentKind,
    pub title: String,
    /// Free-form payload (survey questions, ballot options, …).
    pub body: serde_json::Value,
    pub targets: TargetColumns,
    /// `None` when created by the service identity.
    pub author_id: Option<UserId>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Configuration ------------------------------------------------------------

/// Application configuration.
///
/// Custom `Debug` redacts the auth token and database URL.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared bearer secret. If `None`, authentication is disabled and
    /// every request acts as the root administrator.
    pub auth_token: Option<String>,
    /// Postgres URL. If `None`, state is in-memory only.
    pub database_url: Option<String>,
    /// YAML hierarchy seed applied at boot when the hierarchy is empty.
    pub seed_file: Option<PathBuf>,
    /// Whether to install the Prometheus recorder and serve `/metrics`.
    pub metrics_enabled: bool,
    /// Emit logs as JSON lines.
    pub log_json: bool,
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// `PORT`, `AUTH_TOKEN`, `DATABASE_URL`, `CIVIC_SEED_FILE`,
    /// `CIVIC_METRICS_ENABLED` (default on), `CIVIC_LOG_JSON` (default off).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str, default: bool| {
            non_empty(key).map_or(default, |v| {
                matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
            })
        };
        Self {
            port: non_empty("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(8080),
            auth_token: non_empty("AUTH_TOKEN"),
            database_url: non_empty("DATABASE_URL"),
            seed_file: non_empty("CIVIC_SEED_FILE").map(PathBuf::from),
            metrics_enabled: flag("CIVIC_METRICS_ENABLED", true),
            log_json: flag("CIVIC_LOG_JSON", false),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("seed_file", &self.seed_file)
            .field("metrics_enabled", &self.metrics_enabled)
            .field("log_json", &self.log_json)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            database_url: None,
            seed_file: None,
            metrics_enabled: false,
            log_json: false,
        }
    }
}

// -- Application State --------------------------------------------------------

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub hierarchy: Arc<RwLock<HierarchyStore>>,
    pub users: Store<UserId, User>,
    pub content: Store<ContentId, ContentRecord>,

    /// Serialises hierarchy-dependent mutations end to end.
    pub structure_lock: Arc<tokio::sync::Mutex<()>>,

    /// When `Some`, every write is persisted to Postgres before the
    /// in-memory stores change.
    pub db_pool: Option<PgPool>,

    /// Renders `/metrics`. `None` when metrics are disabled.
    pub metrics: Option<PrometheusHandle>,

    pub config: AppConfig,
}

impl AppState {
    /// In-memory state with default configuration.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    /// In-memory state with the given configuration.
    pub fn with_config(config: AppConfig) -> Self {
        Self {
            hierarchy: Arc::new(RwLock::new(HierarchyStore::new())),
            users: Store::new(),
            content: Store::new(),
            structure_lock: Arc::new(tokio::sync::Mutex::new(())),
            db_pool: None,
            metrics: None,
            config,
        }
    }

    /// Attach a database pool.
    pub fn with_pool(mut self, pool: Option<PgPool>) -> Self {
        self.db_pool = pool;
        self
    }

    /// Attach a Prometheus handle.
    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    /// Replace the hierarchy, typically with one loaded from a seed.
    pub fn with_hierarchy(self, store: HierarchyStore) -> Self {
        *self.hierarchy.write() = store;
        self
    }

    /// Hydrate in-memory stores from the database.
    ///
    /// Called once on startup when a database pool is available.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let Some(pool) = &self.db_pool else {
            return Ok(());
        };

        let nodes = crate::db::hierarchy::load_all(pool)
            .await
            .map_err(|e| format!("failed to load hierarchy: {e}"))?;
        let node_count = {
            let mut restored = HierarchyStore::new();
            let count = restored
                .restore(nodes)
                .map_err(|d| format!("stored hierarchy is inconsistent: {d}"))?;
            *self.hierarchy.write() = restored;
            count
        };

        let users = crate::db::users::load_all(pool)
            .await
            .map_err(|e| format!("failed to load users: {e}"))?;
        let user_count = users.len();
        for user in users {
            self.users.insert(user.id, user);
        }

        let items = crate::db::content::load_all(pool)
            .await
            .map_err(|e| format!("failed to load content: {e}"))?;
        let content_count = items.len();
        for item in items {
            self.content.insert(item.id, item);
        }

        tracing::info!(
            nodes = node_count,
            users = user_count,
            content = content_count,
            "hydrated in-memory stores from database"
        );
        Ok(())
    }

    /// Apply the configured seed file when the hierarchy is empty.
    ///
    /// Seeded nodes are persisted when a database is attached.
    pub async fn apply_seed(&self) -> Result<usize, String> {
        let Some(path) = &self.config.seed_file else {
            return Ok(0);
        };
        if !self.hierarchy.read().is_empty() {
            tracing::info!(path = %path.display(), "hierarchy already populated, seed skipped");
            return Ok(0);
        }
        let seeded = civic_hierarchy::load_seed_file(path)
            .map_err(|e| format!("failed to apply seed {}: {e}", path.display()))?;
        if let Some(pool) = &self.db_pool {
            let mut ordered: Vec<_> = seeded.iter().cloned().collect();
            ordered.sort_by_key(|n| seeded.ancestors(n.id).len());
            for node in &ordered {
                crate::db::hierarchy::insert_seed_node(pool, node)
                    .await
                    .map_err(|e| format!("failed to persist seed node {}: {e}", node.code))?;
            }
        }
        let count = seeded.len();
        *self.hierarchy.write() = seeded;
        Ok(count)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
