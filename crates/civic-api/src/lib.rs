//! # civic-api: Axum API Services
//!
//! HTTP surface for the civic jurisdiction engine, built on
//! Axum/Tower/Tokio. Assembles the public, hierarchy, user, and content
//! routers into a single application with shared middleware for
//! authentication, tracing, and metrics.
//!
//! ## Routes
//!
//! - `/v1/public/*`: self-signup and node pickers (unauthenticated)
//! - `/v1/hierarchy/*`: node administration
//! - `/v1/me*`, `/v1/admins`, `/v1/users/*`: accounts and jurisdiction
//! - `/v1/content/*`: targeted content
//! - `/v1/audit/integrity`: audit chain verification
//! - `/health/*`, `/metrics`, `/openapi.json`: operational (unauthenticated)
//!
//! ## Middleware Stack (Tower)
//!
//! TraceLayer → Metrics → Auth (authenticated routers only)
//!
//! ## Crate Policy
//!
//! - Sits at the top of the dependency DAG.
//! - No access logic in route handlers: decisions come from `civic-access`,
//!   structural checks from `civic-hierarchy`.
//! - All errors map to structured HTTP responses via `AppError`.

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use state::AppState;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::get;
use axum::{Extension, Router};

use crate::auth::AuthConfig;

/// Assemble the full application router with all routes and middleware.
///
/// Public signup, health probes, metrics, and the OpenAPI document are
/// mounted outside the auth middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    // Authenticated API routes.
    let api = Router::new()
        .merge(routes::hierarchy::router())
        .merge(routes::users::router())
        .merge(routes::content::router())
        .merge(routes::audit::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(Extension(auth_config));

    // Unauthenticated routes.
    let open = Router::new()
        .merge(routes::public::router())
        .merge(openapi::router())
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(middleware::metrics::render));

    Router::new()
        .merge(open)
        .merge(api)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .with_state(state)
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 503 while an attached database is unreachable.
async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let Some(pool) = &state.db_pool else {
        return (StatusCode::OK, "ready");
    };
    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
        }
    }
}
