//! # Prometheus Metrics
//!
//! Counters are recorded through the `metrics` facade; the Prometheus
//! recorder is installed once per process by the binary and rendered at
//! `/metrics`. Without an installed recorder the macros are no-ops.
//!
//! | Counter | Labels |
//! |---------|--------|
//! | `civic_http_requests_total` | `status` |
//! | `civic_access_denials_total` | `reason` (recorded in `error.rs`) |

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;

/// Install the global Prometheus recorder.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    metrics::describe_counter!(
        "civic_http_requests_total",
        "HTTP requests served, by status code"
    );
    metrics::describe_counter!(
        "civic_access_denials_total",
        "Access and structural denials returned to callers, by reason"
    );
    Ok(handle)
}

/// Count every response by status.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    metrics::counter!(
        "civic_http_requests_total",
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    response
}

/// GET /metrics: Prometheus text exposition.
pub async fn render(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
