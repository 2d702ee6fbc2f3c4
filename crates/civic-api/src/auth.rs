//! # Authentication Middleware
//!
//! Bearer token middleware that establishes who is calling. Authorization
//! (what the caller may do) is decided per request by `civic-access` from
//! the caller's [`Actor`] snapshot.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {user_id}:{secret}    acts as the stored user
//! Bearer {secret}              service identity, root ADMIN
//! ```
//!
//! With no token configured, authentication is disabled and every request
//! acts as the root `ADMIN`. Token issuance and password handling live
//! outside this service.

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use civic_access::Actor;
use civic_core::{User, UserId, UserStatus};
use subtle::ConstantTimeEq;

use crate::error::{AppError, ErrorBody, ErrorDetail};
use crate::state::AppState;

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Who the bearer token names. Injected into request extensions by
/// [`auth_middleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerIdentity {
    /// The shared-secret service identity.
    Service,
    /// A stored user.
    User(UserId),
}

/// The caller's access snapshot, resolved against the user store.
///
/// Extracting this rejects unknown users with 401 and suspended users with
/// 403.
#[derive(Debug, Clone)]
pub struct Caller {
    /// Snapshot used for every access decision in the request.
    pub actor: Actor,
    /// The stored user, absent for the service identity.
    pub user: Option<User>,
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<CallerIdentity>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))?;
        match identity {
            CallerIdentity::Service => Ok(Self {
                actor: Actor::root_admin(),
                user: None,
            }),
            CallerIdentity::User(id) => {
                let user = state
                    .users
                    .get(&id)
                    .ok_or_else(|| AppError::Unauthorized(format!("unknown user {id}")))?;
                if user.status == UserStatus::Suspended {
                    return Err(AppError::Forbidden(format!("user {id} is suspended")));
                }
                Ok(Self {
                    actor: Actor::from_user(&user),
                    user: Some(user),
                })
            }
        }
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token in `{user_id}:{secret}` or `{secret}` form.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    match provided.split_once(':') {
        None => {
            if constant_time_token_eq(provided, expected_secret) {
                Ok(CallerIdentity::Service)
            } else {
                Err("invalid bearer token".into())
            }
        }
        Some((user, secret)) => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }
            user.parse::<UserId>()
                .map(CallerIdentity::User)
                .map_err(|e| format!("invalid user id: {e}"))
        }
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the `Authorization` header and inject a [`CallerIdentity`].
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let Some(expected) = expected else {
        request.extensions_mut().insert(CallerIdentity::Service);
        return next.run(request).await;
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(provided) => match parse_bearer_token(provided, &expected) {
                Ok(identity) => {
                    request.extensions_mut().insert(identity);
                    next.run(request).await
                }
                Err(msg) => {
                    tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                    unauthorized_response(&msg)
                }
            },
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                unauthorized_response("authorization header must use Bearer scheme")
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            unauthorized_response("missing authorization header")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::{Extension, Router};
    use tower::ServiceExt;

    fn test_app(token: Option<String>) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|Extension(identity): Extension<CallerIdentity>| async move {
                    match identity {
                        CallerIdentity::Service => "service".to_string(),
                        CallerIdentity::User(id) => id.to_string(),
                    }
                }),
            )
            .layer(from_fn(auth_middleware))
            .layer(Extension(AuthConfig { token }))
    }

    async fn call(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn disabled_auth_acts_as_service() {
        let (status, body) = call(test_app(None), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "service");
    }

    #[tokio::test]
    async fn bare_secret_is_service() {
        let (status, body) = call(test_app(Some("s3cret".into())), Some("Bearer s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "service");
    }

    #[tokio::test]
    async fn user_token_names_the_user() {
        let id = UserId::new();
        let header = format!("Bearer {id}:s3cret");
        let (status, body) = call(test_app(Some("s3cret".into())), Some(&header)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, id.to_string());
    }

    #[tokio::test]
    async fn wrong_secret_and_missing_header_are_rejected() {
        let (status, _) = call(test_app(Some("s3cret".into())), Some("Bearer nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(test_app(Some("s3cret".into())), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(test_app(Some("s3cret".into())), Some("Basic s3cret")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn malformed_user_id_is_rejected() {
        let err = parse_bearer_token("not-a-uuid:s3cret", "s3cret").unwrap_err();
        assert!(err.contains("invalid user id"));
        assert!(parse_bearer_token("not-a-uuid:wrong", "s3cret").is_err());
    }

    #[test]
    fn auth_config_debug_redacts_token() {
        let debug = format!("{:?}", AuthConfig { token: Some("s3cret".into()) });
        assert!(!debug.contains("s3cret"));
    }
}
