//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI 3.1 spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Civic Jurisdiction API",
        version = "0.1.0",
        description = "Hierarchy administration, account admission, and jurisdiction-scoped content targeting for a civic organisation.",
        license(name = "AGPL-3.0-or-later")
    ),
    paths(
        // Public
        crate::routes::public::signup,
        crate::routes::public::list_public_nodes,
        // Hierarchy
        crate::routes::hierarchy::create_node,
        crate::routes::hierarchy::list_nodes,
        crate::routes::hierarchy::get_node,
        crate::routes::hierarchy::list_children,
        crate::routes::hierarchy::update_node,
        crate::routes::hierarchy::deactivate_node,
        // Users
        crate::routes::users::get_me,
        crate::routes::users::get_my_jurisdiction,
        crate::routes::users::set_active_hierarchy,
        crate::routes::users::create_admin,
        crate::routes::users::list_users,
        crate::routes::users::get_user,
        crate::routes::users::rebind_user,
        // Content
        crate::routes::content::create_content,
        crate::routes::content::list_visible,
        crate::routes::content::list_managed,
        crate::routes::content::get_content,
        crate::routes::content::update_content,
        crate::routes::content::archive_content,
        // Audit
        crate::routes::audit::verify_integrity,
    ),
    components(schemas(
        crate::state::ContentKind,
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::public::SignupRequest,
        crate::routes::hierarchy::NodeView,
        crate::routes::hierarchy::CreateNodeRequest,
        crate::routes::hierarchy::UpdateNodeRequest,
        crate::routes::users::BindingView,
        crate::routes::users::UserView,
        crate::routes::users::JurisdictionView,
        crate::routes::users::AccountFields,
        crate::routes::users::CreateAdminRequest,
        crate::routes::users::RebindRequest,
        crate::routes::users::ActiveHierarchyRequest,
        crate::routes::content::ContentView,
        crate::routes::content::CreateContentRequest,
        crate::routes::content::UpdateContentRequest,
        crate::db::audit::ChainIntegrity,
        crate::routes::audit::IntegrityReport,
    )),
    tags(
        (name = "public", description = "Unauthenticated signup and node pickers"),
        (name = "hierarchy", description = "Geographic, expatriate, and sector node administration"),
        (name = "users", description = "Accounts, administrator creation, and jurisdiction"),
        (name = "content", description = "Targeted content and visibility"),
        (name = "audit", description = "Audit chain verification"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_every_surface() {
        let spec = ApiDoc::openapi();
        let paths: Vec<&String> = spec.paths.paths.keys().collect();
        for expected in [
            "/v1/public/signup",
            "/v1/hierarchy/nodes/{id}",
            "/v1/users/{id}/binding",
            "/v1/content/managed",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {expected}"
            );
        }
    }
}
