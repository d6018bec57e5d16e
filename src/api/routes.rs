//! API Router
//! Mission: Wire the auth and workspace surfaces with their gate layers

use crate::auth::{api as auth_api, middleware::auth_middleware, AuthState};
use crate::middleware::request_logging;
use crate::workspace::{
    api as workspace_api,
    middleware::{require_role, require_workspace},
    models::MemberRole,
    WorkspaceState,
};
use axum::{
    extract::FromRef,
    middleware,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;

/// Role sets are spelled out per route group; there is no hierarchy to
/// fall back on.
const ADMIN_ROLES: &[MemberRole] = &[MemberRole::Owner, MemberRole::Admin];

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub workspace: WorkspaceState,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for WorkspaceState {
    fn from_ref(state: &AppState) -> Self {
        state.workspace.clone()
    }
}

/// Create the API router.
///
/// Gate progression per request: authenticate, resolve workspace, check
/// role, then the handler. Each group carries exactly the layers its
/// routes need; any gate can terminate the request.
pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/register", post(auth_api::register))
        .route("/api/auth/login", post(auth_api::login))
        .route("/api/auth/refresh", post(auth_api::refresh))
        .route("/api/auth/logout", post(auth_api::logout));

    let authenticated = Router::new()
        .route("/api/auth/me", get(auth_api::me))
        .route("/api/auth/logout-all", post(auth_api::logout_all))
        .route(
            "/api/workspaces",
            post(workspace_api::create_workspace).get(workspace_api::list_workspaces),
        )
        .route(
            "/api/invitations/accept",
            post(workspace_api::accept_invitation),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Any member of the workspace. Layers run outermost-last-added:
    // authenticate first, then resolve membership.
    let member = Router::new()
        .route("/api/workspaces/:id", get(workspace_api::get_workspace))
        .route(
            "/api/workspaces/:id/members",
            get(workspace_api::list_members),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_workspace,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // OWNER or ADMIN only.
    let admin = Router::new()
        .route(
            "/api/workspaces/:id/members/:member_id/split",
            put(workspace_api::update_member_split),
        )
        .route(
            "/api/workspaces/:id/members/:member_id",
            delete(workspace_api::remove_member),
        )
        .route(
            "/api/workspaces/:id/invitations",
            post(workspace_api::create_invitation).get(workspace_api::list_invitations),
        )
        .route(
            "/api/workspaces/:id/invitations/:invitation_id",
            delete(workspace_api::cancel_invitation),
        )
        .route_layer(middleware::from_fn(|req, next| {
            require_role(ADMIN_ROLES, req, next)
        }))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_workspace,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(member)
        .merge(admin)
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}
