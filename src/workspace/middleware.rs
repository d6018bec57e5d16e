//! Workspace Authorization Middleware
//! Mission: Resolve workspace membership and enforce per-route role sets

use crate::auth::models::CurrentUser;
use crate::workspace::api::WorkspaceState;
use crate::workspace::models::{MemberRole, WorkspaceMember};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

/// Membership-resolution middleware. Runs strictly after `auth_middleware`;
/// it reads the authenticated identity from request extensions.
///
/// The workspace id comes from the request path (`/api/workspaces/:id/...`)
/// or a `workspace_id` query parameter. Missing id rejects with 400, a
/// resolvable id without membership rejects with 403 — a valid user with no
/// row in this workspace is indistinguishable from an outsider.
pub async fn require_workspace(
    State(state): State<WorkspaceState>,
    mut req: Request,
    next: Next,
) -> Result<Response, WsError> {
    let user = req
        .extensions()
        .get::<CurrentUser>()
        .cloned()
        .ok_or(WsError::Unauthenticated)?;

    let workspace_id = extract_workspace_id(&req).ok_or(WsError::MissingWorkspaceId)?;

    let membership = state
        .store
        .membership(&user.id, &workspace_id)
        .map_err(|e| {
            tracing::error!("Membership lookup failed: {}", e);
            WsError::StoreUnavailable
        })?
        .ok_or(WsError::AccessDenied)?;

    let workspace = state
        .store
        .get_workspace(&workspace_id)
        .map_err(|e| {
            tracing::error!("Workspace lookup failed: {}", e);
            WsError::StoreUnavailable
        })?
        .ok_or(WsError::AccessDenied)?;

    req.extensions_mut().insert(workspace);
    req.extensions_mut().insert(membership);

    Ok(next.run(req).await)
}

/// Role gate. Flat set-membership test over the resolved membership: OWNER
/// does not implicitly satisfy an ADMIN check, it must be listed. The check
/// reads attached state and mutates nothing, so repeating it is free.
pub async fn require_role(
    allowed: &'static [MemberRole],
    req: Request,
    next: Next,
) -> Result<Response, WsError> {
    let membership = req
        .extensions()
        .get::<WorkspaceMember>()
        .ok_or(WsError::AccessDenied)?;

    if !allowed.contains(&membership.role) {
        return Err(WsError::InsufficientRole);
    }

    Ok(next.run(req).await)
}

/// Workspace id from the path segment after `/workspaces/`, falling back to
/// a `workspace_id` query parameter
fn extract_workspace_id(req: &Request) -> Option<Uuid> {
    let path = req.uri().path();
    let from_path = path
        .split('/')
        .skip_while(|seg| *seg != "workspaces")
        .nth(1)
        .and_then(|seg| Uuid::parse_str(seg).ok());

    let from_query = || {
        req.uri().query().and_then(|query| {
            query
                .split('&')
                .find(|pair| pair.starts_with("workspace_id="))
                .and_then(|pair| pair.split('=').nth(1))
                .and_then(|v| Uuid::parse_str(v).ok())
        })
    };

    from_path.or_else(from_query)
}

/// Workspace authorization errors
#[derive(Debug)]
pub enum WsError {
    Unauthenticated,
    MissingWorkspaceId,
    AccessDenied,
    InsufficientRole,
    StoreUnavailable,
}

impl IntoResponse for WsError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            WsError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Authentication required"),
            WsError::MissingWorkspaceId => (StatusCode::BAD_REQUEST, "Workspace ID required"),
            WsError::AccessDenied => (StatusCode::FORBIDDEN, "Access denied"),
            WsError::InsufficientRole => (StatusCode::FORBIDDEN, "Insufficient permissions"),
            WsError::StoreUnavailable => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, message).into_response()
    }
}
