//! Workspace API Endpoints
//! Mission: Workspace, membership, and invitation management

use crate::auth::models::CurrentUser;
use crate::auth::user_store::UserStore;
use crate::workspace::{
    models::{
        AcceptInvitationRequest, CreateInvitationRequest, CreateWorkspaceRequest, Invitation,
        InvitationCreatedResponse, UpdateSplitRequest, Workspace, WorkspaceMember,
    },
    store::{AcceptOutcome, CancelOutcome, InviteOutcome, RemoveOutcome, WorkspaceStore},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Shared workspace state
#[derive(Clone)]
pub struct WorkspaceState {
    pub store: Arc<WorkspaceStore>,
    pub user_store: Arc<UserStore>,
}

impl WorkspaceState {
    pub fn new(store: Arc<WorkspaceStore>, user_store: Arc<UserStore>) -> Self {
        Self { store, user_store }
    }
}

/// Workspace plus the caller's membership in it
#[derive(Debug, Serialize)]
pub struct WorkspaceWithMembership {
    pub workspace: Workspace,
    pub membership: WorkspaceMember,
}

/// Create workspace - POST /api/workspaces
pub async fn create_workspace(
    State(state): State<WorkspaceState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateWorkspaceRequest>,
) -> Result<(StatusCode, Json<WorkspaceWithMembership>), WsApiError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(WsApiError::MissingName);
    }

    let (workspace, membership) = state.store.create_workspace(name, &user.id).map_err(|e| {
        error!("Workspace creation failed: {}", e);
        WsApiError::InternalError
    })?;

    Ok((
        StatusCode::CREATED,
        Json(WorkspaceWithMembership {
            workspace,
            membership,
        }),
    ))
}

/// List caller's workspaces - GET /api/workspaces
pub async fn list_workspaces(
    State(state): State<WorkspaceState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<Workspace>>, WsApiError> {
    let workspaces = state.store.workspaces_for_user(&user.id).map_err(|e| {
        error!("Workspace listing failed: {}", e);
        WsApiError::InternalError
    })?;

    Ok(Json(workspaces))
}

/// Get one workspace - GET /api/workspaces/:id (any member)
///
/// The workspace and membership were resolved and attached by the
/// `require_workspace` middleware; this handler only echoes them.
pub async fn get_workspace(
    Extension(workspace): Extension<Workspace>,
    Extension(membership): Extension<WorkspaceMember>,
) -> Json<WorkspaceWithMembership> {
    Json(WorkspaceWithMembership {
        workspace,
        membership,
    })
}

/// List members - GET /api/workspaces/:id/members (any member)
pub async fn list_members(
    State(state): State<WorkspaceState>,
    Extension(workspace): Extension<Workspace>,
) -> Result<Json<Vec<WorkspaceMember>>, WsApiError> {
    let members = state.store.members(&workspace.id).map_err(|e| {
        error!("Member listing failed: {}", e);
        WsApiError::InternalError
    })?;

    Ok(Json(members))
}

/// Update a member's profit split - PUT /api/workspaces/:id/members/:member_id/split
/// (OWNER or ADMIN)
pub async fn update_member_split(
    State(state): State<WorkspaceState>,
    Path((workspace_id, member_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateSplitRequest>,
) -> Result<Json<WorkspaceMember>, WsApiError> {
    if !(0.0..=100.0).contains(&payload.profit_split) {
        return Err(WsApiError::InvalidSplit);
    }

    let member = state
        .store
        .update_split(&workspace_id, &member_id, payload.profit_split)
        .map_err(|e| {
            error!("Split update failed: {}", e);
            WsApiError::InternalError
        })?
        .ok_or(WsApiError::MemberNotFound)?;

    Ok(Json(member))
}

/// Remove a member - DELETE /api/workspaces/:id/members/:member_id
/// (OWNER or ADMIN; the owner member is always refused)
pub async fn remove_member(
    State(state): State<WorkspaceState>,
    Path((workspace_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, WsApiError> {
    let outcome = state
        .store
        .remove_member(&workspace_id, &member_id)
        .map_err(|e| {
            error!("Member removal failed: {}", e);
            WsApiError::InternalError
        })?;

    match outcome {
        RemoveOutcome::Removed => Ok(StatusCode::NO_CONTENT),
        RemoveOutcome::NotFound => Err(WsApiError::MemberNotFound),
        RemoveOutcome::OwnerProtected => Err(WsApiError::OwnerProtected),
    }
}

/// Create invitation - POST /api/workspaces/:id/invitations (OWNER or ADMIN)
pub async fn create_invitation(
    State(state): State<WorkspaceState>,
    Extension(workspace): Extension<Workspace>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateInvitationRequest>,
) -> Result<(StatusCode, Json<InvitationCreatedResponse>), WsApiError> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(WsApiError::InvalidEmail);
    }
    if !(0.0..=100.0).contains(&payload.profit_split) {
        return Err(WsApiError::InvalidSplit);
    }

    // An existing member needs no invitation.
    if let Some(invitee) = state.user_store.get_user_by_email(&email).map_err(|e| {
        error!("User lookup failed: {}", e);
        WsApiError::InternalError
    })? {
        let already = state
            .store
            .membership(&invitee.id, &workspace.id)
            .map_err(|e| {
                error!("Membership lookup failed: {}", e);
                WsApiError::InternalError
            })?;
        if already.is_some() {
            return Err(WsApiError::AlreadyMember);
        }
    }

    let outcome = state
        .store
        .create_invitation(&workspace.id, &email, &user.id, payload.profit_split)
        .map_err(|e| {
            error!("Invitation creation failed: {}", e);
            WsApiError::InternalError
        })?;

    match outcome {
        InviteOutcome::Created(invitation) => {
            info!("{} invited {} to workspace {}", user.email, email, workspace.id);
            Ok((
                StatusCode::CREATED,
                Json(InvitationCreatedResponse::from_invitation(&invitation)),
            ))
        }
        InviteOutcome::DuplicatePending => Err(WsApiError::DuplicateInvitation),
    }
}

/// List invitations - GET /api/workspaces/:id/invitations (OWNER or ADMIN)
pub async fn list_invitations(
    State(state): State<WorkspaceState>,
    Extension(workspace): Extension<Workspace>,
) -> Result<Json<Vec<Invitation>>, WsApiError> {
    let invitations = state
        .store
        .invitations_for_workspace(&workspace.id)
        .map_err(|e| {
            error!("Invitation listing failed: {}", e);
            WsApiError::InternalError
        })?;

    Ok(Json(invitations))
}

/// Cancel invitation - DELETE /api/workspaces/:id/invitations/:invitation_id
/// (OWNER or ADMIN)
pub async fn cancel_invitation(
    State(state): State<WorkspaceState>,
    Path((workspace_id, invitation_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, WsApiError> {
    let outcome = state
        .store
        .cancel_invitation(&workspace_id, &invitation_id)
        .map_err(|e| {
            error!("Invitation cancellation failed: {}", e);
            WsApiError::InternalError
        })?;

    match outcome {
        CancelOutcome::Cancelled => Ok(StatusCode::NO_CONTENT),
        CancelOutcome::NotFound => Err(WsApiError::InvitationNotFound),
        CancelOutcome::NotPending => Err(WsApiError::InvitationNotPending),
    }
}

/// Accept invitation - POST /api/invitations/accept (authenticated)
///
/// Not workspace-gated: the caller is not a member yet. The single-use token
/// in the body is the capability; the caller's email must match the invite.
pub async fn accept_invitation(
    State(state): State<WorkspaceState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<AcceptInvitationRequest>,
) -> Result<Json<WorkspaceWithMembership>, WsApiError> {
    let outcome = state
        .store
        .accept_invitation(&payload.token, &user.id, &user.email)
        .map_err(|e| {
            error!("Invitation acceptance failed: {}", e);
            WsApiError::InternalError
        })?;

    match outcome {
        AcceptOutcome::Accepted(workspace, membership) => Ok(Json(WorkspaceWithMembership {
            workspace,
            membership,
        })),
        AcceptOutcome::NotFound => Err(WsApiError::InvitationNotFound),
        AcceptOutcome::Expired => Err(WsApiError::InvitationExpired),
        AcceptOutcome::NotPending => Err(WsApiError::InvitationNotPending),
        AcceptOutcome::EmailMismatch => Err(WsApiError::InvitationEmailMismatch),
        AcceptOutcome::AlreadyMember => Err(WsApiError::AlreadyMember),
    }
}

/// Workspace API errors
#[derive(Debug)]
pub enum WsApiError {
    MissingName,
    InvalidEmail,
    InvalidSplit,
    MemberNotFound,
    OwnerProtected,
    AlreadyMember,
    DuplicateInvitation,
    InvitationNotFound,
    InvitationExpired,
    InvitationNotPending,
    InvitationEmailMismatch,
    InternalError,
}

impl IntoResponse for WsApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            WsApiError::MissingName => (StatusCode::BAD_REQUEST, "Workspace name is required"),
            WsApiError::InvalidEmail => (StatusCode::BAD_REQUEST, "A valid email is required"),
            WsApiError::InvalidSplit => (
                StatusCode::BAD_REQUEST,
                "Profit split must be between 0 and 100",
            ),
            WsApiError::MemberNotFound => (StatusCode::NOT_FOUND, "Member not found"),
            WsApiError::OwnerProtected => {
                (StatusCode::BAD_REQUEST, "Workspace owner cannot be removed")
            }
            WsApiError::AlreadyMember => {
                (StatusCode::CONFLICT, "User is already a workspace member")
            }
            WsApiError::DuplicateInvitation => (
                StatusCode::CONFLICT,
                "A pending invitation already exists for this email",
            ),
            WsApiError::InvitationNotFound => (StatusCode::NOT_FOUND, "Invitation not found"),
            WsApiError::InvitationExpired => (StatusCode::GONE, "Invitation has expired"),
            WsApiError::InvitationNotPending => {
                (StatusCode::CONFLICT, "Invitation is no longer pending")
            }
            WsApiError::InvitationEmailMismatch => (
                StatusCode::FORBIDDEN,
                "Invitation was issued to a different email",
            ),
            WsApiError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, message).into_response()
    }
}
