//! Workspace Models
//! Mission: Define tenant, membership, and invitation data structures

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant boundary. Every workspace-scoped row carries a workspace id and
/// every workspace-scoped query filters by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub kind: WorkspaceKind,
    pub created_at: String,
}

/// Workspace type; promoted one-way to Partnership when a second member
/// is accepted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkspaceKind {
    #[serde(rename = "SOLE_TRADER")]
    SoleTrader,
    #[serde(rename = "PARTNERSHIP")]
    Partnership,
}

impl WorkspaceKind {
    pub fn as_str(&self) -> &str {
        match self {
            WorkspaceKind::SoleTrader => "SOLE_TRADER",
            WorkspaceKind::Partnership => "PARTNERSHIP",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SOLE_TRADER" => Some(WorkspaceKind::SoleTrader),
            "PARTNERSHIP" => Some(WorkspaceKind::Partnership),
            _ => None,
        }
    }
}

/// Membership roles. Flat enumeration: routes declare explicit allowed
/// sets, there is no implicit OWNER > ADMIN > MEMBER ordering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemberRole {
    #[serde(rename = "OWNER")]
    Owner,
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "MEMBER")]
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &str {
        match self {
            MemberRole::Owner => "OWNER",
            MemberRole::Admin => "ADMIN",
            MemberRole::Member => "MEMBER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OWNER" => Some(MemberRole::Owner),
            "ADMIN" => Some(MemberRole::Admin),
            "MEMBER" => Some(MemberRole::Member),
            _ => None,
        }
    }
}

/// Join entity binding a user to a workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMember {
    pub id: Uuid,
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub role: MemberRole,
    pub is_owner: bool,
    pub profit_split: f64, // 0-100; splits are not forced to sum to 100
    pub joined_at: String,
}

/// Invitation lifecycle states; Accepted/Expired/Cancelled are terminal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InvitationStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "ACCEPTED")]
    Accepted,
    #[serde(rename = "EXPIRED")]
    Expired,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            InvitationStatus::Pending => "PENDING",
            InvitationStatus::Accepted => "ACCEPTED",
            InvitationStatus::Expired => "EXPIRED",
            InvitationStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(InvitationStatus::Pending),
            "ACCEPTED" => Some(InvitationStatus::Accepted),
            "EXPIRED" => Some(InvitationStatus::Expired),
            "CANCELLED" => Some(InvitationStatus::Cancelled),
            _ => None,
        }
    }
}

/// Pending partner-recruitment record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub email: String,
    pub invited_by: Uuid,
    pub invitee_user_id: Option<Uuid>,
    pub profit_split: f64,
    #[serde(skip_serializing)]
    pub token: String, // single-use capability, only delivered to the invitee
    pub status: InvitationStatus,
    pub expires_at: String,
    pub created_at: String,
}

/// Create workspace request body
#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceRequest {
    pub name: String,
}

/// Create invitation request body
#[derive(Debug, Deserialize)]
pub struct CreateInvitationRequest {
    pub email: String,
    pub profit_split: f64,
}

/// Accept invitation request body
#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    pub token: String,
}

/// Update member split request body
#[derive(Debug, Deserialize)]
pub struct UpdateSplitRequest {
    pub profit_split: f64,
}

/// Invitation response with the single-use token included (returned only to
/// the admin who created it, for delivery to the invitee)
#[derive(Debug, Serialize)]
pub struct InvitationCreatedResponse {
    pub id: String,
    pub email: String,
    pub profit_split: f64,
    pub token: String,
    pub status: InvitationStatus,
    pub expires_at: String,
}

impl InvitationCreatedResponse {
    pub fn from_invitation(inv: &Invitation) -> Self {
        Self {
            id: inv.id.to_string(),
            email: inv.email.clone(),
            profit_split: inv.profit_split,
            token: inv.token.clone(),
            status: inv.status,
            expires_at: inv.expires_at.clone(),
        }
    }
}
