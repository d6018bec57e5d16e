//! Workspace Storage
//! Mission: Manage tenants, memberships, and invitations with SQLite

use crate::workspace::models::{
    Invitation, InvitationStatus, MemberRole, Workspace, WorkspaceKind, WorkspaceMember,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

/// Map a mangled stored uuid to a column conversion error instead of
/// silently producing a wrong id.
fn parse_uuid(idx: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Outcome of an invitation acceptance attempt
#[derive(Debug)]
pub enum AcceptOutcome {
    Accepted(Workspace, WorkspaceMember),
    NotFound,
    Expired,
    NotPending,
    EmailMismatch,
    AlreadyMember,
}

/// Outcome of a member removal attempt
#[derive(Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
    OwnerProtected,
}

/// Outcome of an invitation creation attempt
#[derive(Debug)]
pub enum InviteOutcome {
    Created(Invitation),
    DuplicatePending,
}

/// Outcome of an invitation cancellation attempt
#[derive(Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NotFound,
    NotPending,
}

/// Workspace storage with SQLite backend
pub struct WorkspaceStore {
    db_path: String,
    invitation_ttl_days: i64,
}

impl WorkspaceStore {
    /// Create a new workspace store and initialize database
    pub fn new(db_path: &str, invitation_ttl_days: i64) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
            invitation_ttl_days,
        };
        store.init_db()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS workspaces (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS workspace_members (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                workspace_id TEXT NOT NULL,
                role TEXT NOT NULL,
                is_owner INTEGER NOT NULL DEFAULT 0,
                profit_split REAL NOT NULL,
                joined_at TEXT NOT NULL,
                UNIQUE (user_id, workspace_id),
                FOREIGN KEY (workspace_id) REFERENCES workspaces(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS invitations (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                email TEXT NOT NULL,
                invited_by TEXT NOT NULL,
                invitee_user_id TEXT,
                profit_split REAL NOT NULL,
                token TEXT UNIQUE NOT NULL,
                status TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (workspace_id) REFERENCES workspaces(id)
            )",
            [],
        )?;

        Ok(())
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path).context("Failed to open workspace database")
    }

    // ===== Workspaces =====

    /// Create a workspace with its owner member (role OWNER, 100% split).
    /// Both rows are written in one transaction.
    pub fn create_workspace(
        &self,
        name: &str,
        owner_user_id: &Uuid,
    ) -> Result<(Workspace, WorkspaceMember)> {
        let workspace = Workspace {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind: WorkspaceKind::SoleTrader,
            created_at: Utc::now().to_rfc3339(),
        };
        let owner = WorkspaceMember {
            id: Uuid::new_v4(),
            user_id: *owner_user_id,
            workspace_id: workspace.id,
            role: MemberRole::Owner,
            is_owner: true,
            profit_split: 100.0,
            joined_at: workspace.created_at.clone(),
        };

        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO workspaces (id, name, kind, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                workspace.id.to_string(),
                workspace.name,
                workspace.kind.as_str(),
                workspace.created_at,
            ],
        )?;
        Self::insert_member(&tx, &owner)?;
        tx.commit().context("Failed to create workspace")?;

        info!("Created workspace {} ({})", workspace.name, workspace.id);

        Ok((workspace, owner))
    }

    /// Get workspace by id
    pub fn get_workspace(&self, workspace_id: &Uuid) -> Result<Option<Workspace>> {
        let conn = self.open()?;
        let mut stmt =
            conn.prepare("SELECT id, name, kind, created_at FROM workspaces WHERE id = ?1")?;

        let workspace = stmt
            .query_row(params![workspace_id.to_string()], Self::row_to_workspace)
            .optional()?;

        Ok(workspace)
    }

    /// All workspaces the user is a member of
    pub fn workspaces_for_user(&self, user_id: &Uuid) -> Result<Vec<Workspace>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT w.id, w.name, w.kind, w.created_at
             FROM workspaces w
             JOIN workspace_members m ON m.workspace_id = w.id
             WHERE m.user_id = ?1
             ORDER BY w.created_at",
        )?;

        let workspaces = stmt
            .query_map(params![user_id.to_string()], Self::row_to_workspace)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(workspaces)
    }

    fn row_to_workspace(row: &rusqlite::Row) -> rusqlite::Result<Workspace> {
        let id_str: String = row.get(0)?;
        let kind_str: String = row.get(2)?;
        Ok(Workspace {
            id: parse_uuid(0, &id_str)?,
            name: row.get(1)?,
            kind: WorkspaceKind::from_str(&kind_str).unwrap_or(WorkspaceKind::SoleTrader),
            created_at: row.get(3)?,
        })
    }

    // ===== Members =====

    const MEMBER_COLS: &'static str =
        "id, user_id, workspace_id, role, is_owner, profit_split, joined_at";

    fn row_to_member(row: &rusqlite::Row) -> rusqlite::Result<WorkspaceMember> {
        let id_str: String = row.get(0)?;
        let user_str: String = row.get(1)?;
        let workspace_str: String = row.get(2)?;
        let role_str: String = row.get(3)?;
        Ok(WorkspaceMember {
            id: parse_uuid(0, &id_str)?,
            user_id: parse_uuid(1, &user_str)?,
            workspace_id: parse_uuid(2, &workspace_str)?,
            role: MemberRole::from_str(&role_str).unwrap_or(MemberRole::Member),
            is_owner: row.get::<_, i64>(4)? != 0,
            profit_split: row.get(5)?,
            joined_at: row.get(6)?,
        })
    }

    fn insert_member(conn: &Connection, member: &WorkspaceMember) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO workspace_members (id, user_id, workspace_id, role, is_owner, profit_split, joined_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                member.id.to_string(),
                member.user_id.to_string(),
                member.workspace_id.to_string(),
                member.role.as_str(),
                member.is_owner as i64,
                member.profit_split,
                member.joined_at,
            ],
        )
    }

    /// Resolve a user's membership in a workspace: single-row lookup on the
    /// unique (user, workspace) pair
    pub fn membership(
        &self,
        user_id: &Uuid,
        workspace_id: &Uuid,
    ) -> Result<Option<WorkspaceMember>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM workspace_members WHERE user_id = ?1 AND workspace_id = ?2",
            Self::MEMBER_COLS
        ))?;

        let member = stmt
            .query_row(
                params![user_id.to_string(), workspace_id.to_string()],
                Self::row_to_member,
            )
            .optional()?;

        Ok(member)
    }

    /// All members of a workspace
    pub fn members(&self, workspace_id: &Uuid) -> Result<Vec<WorkspaceMember>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM workspace_members WHERE workspace_id = ?1 ORDER BY joined_at",
            Self::MEMBER_COLS
        ))?;

        let members = stmt
            .query_map(params![workspace_id.to_string()], Self::row_to_member)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(members)
    }

    /// Get one member row by id, scoped to its workspace
    pub fn get_member(
        &self,
        workspace_id: &Uuid,
        member_id: &Uuid,
    ) -> Result<Option<WorkspaceMember>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM workspace_members WHERE id = ?1 AND workspace_id = ?2",
            Self::MEMBER_COLS
        ))?;

        let member = stmt
            .query_row(
                params![member_id.to_string(), workspace_id.to_string()],
                Self::row_to_member,
            )
            .optional()?;

        Ok(member)
    }

    /// Remove a member. The owner member is protected unconditionally,
    /// whatever the caller's role.
    pub fn remove_member(&self, workspace_id: &Uuid, member_id: &Uuid) -> Result<RemoveOutcome> {
        let Some(member) = self.get_member(workspace_id, member_id)? else {
            return Ok(RemoveOutcome::NotFound);
        };

        if member.is_owner {
            return Ok(RemoveOutcome::OwnerProtected);
        }

        let conn = self.open()?;
        conn.execute(
            "DELETE FROM workspace_members WHERE id = ?1 AND workspace_id = ?2",
            params![member_id.to_string(), workspace_id.to_string()],
        )?;

        info!("Removed member {} from workspace {}", member_id, workspace_id);

        self.warn_if_splits_off(&conn, workspace_id)?;

        Ok(RemoveOutcome::Removed)
    }

    /// Update a member's profit split (0-100). Returns the updated row, or
    /// None if the member does not exist in this workspace.
    pub fn update_split(
        &self,
        workspace_id: &Uuid,
        member_id: &Uuid,
        profit_split: f64,
    ) -> Result<Option<WorkspaceMember>> {
        let conn = self.open()?;
        let updated = conn.execute(
            "UPDATE workspace_members SET profit_split = ?1 WHERE id = ?2 AND workspace_id = ?3",
            params![
                profit_split,
                member_id.to_string(),
                workspace_id.to_string()
            ],
        )?;

        if updated == 0 {
            return Ok(None);
        }

        self.warn_if_splits_off(&conn, workspace_id)?;

        self.get_member(workspace_id, member_id)
    }

    /// Splits summing to 100 is a soft invariant: partner transitions pass
    /// through off-100 states legitimately, so mutations are allowed and the
    /// gap is only logged.
    fn warn_if_splits_off(&self, conn: &Connection, workspace_id: &Uuid) -> Result<()> {
        let sum: f64 = conn.query_row(
            "SELECT COALESCE(SUM(profit_split), 0) FROM workspace_members WHERE workspace_id = ?1",
            params![workspace_id.to_string()],
            |row| row.get(0),
        )?;

        if (sum - 100.0).abs() > 0.01 {
            warn!(
                "Workspace {} profit splits sum to {:.2}%, not 100%",
                workspace_id, sum
            );
        }

        Ok(())
    }

    // ===== Invitations =====

    const INVITATION_COLS: &'static str =
        "id, workspace_id, email, invited_by, invitee_user_id, profit_split, token, status, expires_at, created_at";

    fn row_to_invitation(row: &rusqlite::Row) -> rusqlite::Result<Invitation> {
        let id_str: String = row.get(0)?;
        let workspace_str: String = row.get(1)?;
        let invited_by_str: String = row.get(3)?;
        let invitee_str: Option<String> = row.get(4)?;
        let status_str: String = row.get(7)?;
        Ok(Invitation {
            id: parse_uuid(0, &id_str)?,
            workspace_id: parse_uuid(1, &workspace_str)?,
            email: row.get(2)?,
            invited_by: parse_uuid(3, &invited_by_str)?,
            invitee_user_id: invitee_str.map(|s| parse_uuid(4, &s)).transpose()?,
            profit_split: row.get(5)?,
            token: row.get(6)?,
            status: InvitationStatus::from_str(&status_str).unwrap_or(InvitationStatus::Expired),
            expires_at: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn is_past_expiry(expires_at: &str) -> bool {
        DateTime::parse_from_rfc3339(expires_at)
            .map(|t| t.with_timezone(&Utc) <= Utc::now())
            .unwrap_or(true)
    }

    /// Lazy expiry: a PENDING invitation read past its expiry is flipped to
    /// EXPIRED at read time. Terminal states are never touched.
    fn apply_lazy_expiry(&self, conn: &Connection, mut inv: Invitation) -> Result<Invitation> {
        if inv.status == InvitationStatus::Pending && Self::is_past_expiry(&inv.expires_at) {
            conn.execute(
                "UPDATE invitations SET status = 'EXPIRED' WHERE id = ?1 AND status = 'PENDING'",
                params![inv.id.to_string()],
            )?;
            inv.status = InvitationStatus::Expired;
        }
        Ok(inv)
    }

    /// Create an invitation. At most one PENDING invitation may exist per
    /// (workspace, email); an expired leftover does not block a new one.
    pub fn create_invitation(
        &self,
        workspace_id: &Uuid,
        email: &str,
        invited_by: &Uuid,
        profit_split: f64,
    ) -> Result<InviteOutcome> {
        let email = email.trim().to_lowercase();
        let conn = self.open()?;

        let pending = conn
            .prepare(&format!(
                "SELECT {} FROM invitations WHERE workspace_id = ?1 AND email = ?2 AND status = 'PENDING'",
                Self::INVITATION_COLS
            ))?
            .query_row(
                params![workspace_id.to_string(), email],
                Self::row_to_invitation,
            )
            .optional()?;

        if let Some(existing) = pending {
            let existing = self.apply_lazy_expiry(&conn, existing)?;
            if existing.status == InvitationStatus::Pending {
                return Ok(InviteOutcome::DuplicatePending);
            }
        }

        let invitation = Invitation {
            id: Uuid::new_v4(),
            workspace_id: *workspace_id,
            email,
            invited_by: *invited_by,
            invitee_user_id: None,
            profit_split,
            token: Uuid::new_v4().to_string(),
            status: InvitationStatus::Pending,
            expires_at: (Utc::now() + chrono::Duration::days(self.invitation_ttl_days))
                .to_rfc3339(),
            created_at: Utc::now().to_rfc3339(),
        };

        conn.execute(
            "INSERT INTO invitations (id, workspace_id, email, invited_by, invitee_user_id, profit_split, token, status, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                invitation.id.to_string(),
                invitation.workspace_id.to_string(),
                invitation.email,
                invitation.invited_by.to_string(),
                Option::<String>::None,
                invitation.profit_split,
                invitation.token,
                invitation.status.as_str(),
                invitation.expires_at,
                invitation.created_at,
            ],
        )
        .context("Failed to insert invitation")?;

        info!(
            "Invitation created for {} to workspace {}",
            invitation.email, workspace_id
        );

        Ok(InviteOutcome::Created(invitation))
    }

    /// All invitations for a workspace, lazy expiry applied
    pub fn invitations_for_workspace(&self, workspace_id: &Uuid) -> Result<Vec<Invitation>> {
        let conn = self.open()?;
        let rows = conn
            .prepare(&format!(
                "SELECT {} FROM invitations WHERE workspace_id = ?1 ORDER BY created_at",
                Self::INVITATION_COLS
            ))?
            .query_map(params![workspace_id.to_string()], Self::row_to_invitation)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|inv| self.apply_lazy_expiry(&conn, inv))
            .collect()
    }

    /// Look up an invitation by its single-use token, lazy expiry applied
    pub fn get_invitation_by_token(&self, token: &str) -> Result<Option<Invitation>> {
        let conn = self.open()?;
        let inv = conn
            .prepare(&format!(
                "SELECT {} FROM invitations WHERE token = ?1",
                Self::INVITATION_COLS
            ))?
            .query_row(params![token], Self::row_to_invitation)
            .optional()?;

        match inv {
            Some(inv) => Ok(Some(self.apply_lazy_expiry(&conn, inv)?)),
            None => Ok(None),
        }
    }

    /// Cancel a PENDING invitation. Terminal states are immutable.
    pub fn cancel_invitation(
        &self,
        workspace_id: &Uuid,
        invitation_id: &Uuid,
    ) -> Result<CancelOutcome> {
        let conn = self.open()?;
        let inv = conn
            .prepare(&format!(
                "SELECT {} FROM invitations WHERE id = ?1 AND workspace_id = ?2",
                Self::INVITATION_COLS
            ))?
            .query_row(
                params![invitation_id.to_string(), workspace_id.to_string()],
                Self::row_to_invitation,
            )
            .optional()?;

        let Some(inv) = inv else {
            return Ok(CancelOutcome::NotFound);
        };
        let inv = self.apply_lazy_expiry(&conn, inv)?;

        if inv.status != InvitationStatus::Pending {
            return Ok(CancelOutcome::NotPending);
        }

        conn.execute(
            "UPDATE invitations SET status = 'CANCELLED' WHERE id = ?1",
            params![invitation_id.to_string()],
        )?;

        info!("Invitation {} cancelled", invitation_id);

        Ok(CancelOutcome::Cancelled)
    }

    /// Accept an invitation: membership insert, status flip, and the one-way
    /// SOLE_TRADER -> PARTNERSHIP promotion happen in a single transaction.
    pub fn accept_invitation(
        &self,
        token: &str,
        user_id: &Uuid,
        user_email: &str,
    ) -> Result<AcceptOutcome> {
        let Some(invitation) = self.get_invitation_by_token(token)? else {
            return Ok(AcceptOutcome::NotFound);
        };

        match invitation.status {
            InvitationStatus::Pending => {}
            InvitationStatus::Expired => return Ok(AcceptOutcome::Expired),
            _ => return Ok(AcceptOutcome::NotPending),
        }

        if invitation.email != user_email.to_lowercase() {
            return Ok(AcceptOutcome::EmailMismatch);
        }

        if self.membership(user_id, &invitation.workspace_id)?.is_some() {
            return Ok(AcceptOutcome::AlreadyMember);
        }

        let member = WorkspaceMember {
            id: Uuid::new_v4(),
            user_id: *user_id,
            workspace_id: invitation.workspace_id,
            role: MemberRole::Member,
            is_owner: false,
            profit_split: invitation.profit_split,
            joined_at: Utc::now().to_rfc3339(),
        };

        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        Self::insert_member(&tx, &member)?;
        tx.execute(
            "UPDATE invitations SET status = 'ACCEPTED', invitee_user_id = ?1 WHERE id = ?2",
            params![user_id.to_string(), invitation.id.to_string()],
        )?;

        // First accepted partner promotes the workspace; the transition is
        // one-way and never reversed by later removals.
        tx.execute(
            "UPDATE workspaces SET kind = 'PARTNERSHIP' WHERE id = ?1 AND kind = 'SOLE_TRADER'",
            params![invitation.workspace_id.to_string()],
        )?;

        tx.commit().context("Failed to accept invitation")?;

        info!(
            "Invitation {} accepted by {} (workspace {})",
            invitation.id, user_email, invitation.workspace_id
        );

        self.warn_if_splits_off(&conn, &invitation.workspace_id)?;

        let workspace = self
            .get_workspace(&invitation.workspace_id)?
            .context("Workspace vanished during acceptance")?;

        Ok(AcceptOutcome::Accepted(workspace, member))
    }
}
