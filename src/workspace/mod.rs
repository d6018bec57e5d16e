//! Workspace Module
//! Mission: Multi-tenant workspaces with role-gated membership and invitations

pub mod api;
pub mod middleware;
pub mod models;
pub mod store;

pub use api::WorkspaceState;
pub use middleware::require_workspace;
pub use store::WorkspaceStore;
