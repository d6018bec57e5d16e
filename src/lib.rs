//! LedgerDesk Backend Library
//!
//! Auth/session core (token issuance, rotation, revocation) and
//! workspace-scoped authorization for the LedgerDesk bookkeeping app.
//! Exposed as a library so integration tests can drive the router
//! in-process.

pub mod api;
pub mod auth;
pub mod middleware;
pub mod models;
pub mod workspace;
