//! Authentication Module
//! Mission: Secure API access with JWT access tokens and rotated refresh tokens

pub mod api;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod token_ledger;
pub mod user_store;

pub use api::AuthState;
pub use jwt::JwtHandler;
pub use middleware::auth_middleware;
pub use token_ledger::TokenLedger;
pub use user_store::UserStore;
