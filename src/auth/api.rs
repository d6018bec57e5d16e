//! Authentication API Endpoints
//! Mission: Provide registration, login, refresh, and logout endpoints

use crate::auth::{
    jwt::JwtHandler,
    models::{
        CurrentUser, LoginRequest, RefreshRequest, RegisterRequest, TokenResponse, UserResponse,
    },
    token_ledger::TokenLedger,
    user_store::UserStore,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Cookie carrying the refresh token between browser sessions
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub user_store: Arc<UserStore>,
    pub token_ledger: Arc<TokenLedger>,
    pub jwt_handler: Arc<JwtHandler>,
    pub production: bool,
}

impl AuthState {
    pub fn new(
        user_store: Arc<UserStore>,
        token_ledger: Arc<TokenLedger>,
        jwt_handler: Arc<JwtHandler>,
        production: bool,
    ) -> Self {
        Self {
            user_store,
            token_ledger,
            jwt_handler,
            production,
        }
    }

    /// Mint an access + refresh pair for a user
    fn issue_pair(&self, user_id: Uuid, email: &str) -> Result<(String, String, usize), AuthApiError> {
        let (access_token, expires_in) = self
            .jwt_handler
            .generate_token(user_id, email)
            .map_err(|e| {
                error!("Access token generation failed: {}", e);
                AuthApiError::InternalError
            })?;

        let refresh = self.token_ledger.issue(&user_id).map_err(|e| {
            error!("Refresh token persistence failed: {}", e);
            AuthApiError::InternalError
        })?;

        Ok((access_token, refresh.token, expires_in))
    }

    fn refresh_cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build((REFRESH_TOKEN_COOKIE, token.to_string()))
            .path("/api/auth")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.production)
            .build()
    }

    fn clear_refresh_cookie(&self) -> Cookie<'static> {
        let mut cookie = self.refresh_cookie("");
        cookie.make_removal();
        cookie
    }
}

/// Register endpoint - POST /api/auth/register
pub async fn register(
    State(state): State<AuthState>,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<TokenResponse>), AuthApiError> {
    let email = payload.email.trim().to_lowercase();

    if email.is_empty() || !email.contains('@') {
        return Err(AuthApiError::InvalidEmail);
    }
    if payload.password.len() < 8 {
        return Err(AuthApiError::WeakPassword);
    }
    if payload.name.trim().is_empty() {
        return Err(AuthApiError::MissingName);
    }

    let existing = state.user_store.get_user_by_email(&email).map_err(|e| {
        error!("User lookup failed: {}", e);
        AuthApiError::InternalError
    })?;
    if existing.is_some() {
        return Err(AuthApiError::EmailAlreadyRegistered);
    }

    let user = state
        .user_store
        .create_user(&email, &payload.password, payload.name.trim())
        .map_err(|e| {
            error!("User creation failed: {}", e);
            AuthApiError::InternalError
        })?;

    let (access_token, refresh_token, expires_in) = state.issue_pair(user.id, &user.email)?;

    info!("Registered user: {}", user.email);

    let jar = jar.add(state.refresh_cookie(&refresh_token));
    Ok((
        StatusCode::CREATED,
        jar,
        Json(TokenResponse {
            access_token,
            refresh_token,
            expires_in,
            user: UserResponse::from_user(&user),
        }),
    ))
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<TokenResponse>), AuthApiError> {
    let email = payload.email.trim().to_lowercase();

    let valid = state
        .user_store
        .verify_password(&email, &payload.password)
        .map_err(|e| {
            error!("Password verification failed: {}", e);
            AuthApiError::InternalError
        })?;

    if !valid {
        warn!("Failed login attempt: {}", email);
        return Err(AuthApiError::InvalidCredentials);
    }

    let user = state
        .user_store
        .get_user_by_email(&email)
        .map_err(|e| {
            error!("User lookup failed: {}", e);
            AuthApiError::InternalError
        })?
        .ok_or(AuthApiError::InvalidCredentials)?;

    let (access_token, refresh_token, expires_in) = state.issue_pair(user.id, &user.email)?;

    info!("Login successful: {}", user.email);

    let jar = jar.add(state.refresh_cookie(&refresh_token));
    Ok((
        jar,
        Json(TokenResponse {
            access_token,
            refresh_token,
            expires_in,
            user: UserResponse::from_user(&user),
        }),
    ))
}

/// Refresh endpoint - POST /api/auth/refresh
///
/// Rotation: the presented token is consumed (deleted) and a fresh pair is
/// issued. Consumption is a single atomic check-and-delete, so concurrent
/// refreshes racing on one token have exactly one winner; the loser gets an
/// invalid-token rejection and must log in again. A crash after consumption
/// but before issuance logs the caller out rather than leaving two live
/// tokens.
pub async fn refresh(
    State(state): State<AuthState>,
    jar: CookieJar,
    payload: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<TokenResponse>), AuthApiError> {
    let presented = presented_refresh_token(&jar, payload.as_deref())
        .ok_or(AuthApiError::MissingRefreshToken)?;

    let user_id = state
        .token_ledger
        .consume(&presented)
        .map_err(|e| {
            error!("Refresh token consumption failed: {}", e);
            AuthApiError::InternalError
        })?
        .ok_or(AuthApiError::InvalidRefreshToken)?;

    let user = state
        .user_store
        .get_user_by_id(&user_id)
        .map_err(|e| {
            error!("User lookup failed: {}", e);
            AuthApiError::InternalError
        })?
        .ok_or(AuthApiError::InvalidRefreshToken)?;

    let (access_token, refresh_token, expires_in) = state.issue_pair(user.id, &user.email)?;

    let jar = jar.add(state.refresh_cookie(&refresh_token));
    Ok((
        jar,
        Json(TokenResponse {
            access_token,
            refresh_token,
            expires_in,
            user: UserResponse::from_user(&user),
        }),
    ))
}

/// Logout endpoint - POST /api/auth/logout
///
/// Revokes the presented refresh token. Idempotent: logging out an already
/// dead session succeeds. Outstanding access tokens keep working until
/// their own expiry; access and refresh lifetimes are decoupled.
pub async fn logout(
    State(state): State<AuthState>,
    jar: CookieJar,
    payload: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, StatusCode), AuthApiError> {
    if let Some(token) = presented_refresh_token(&jar, payload.as_deref()) {
        state.token_ledger.revoke(&token).map_err(|e| {
            error!("Refresh token revocation failed: {}", e);
            AuthApiError::InternalError
        })?;
    }

    let jar = jar.add(state.clear_refresh_cookie());
    Ok((jar, StatusCode::NO_CONTENT))
}

/// Logout-all endpoint - POST /api/auth/logout-all (authenticated)
///
/// Revokes every refresh token for the caller, across all devices.
pub async fn logout_all(
    State(state): State<AuthState>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), AuthApiError> {
    let revoked = state.token_ledger.revoke_all(&user.id).map_err(|e| {
        error!("Bulk revocation failed: {}", e);
        AuthApiError::InternalError
    })?;

    info!("Logout-all for {}: {} session(s) revoked", user.email, revoked);

    let jar = jar.add(state.clear_refresh_cookie());
    Ok((jar, StatusCode::NO_CONTENT))
}

/// Current user endpoint - GET /api/auth/me (authenticated)
pub async fn me(
    State(state): State<AuthState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<UserResponse>, AuthApiError> {
    let user = state
        .user_store
        .get_user_by_id(&user.id)
        .map_err(|e| {
            error!("User lookup failed: {}", e);
            AuthApiError::InternalError
        })?
        .ok_or(AuthApiError::Unauthorized)?;

    Ok(Json(UserResponse::from_user(&user)))
}

fn presented_refresh_token(jar: &CookieJar, payload: Option<&RefreshRequest>) -> Option<String> {
    jar.get(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| payload.and_then(|p| p.refresh_token.clone()))
}

/// Auth API errors
#[derive(Debug)]
pub enum AuthApiError {
    InvalidCredentials,
    Unauthorized,
    InvalidEmail,
    WeakPassword,
    MissingName,
    EmailAlreadyRegistered,
    MissingRefreshToken,
    InvalidRefreshToken,
    InternalError,
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthApiError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid email or password")
            }
            AuthApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthApiError::InvalidEmail => (StatusCode::BAD_REQUEST, "A valid email is required"),
            AuthApiError::WeakPassword => (
                StatusCode::BAD_REQUEST,
                "Password must be at least 8 characters",
            ),
            AuthApiError::MissingName => (StatusCode::BAD_REQUEST, "Name is required"),
            AuthApiError::EmailAlreadyRegistered => {
                (StatusCode::CONFLICT, "Email already registered")
            }
            // Ledger-level signals (absent, consumed, expired) are merged
            // into one generic rejection at the response boundary.
            AuthApiError::MissingRefreshToken => {
                (StatusCode::UNAUTHORIZED, "Refresh token required")
            }
            AuthApiError::InvalidRefreshToken => {
                (StatusCode::UNAUTHORIZED, "Invalid refresh token")
            }
            AuthApiError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_api_error_responses() {
        let invalid_creds = AuthApiError::InvalidCredentials.into_response();
        assert_eq!(invalid_creds.status(), StatusCode::UNAUTHORIZED);

        let conflict = AuthApiError::EmailAlreadyRegistered.into_response();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let weak = AuthApiError::WeakPassword.into_response();
        assert_eq!(weak.status(), StatusCode::BAD_REQUEST);

        let stale = AuthApiError::InvalidRefreshToken.into_response();
        assert_eq!(stale.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_presented_refresh_token_prefers_cookie() {
        let jar = CookieJar::new().add(Cookie::new(REFRESH_TOKEN_COOKIE, "cookie-token"));
        let body = RefreshRequest {
            refresh_token: Some("body-token".to_string()),
        };

        assert_eq!(
            presented_refresh_token(&jar, Some(&body)).as_deref(),
            Some("cookie-token")
        );
    }

    #[test]
    fn test_presented_refresh_token_body_fallback() {
        let jar = CookieJar::new();
        let body = RefreshRequest {
            refresh_token: Some("body-token".to_string()),
        };

        assert_eq!(
            presented_refresh_token(&jar, Some(&body)).as_deref(),
            Some("body-token")
        );
        assert!(presented_refresh_token(&jar, None).is_none());
    }
}
