//! Authentication Middleware
//! Mission: Protect API endpoints with access-token validation

use crate::auth::api::AuthState;
use crate::auth::models::CurrentUser;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

/// Cookie used as a fallback delivery channel for the access token
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Auth middleware that validates access tokens and resolves the user.
///
/// Token sources, in order: `Authorization: Bearer <token>` header, then the
/// access-token cookie. A token that verifies but whose user has since been
/// deleted is rejected; possession of a stale token is not identity.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = extract_token(&req, &jar).ok_or(AuthError::MissingToken)?;

    let claims = state
        .jwt_handler
        .validate_token(&token)
        .map_err(|_| AuthError::InvalidToken)?;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

    // The token outlives account deletion; re-resolve before trusting it.
    let user = state
        .user_store
        .get_user_by_id(&user_id)
        .map_err(|e| {
            tracing::error!("User lookup failed during authentication: {}", e);
            AuthError::StoreUnavailable
        })?
        .ok_or(AuthError::UserNotFound)?;

    req.extensions_mut().insert(CurrentUser {
        id: user.id,
        email: user.email,
        name: user.name,
    });

    Ok(next.run(req).await)
}

/// Optional auth middleware - never rejects; attaches an identity when a
/// valid token is present and resolvable, proceeds anonymously otherwise
pub async fn optional_auth_middleware(
    State(state): State<AuthState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_token(&req, &jar) {
        if let Ok(claims) = state.jwt_handler.validate_token(&token) {
            if let Ok(user_id) = Uuid::parse_str(&claims.sub) {
                if let Ok(Some(user)) = state.user_store.get_user_by_id(&user_id) {
                    req.extensions_mut().insert(CurrentUser {
                        id: user.id,
                        email: user.email,
                        name: user.name,
                    });
                }
            }
        }
    }

    next.run(req).await
}

fn extract_token(req: &Request, jar: &CookieJar) -> Option<String> {
    let from_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.to_string());

    from_header.or_else(|| jar.get(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string()))
}

/// Extract the authenticated identity from a request (use after auth middleware)
pub fn current_user(req: &Request) -> Option<&CurrentUser> {
    req.extensions().get::<CurrentUser>()
}

/// Auth error types
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    UserNotFound,
    StoreUnavailable,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            AuthError::UserNotFound => (StatusCode::UNAUTHORIZED, "User not found"),
            AuthError::StoreUnavailable => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, message).into_response()
    }
}
