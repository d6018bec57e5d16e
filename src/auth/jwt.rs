//! JWT Token Handler
//! Mission: Generate and validate access tokens securely

use crate::auth::models::Claims;
use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;
use uuid::Uuid;

/// JWT Handler for access token operations
///
/// The signing secret is injected at construction; nothing here reads
/// ambient process state, so tests can run with distinct secrets.
pub struct JwtHandler {
    secret: String,
    ttl_minutes: i64,
}

impl JwtHandler {
    /// Create a new JWT handler with secret key and access-token lifetime
    pub fn new(secret: String, ttl_minutes: i64) -> Self {
        Self {
            secret,
            ttl_minutes,
        }
    }

    /// Generate a signed access token for a user, returning the token and
    /// its lifetime in seconds
    pub fn generate_token(&self, user_id: Uuid, email: &str) -> Result<(String, usize)> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(chrono::Duration::minutes(self.ttl_minutes))
            .context("Invalid timestamp")?
            .timestamp() as usize;

        let expires_in = (self.ttl_minutes * 60) as usize;

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: now.timestamp() as usize,
            exp: expiration,
        };

        debug!(
            "Generating access token for {} ({}), expires in {}m",
            email, user_id, self.ttl_minutes
        );

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("Failed to generate access token")?;

        Ok((token, expires_in))
    }

    /// Validate an access token and extract claims.
    ///
    /// Malformed, expired, and wrong-signature tokens all collapse into the
    /// same error; callers never learn which check failed.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .context("Invalid or expired token")?;

        debug!("Validated access token for {}", decoded.claims.email);

        Ok(decoded.claims)
    }
}
