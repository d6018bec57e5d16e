//! Refresh Token Ledger
//! Mission: Track which refresh tokens are currently valid

use crate::auth::models::RefreshToken;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

fn parse_uuid(idx: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Authoritative store of issued refresh tokens, SQLite-backed.
///
/// Validity is checked lazily: an expired row is deleted the first time it
/// is read. A periodic `delete_expired` sweep is storage reclamation only;
/// correctness never depends on it running.
pub struct TokenLedger {
    db_path: String,
    ttl_days: i64,
}

impl TokenLedger {
    /// Create a new ledger and initialize database
    pub fn new(db_path: &str, ttl_days: i64) -> Result<Self> {
        let ledger = Self {
            db_path: db_path.to_string(),
            ttl_days,
        };
        ledger.init_db()?;
        Ok(ledger)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS refresh_tokens (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user
             ON refresh_tokens (user_id)",
            [],
        )?;

        Ok(())
    }

    /// Generate an opaque token string: 32 random bytes, hex-encoded
    fn generate_token() -> String {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Issue a new refresh token for a user and persist it
    pub fn issue(&self, user_id: &Uuid) -> Result<RefreshToken> {
        let token = RefreshToken {
            token: Self::generate_token(),
            user_id: *user_id,
            expires_at: (Utc::now() + chrono::Duration::days(self.ttl_days)).to_rfc3339(),
        };

        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![token.token, token.user_id.to_string(), token.expires_at],
        )
        .context("Failed to persist refresh token")?;

        debug!("Issued refresh token for user {}", user_id);

        Ok(token)
    }

    /// Look up a token row without applying expiry
    pub fn lookup(&self, token: &str) -> Result<Option<RefreshToken>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT token, user_id, expires_at FROM refresh_tokens WHERE token = ?1",
        )?;

        let row = stmt
            .query_row(params![token], |row| {
                let user_str: String = row.get(1)?;
                Ok(RefreshToken {
                    token: row.get(0)?,
                    user_id: parse_uuid(1, &user_str)?,
                    expires_at: row.get(2)?,
                })
            })
            .optional()?;

        Ok(row)
    }

    /// Atomically consume a token for rotation: the row is checked and
    /// deleted in one statement, so of two racing consumers exactly one
    /// gets the user id and the other sees an invalid token. An expired
    /// row is deleted too but reported invalid (lazy purge).
    pub fn consume(&self, token: &str) -> Result<Option<Uuid>> {
        let conn = Connection::open(&self.db_path)?;

        let row = conn
            .query_row(
                "DELETE FROM refresh_tokens WHERE token = ?1 RETURNING user_id, expires_at",
                params![token],
                |row| {
                    let user_str: String = row.get(0)?;
                    let expires_at: String = row.get(1)?;
                    Ok((parse_uuid(0, &user_str)?, expires_at))
                },
            )
            .optional()?;

        let Some((user_id, expires_at)) = row else {
            return Ok(None);
        };

        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .context("Malformed expiry in ledger")?
            .with_timezone(&Utc);

        if expires_at <= Utc::now() {
            debug!("Refresh token for user {} expired, purged", user_id);
            return Ok(None);
        }

        debug!("Consumed refresh token for user {}", user_id);

        Ok(Some(user_id))
    }

    /// Validate a token: absent or expired is invalid; expired rows are
    /// deleted on read
    pub fn validate(&self, token: &str) -> Result<Option<Uuid>> {
        let Some(row) = self.lookup(token)? else {
            return Ok(None);
        };

        let expires_at = DateTime::parse_from_rfc3339(&row.expires_at)
            .context("Malformed expiry in ledger")?
            .with_timezone(&Utc);

        if expires_at <= Utc::now() {
            self.revoke(token)?;
            debug!("Refresh token for user {} expired, purged", row.user_id);
            return Ok(None);
        }

        Ok(Some(row.user_id))
    }

    /// Delete a single token; no-op if absent
    pub fn revoke(&self, token: &str) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "DELETE FROM refresh_tokens WHERE token = ?1",
            params![token],
        )?;
        Ok(())
    }

    /// Delete every token for a user. Tokens issued before this call are
    /// permanently unusable afterwards (logout on all devices).
    pub fn revoke_all(&self, user_id: &Uuid) -> Result<usize> {
        let conn = Connection::open(&self.db_path)?;
        let deleted = conn.execute(
            "DELETE FROM refresh_tokens WHERE user_id = ?1",
            params![user_id.to_string()],
        )?;

        info!("Revoked {} refresh token(s) for user {}", deleted, user_id);

        Ok(deleted)
    }

    /// Sweep expired rows. Pure storage reclamation; validation already
    /// handles expiry on its own.
    pub fn delete_expired(&self) -> Result<usize> {
        let conn = Connection::open(&self.db_path)?;
        let deleted = conn.execute(
            "DELETE FROM refresh_tokens WHERE expires_at <= ?1",
            params![Utc::now().to_rfc3339()],
        )?;

        if deleted > 0 {
            debug!("Swept {} expired refresh token(s)", deleted);
        }

        Ok(deleted)
    }
}
