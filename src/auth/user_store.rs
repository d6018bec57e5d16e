//! User Storage
//! Mission: Securely store and manage user accounts with SQLite

use crate::auth::models::{AuthProvider, User};
use anyhow::{bail, Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

/// Map a mangled stored uuid to a column conversion error instead of
/// silently producing a wrong id.
fn parse_uuid(idx: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// User storage with SQLite backend
pub struct UserStore {
    db_path: String,
}

impl UserStore {
    /// Create a new user store and initialize database
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT,
                name TEXT NOT NULL,
                avatar_url TEXT,
                provider TEXT NOT NULL,
                provider_id TEXT,
                email_verified INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // One account per external identity; EMAIL rows have NULL provider_id
        // and stay out of the index.
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_provider
             ON users (provider, provider_id)
             WHERE provider_id IS NOT NULL",
            [],
        )?;

        Ok(())
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let id_str: String = row.get(0)?;
        let provider_str: String = row.get(5)?;
        Ok(User {
            id: parse_uuid(0, &id_str)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            name: row.get(3)?,
            avatar_url: row.get(4)?,
            provider: AuthProvider::from_str(&provider_str).unwrap_or(AuthProvider::Email),
            provider_id: row.get(6)?,
            email_verified: row.get::<_, i64>(7)? != 0,
            created_at: row.get(8)?,
        })
    }

    const SELECT_COLS: &'static str =
        "id, email, password_hash, name, avatar_url, provider, provider_id, email_verified, created_at";

    /// Get user by email (lower-cased before lookup)
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users WHERE email = ?1",
            Self::SELECT_COLS
        ))?;

        let user = stmt
            .query_row(params![email.to_lowercase()], Self::row_to_user)
            .optional()?;

        Ok(user)
    }

    /// Get user by id
    pub fn get_user_by_id(&self, user_id: &Uuid) -> Result<Option<User>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users WHERE id = ?1",
            Self::SELECT_COLS
        ))?;

        let user = stmt
            .query_row(params![user_id.to_string()], Self::row_to_user)
            .optional()?;

        Ok(user)
    }

    /// Get user by external provider identity
    pub fn get_user_by_provider(
        &self,
        provider: &AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users WHERE provider = ?1 AND provider_id = ?2",
            Self::SELECT_COLS
        ))?;

        let user = stmt
            .query_row(params![provider.as_str(), provider_id], Self::row_to_user)
            .optional()?;

        Ok(user)
    }

    /// Verify email and password; false for unknown users, wrong passwords,
    /// and provider-only accounts without a password hash
    pub fn verify_password(&self, email: &str, password: &str) -> Result<bool> {
        match self.get_user_by_email(email)? {
            Some(user) => match user.password_hash {
                Some(ref stored) => {
                    let valid = verify(password, stored).context("Failed to verify password")?;
                    Ok(valid)
                }
                None => Ok(false),
            },
            None => Ok(false),
        }
    }

    /// Create a new email/password user
    pub fn create_user(&self, email: &str, password: &str, name: &str) -> Result<User> {
        let password_hash = hash(password, DEFAULT_COST).context("Failed to hash password")?;

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            password_hash: Some(password_hash),
            name: name.to_string(),
            avatar_url: None,
            provider: AuthProvider::Email,
            provider_id: None,
            email_verified: false,
            created_at: Utc::now().to_rfc3339(),
        };

        self.insert_user(&user)?;

        info!("Created user: {} ({})", user.email, user.id);

        Ok(user)
    }

    /// Create a user from an external provider identity (no password)
    pub fn create_provider_user(
        &self,
        email: &str,
        name: &str,
        avatar_url: Option<&str>,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            password_hash: None,
            name: name.to_string(),
            avatar_url: avatar_url.map(|s| s.to_string()),
            provider,
            provider_id: Some(provider_id.to_string()),
            email_verified: true,
            created_at: Utc::now().to_rfc3339(),
        };

        self.insert_user(&user)?;

        info!(
            "Created {} user: {} ({})",
            user.provider.as_str(),
            user.email,
            user.id
        );

        Ok(user)
    }

    fn insert_user(&self, user: &User) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "INSERT INTO users (id, email, password_hash, name, avatar_url, provider, provider_id, email_verified, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                user.id.to_string(),
                user.email,
                user.password_hash,
                user.name,
                user.avatar_url,
                user.provider.as_str(),
                user.provider_id,
                user.email_verified as i64,
                user.created_at,
            ],
        )
        .context("Failed to insert user")?;
        Ok(())
    }

    /// Link an external provider to an existing email account.
    ///
    /// Backfills provider fields once; an account already linked to a
    /// different provider is never overwritten.
    pub fn link_provider(
        &self,
        user_id: &Uuid,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<User> {
        let user = self
            .get_user_by_id(user_id)?
            .context("User not found")?;

        match user.provider {
            AuthProvider::Email => {}
            ref existing if *existing == provider => {
                // Already linked to this provider; nothing to do.
                return Ok(user);
            }
            ref existing => {
                bail!(
                    "Account already linked to {}, refusing to relink",
                    existing.as_str()
                );
            }
        }

        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "UPDATE users SET provider = ?1, provider_id = ?2, email_verified = 1 WHERE id = ?3",
            params![provider.as_str(), provider_id, user_id.to_string()],
        )
        .context("Failed to link provider")?;

        info!("Linked {} to user {}", provider.as_str(), user_id);

        self.get_user_by_id(user_id)?.context("User not found")
    }

    /// Delete a user by ID
    pub fn delete_user(&self, user_id: &Uuid) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        let rows_affected = conn.execute(
            "DELETE FROM users WHERE id = ?1",
            params![user_id.to_string()],
        )?;

        if rows_affected == 0 {
            bail!("User not found");
        }

        info!("Deleted user: {}", user_id);
        Ok(())
    }
}
