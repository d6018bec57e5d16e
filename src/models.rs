//! Application Configuration
//! Mission: Load environment-driven settings with sane development defaults

use anyhow::bail;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub invitation_ttl_days: i64,
    pub production: bool,
}

/// Insecure development fallback; refused in production.
const DEV_JWT_SECRET: &str = "dev-secret-change-me";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./ledgerdesk.db".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let jwt_secret =
            std::env::var("JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.to_string());

        let access_token_ttl_minutes = std::env::var("ACCESS_TOKEN_TTL_MINUTES")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .unwrap_or(15);

        let refresh_token_ttl_days = std::env::var("REFRESH_TOKEN_TTL_DAYS")
            .unwrap_or_else(|_| "7".to_string())
            .parse()
            .unwrap_or(7);

        let invitation_ttl_days = std::env::var("INVITATION_TTL_DAYS")
            .unwrap_or_else(|_| "7".to_string())
            .parse()
            .unwrap_or(7);

        let production = std::env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        if production && jwt_secret == DEV_JWT_SECRET {
            bail!("JWT_SECRET must be set when APP_ENV=production");
        }

        Ok(Self {
            database_path,
            port,
            jwt_secret,
            access_token_ttl_minutes,
            refresh_token_ttl_days,
            invitation_ttl_days,
            production,
        })
    }
}

