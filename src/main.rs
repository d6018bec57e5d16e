//! LedgerDesk - Multi-tenant bookkeeping backend
//! Mission: Authentication, session lifecycle, and workspace authorization

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledgerdesk_backend::{
    api::{create_router, AppState},
    auth::{AuthState, JwtHandler, TokenLedger, UserStore},
    models::Config,
    workspace::{WorkspaceState, WorkspaceStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerdesk_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    info!("Starting LedgerDesk backend on port {}", config.port);

    let user_store = Arc::new(
        UserStore::new(&config.database_path).context("Failed to initialize user store")?,
    );
    let token_ledger = Arc::new(
        TokenLedger::new(&config.database_path, config.refresh_token_ttl_days)
            .context("Failed to initialize token ledger")?,
    );
    let workspace_store = Arc::new(
        WorkspaceStore::new(&config.database_path, config.invitation_ttl_days)
            .context("Failed to initialize workspace store")?,
    );
    let jwt_handler = Arc::new(JwtHandler::new(
        config.jwt_secret.clone(),
        config.access_token_ttl_minutes,
    ));

    // Daily reclamation sweep for expired refresh tokens. Validation already
    // applies expiry on read; losing this task costs storage, not correctness.
    {
        let ledger = token_ledger.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(24 * 3600));
            loop {
                interval.tick().await;
                if let Err(e) = ledger.delete_expired() {
                    tracing::warn!("Refresh token sweep failed: {}", e);
                }
            }
        });
    }

    let state = AppState {
        auth: AuthState::new(
            user_store.clone(),
            token_ledger,
            jwt_handler,
            config.production,
        ),
        workspace: WorkspaceState::new(workspace_store, user_store),
    };

    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
