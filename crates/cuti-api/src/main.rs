//! # cuti-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for the leave tracker.
//! Binds to configurable port (default 8080).

use std::net::SocketAddr;

use chrono::Utc;
use cuti_api::auth::hash_password;
use cuti_api::state::{AppConfig, AppState};
use cuti_core::{Role, User, UserStatus};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is normal outside development.
    let dotenv = dotenvy::dotenv();

    // Initialize structured tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }

    // Build configuration from environment.
    let config = AppConfig::from_env();
    tracing::info!(?config, "configuration loaded");
    let port = config.port;

    // Database pool is optional; without it the service runs in memory only.
    let db_pool = cuti_api::db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })?;

    let state = AppState::with_config(config, db_pool);

    // Hydrate in-memory stores from database (if connected).
    state.hydrate_from_db().await.map_err(|e| {
        tracing::error!("Database hydration failed: {e}");
        e
    })?;
    state.seed_leave_types_if_empty().await?;
    bootstrap_admin(&state).await?;

    tokio::fs::create_dir_all(state.evidence.dir()).await?;
    cuti_api::housekeeping::spawn_audit_purge(state.clone());

    let app = cuti_api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("E-Cuti API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Create the first super admin when `BOOTSTRAP_ADMIN_PASSWORD` is set and
/// no account exists yet.
async fn bootstrap_admin(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    let Some(password) = state.config.bootstrap_admin_password.clone() else {
        return Ok(());
    };
    if !state.users.is_empty() {
        return Ok(());
    }
    let user = User {
        id: Uuid::new_v4(),
        username: "admin".into(),
        password_hash: hash_password(&password, state.config.bcrypt_cost).await?,
        full_name: "Administrator".into(),
        email: None,
        role: Role::SuperAdmin,
        status: UserStatus::Active,
        last_active: None,
        created_at: Utc::now(),
    };
    if let Some(pool) = &state.db_pool {
        cuti_api::db::users::insert(pool, &user).await?;
    }
    state.users.insert(user.id, user);
    tracing::warn!("Created bootstrap super admin 'admin'; change its password after first login");
    Ok(())
}
