//! # cuti-cli — Database Management for the Leave Tracker
//!
//! Operator tooling that runs against the same Postgres schema as
//! `cuti-api`, reusing its persistence functions and hydrated state.
//!
//! ## Subcommands
//!
//! - `init` — apply migrations, seed default leave types, create `admin`
//! - `fresh` — drop every table and run `init` again
//! - `seed` — add demo personnel and quota-respecting leave records
//! - `reset` — clear leave records, audit logs and personnel
//! - `check` — print table counts, accounts and leave types

pub mod check;
pub mod init;
pub mod reset;
pub mod seed;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

use cuti_api::state::{AppConfig, AppState};

/// Connect to Postgres without touching the schema.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .context("failed to connect to the database")
}

/// Apply pending migrations from the API crate.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../cuti-api/migrations")
        .run(pool)
        .await
        .context("failed to apply migrations")?;
    tracing::info!("migrations applied");
    Ok(())
}

/// Application state hydrated from `pool`, so writes go through the same
/// paths the API uses.
///
/// Only the settings the CLI touches are read from the environment.
pub async fn load_state(pool: &PgPool) -> Result<AppState> {
    let defaults = AppConfig::default();
    let config = AppConfig {
        upload_dir: std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| defaults.upload_dir.clone()),
        bcrypt_cost: std::env::var("BCRYPT_COST")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.bcrypt_cost),
        ..defaults
    };
    let state = AppState::with_config(config, Some(pool.clone()));
    state
        .hydrate_from_db()
        .await
        .map_err(|e| anyhow!("failed to load existing data: {e}"))?;
    Ok(state)
}
