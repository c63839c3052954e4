//! # Database Persistence Layer
//!
//! Postgres persistence for the leave tracker via SQLx.
//!
//! ## Architecture
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, every
//! mutation is written to PostgreSQL before it is applied to the in-memory
//! stores, and the stores are hydrated from the tables on start-up. When
//! absent, the API runs in in-memory-only mode (development and tests).
//!
//! Each submodule is a set of free functions over `&PgPool` (or an open
//! transaction) for one table, with a private `*Row` type for mapping.

pub mod audit;
pub mod holidays;
pub mod leave_records;
pub mod leave_types;
pub mod personnel;
pub mod users;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set, running in in-memory only mode. \
                 State will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Parse a text column that holds a closed enum, mapping failures to a
/// decode error so hydration reports the offending column.
pub(crate) fn decode_enum<T: std::str::FromStr>(
    column: &str,
    raw: &str,
) -> Result<T, sqlx::Error> {
    raw.parse().map_err(|_| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unexpected value '{raw}'").into(),
    })
}
