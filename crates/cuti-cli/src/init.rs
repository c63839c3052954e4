//! # Init and Fresh Subcommands
//!
//! `init` is idempotent: migrations, default leave types and the `admin`
//! account are each created only when missing. `fresh` drops the schema
//! first.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use sqlx::PgPool;
use uuid::Uuid;

use cuti_api::auth::hash_password;
use cuti_api::state::AppState;
use cuti_core::{Role, User, UserStatus};

/// Password used for `admin` when none is supplied.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Username of the account `init` guarantees.
pub const ADMIN_USERNAME: &str = "admin";

/// Arguments for `cuti init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Password for the `admin` account if it has to be created.
    #[arg(long, env = "CUTI_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,
}

/// Arguments for `cuti fresh`.
#[derive(Args, Debug)]
pub struct FreshArgs {
    /// Confirm that every table, including accounts, is dropped.
    #[arg(long)]
    pub yes: bool,

    #[command(flatten)]
    pub init: InitArgs,
}

/// Execute `cuti init`.
pub async fn run_init(pool: &PgPool, args: &InitArgs) -> Result<u8> {
    crate::migrate(pool).await?;
    let state = crate::load_state(pool).await?;

    let seeded = state
        .seed_leave_types_if_empty()
        .await
        .context("failed to seed leave types")?;
    if seeded > 0 {
        println!("Seeded {seeded} default leave types.");
    } else {
        println!("Leave types already present ({}).", state.leave_types.len());
    }

    if ensure_admin(&state, args.admin_password.as_deref()).await? {
        println!("Created super admin '{ADMIN_USERNAME}'.");
    } else {
        println!("Account '{ADMIN_USERNAME}' already exists.");
    }

    println!("Database initialized.");
    Ok(0)
}

/// Execute `cuti fresh`.
pub async fn run_fresh(pool: &PgPool, args: &FreshArgs) -> Result<u8> {
    if !args.yes {
        bail!("`fresh` drops every table; re-run with --yes to confirm");
    }
    drop_all(pool).await?;
    println!("Dropped all tables.");
    run_init(pool, &args.init).await
}

/// Drop every application table and the migration history.
async fn drop_all(pool: &PgPool) -> Result<()> {
    sqlx::query(
        "DROP TABLE IF EXISTS leave_records, audit_logs, holidays, personnel, leave_types, users, \
         _sqlx_migrations CASCADE",
    )
    .execute(pool)
    .await
    .context("failed to drop tables")?;
    tracing::warn!("all tables dropped");
    Ok(())
}

/// Create the `admin` super admin unless an account with that name exists.
///
/// Returns whether an account was created.
pub async fn ensure_admin(state: &AppState, password: Option<&str>) -> Result<bool> {
    if state.user_by_username(ADMIN_USERNAME).is_some() {
        return Ok(false);
    }
    let password = match password {
        Some(p) if !p.is_empty() => p,
        _ => {
            tracing::warn!(
                "no admin password given, using the default '{DEFAULT_ADMIN_PASSWORD}'; change it after first login"
            );
            eprintln!(
                "WARNING: '{ADMIN_USERNAME}' uses the default password '{DEFAULT_ADMIN_PASSWORD}'. Change it after first login."
            );
            DEFAULT_ADMIN_PASSWORD
        }
    };

    let user = User {
        id: Uuid::new_v4(),
        username: ADMIN_USERNAME.into(),
        password_hash: hash_password(password, state.config.bcrypt_cost).await?,
        full_name: "Administrator".into(),
        email: None,
        role: Role::SuperAdmin,
        status: UserStatus::Active,
        last_active: None,
        created_at: Utc::now(),
    };
    if let Some(pool) = &state.db_pool {
        cuti_api::db::users::insert(pool, &user)
            .await
            .context("failed to insert admin account")?;
    }
    state.users.insert(user.id, user);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cuti_api::state::AppConfig;

    fn state() -> AppState {
        AppState::with_config(
            AppConfig {
                bcrypt_cost: 4,
                ..Default::default()
            },
            None,
        )
    }

    #[tokio::test]
    async fn admin_created_once() {
        let state = state();
        assert!(ensure_admin(&state, Some("s3cret-pass")).await.unwrap());
        assert!(!ensure_admin(&state, Some("other")).await.unwrap());
        let admin = state.user_by_username(ADMIN_USERNAME).unwrap();
        assert_eq!(admin.role, Role::SuperAdmin);
        assert!(cuti_api::auth::verify_password("s3cret-pass", &admin.password_hash)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn admin_falls_back_to_default_password() {
        let state = state();
        ensure_admin(&state, None).await.unwrap();
        let admin = state.user_by_username(ADMIN_USERNAME).unwrap();
        assert!(cuti_api::auth::verify_password(DEFAULT_ADMIN_PASSWORD, &admin.password_hash)
            .await
            .unwrap());
    }
}
