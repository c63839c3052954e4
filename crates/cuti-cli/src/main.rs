//! # cuti CLI entry point
//!
//! Parses command-line arguments, connects to Postgres and dispatches to
//! subcommand handlers.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cuti_cli::check::run_check;
use cuti_cli::init::{run_fresh, run_init, FreshArgs, InitArgs};
use cuti_cli::reset::{run_reset, ResetArgs};
use cuti_cli::seed::{run_seed, SeedArgs};

/// E-Cuti database management.
///
/// Applies migrations, creates default data, seeds demo records and
/// inspects the leave tracker database.
#[derive(Parser, Debug)]
#[command(name = "cuti", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Postgres connection URL.
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply migrations, seed default leave types and create `admin`.
    Init(InitArgs),

    /// Drop every table, then run `init`.
    Fresh(FreshArgs),

    /// Add demo personnel and leave records.
    Seed(SeedArgs),

    /// Delete leave records, audit logs and personnel.
    Reset(ResetArgs),

    /// Print table counts, accounts and leave types.
    Check,
}

fn main() -> ExitCode {
    // A missing .env file is normal outside development.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let url = cli
        .database_url
        .context("DATABASE_URL is not set; pass --database-url or set it in .env")?;
    let pool = cuti_cli::connect(&url).await?;

    let code = match cli.command {
        Commands::Init(args) => run_init(&pool, &args).await,
        Commands::Fresh(args) => run_fresh(&pool, &args).await,
        Commands::Seed(args) => run_seed(&pool, &args).await,
        Commands::Reset(args) => run_reset(&pool, &args).await,
        Commands::Check => run_check(&pool).await,
    };
    pool.close().await;
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "postgres://localhost/cuti";

    #[test]
    fn parses_init_with_password() {
        let cli = Cli::try_parse_from([
            "cuti",
            "--database-url",
            URL,
            "init",
            "--admin-password",
            "s3cret",
        ])
        .unwrap();
        assert_eq!(cli.database_url.as_deref(), Some(URL));
        match cli.command {
            Commands::Init(args) => assert_eq!(args.admin_password.as_deref(), Some("s3cret")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn verbosity_counts_and_is_global() {
        let cli = Cli::try_parse_from(["cuti", "check", "-vv", "--database-url", URL]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn seed_defaults() {
        let cli = Cli::try_parse_from(["cuti", "--database-url", URL, "seed"]).unwrap();
        let Commands::Seed(args) = cli.command else {
            panic!("expected seed");
        };
        assert_eq!(args.per_gender, 10);
        assert_eq!(args.leaves_per_person, 3);
        assert_eq!(args.seed, 2024);
        assert!(args.year.is_none());
    }

    #[test]
    fn fresh_and_reset_take_confirmation() {
        let cli = Cli::try_parse_from(["cuti", "--database-url", URL, "fresh", "--yes"]).unwrap();
        assert!(matches!(cli.command, Commands::Fresh(FreshArgs { yes: true, .. })));

        let cli = Cli::try_parse_from(["cuti", "--database-url", URL, "reset"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Reset(ResetArgs { yes: false, purge_evidence: false })
        ));
    }

    #[test]
    fn unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["cuti", "migrate"]).is_err());
    }
}
