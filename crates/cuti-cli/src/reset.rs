//! # Reset Subcommand
//!
//! Clears operational data: leave records, audit logs and personnel.
//! Accounts, leave types and holidays stay.

use anyhow::{bail, Context, Result};
use clap::Args;
use sqlx::PgPool;

use cuti_api::evidence::EvidenceStore;

/// Arguments for `cuti reset`.
#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Confirm deletion.
    #[arg(long)]
    pub yes: bool,

    /// Also delete the evidence files the removed records point at.
    #[arg(long)]
    pub purge_evidence: bool,
}

/// Row counts removed by a reset.
#[derive(Debug)]
pub struct ResetCounts {
    pub leave_records: u64,
    pub audit_logs: u64,
    pub personnel: u64,
}

/// Execute `cuti reset`.
pub async fn run_reset(pool: &PgPool, args: &ResetArgs) -> Result<u8> {
    if !args.yes {
        bail!("`reset` deletes all leave records, audit logs and personnel; re-run with --yes");
    }

    let evidence: Vec<String> = if args.purge_evidence {
        sqlx::query_scalar(
            "SELECT evidence_path FROM leave_records WHERE evidence_path IS NOT NULL",
        )
        .fetch_all(pool)
        .await
        .context("failed to list evidence files")?
    } else {
        Vec::new()
    };

    let counts = clear_tables(pool).await?;
    println!(
        "Removed {} leave records, {} audit entries and {} personnel.",
        counts.leave_records, counts.audit_logs, counts.personnel
    );

    if !evidence.is_empty() {
        let state = crate::load_state(pool).await?;
        let store: &EvidenceStore = &state.evidence;
        for name in &evidence {
            store.remove(name).await;
        }
        println!("Removed {} evidence files from {}.", evidence.len(), store.dir().display());
    }
    Ok(0)
}

/// Delete in dependency order inside one transaction.
async fn clear_tables(pool: &PgPool) -> Result<ResetCounts> {
    let mut tx = pool.begin().await?;
    let leave_records = sqlx::query("DELETE FROM leave_records")
        .execute(&mut *tx)
        .await
        .context("failed to delete leave records")?
        .rows_affected();
    let audit_logs = sqlx::query("DELETE FROM audit_logs")
        .execute(&mut *tx)
        .await
        .context("failed to delete audit logs")?
        .rows_affected();
    let personnel = sqlx::query("DELETE FROM personnel")
        .execute(&mut *tx)
        .await
        .context("failed to delete personnel")?
        .rows_affected();
    tx.commit().await.context("failed to commit reset")?;

    tracing::warn!(leave_records, audit_logs, personnel, "operational data cleared");
    Ok(ResetCounts {
        leave_records,
        audit_logs,
        personnel,
    })
}
