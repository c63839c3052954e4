//! Background housekeeping.
//!
//! Purges audit entries older than the configured retention horizon, from
//! memory and from Postgres.

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::state::AppState;

/// Remove audit entries logged before `now - retention`. Returns the number
/// of in-memory entries removed.
pub async fn purge_audit_log(state: &AppState, now: DateTime<Utc>) -> usize {
    let cutoff = now - chrono::Duration::days(state.config.audit_retention_days);

    if let Some(pool) = &state.db_pool {
        match crate::db::audit::purge_before(pool, cutoff).await {
            Ok(rows) if rows > 0 => tracing::info!(rows, "purged audit rows from database"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to purge audit rows from database"),
        }
    }

    let removed = state.audit_log.remove_where(|e| e.timestamp < cutoff).len();
    if removed > 0 {
        tracing::info!(removed, cutoff = %cutoff, "purged audit entries");
    }
    removed
}

/// Run [`purge_audit_log`] on a fixed interval.
pub fn spawn_audit_purge(state: AppState) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.audit_purge_interval_secs.max(60));
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            tracing::debug!("Running audit retention purge");
            purge_audit_log(&state, Utc::now()).await;
        }
    })
}
