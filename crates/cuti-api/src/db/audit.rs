//! Audit log persistence operations.
//!
//! The audit table is append-only apart from retention purges.

use chrono::{DateTime, Utc};
use cuti_core::{AuditEntry, AuditOutcome, Role};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn insert(pool: &PgPool, entry: &AuditEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO audit_logs (id, actor_id, actor_username, actor_role, action, category,
         target, target_type, detail, status, ip_address, user_agent, logged_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(entry.id)
    .bind(entry.actor_id)
    .bind(&entry.actor_username)
    .bind(entry.actor_role.map(|r| r.as_str()))
    .bind(&entry.action)
    .bind(&entry.category)
    .bind(&entry.target)
    .bind(&entry.target_type)
    .bind(&entry.detail)
    .bind(entry.status.as_str())
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .bind(entry.timestamp)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete entries logged before `cutoff`, returning how many were removed.
pub async fn purge_before(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM audit_logs WHERE logged_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Load entries logged at or after `since`.
pub async fn load_since(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<AuditEntry>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AuditRow>(
        "SELECT id, actor_id, actor_username, actor_role, action, category, target,
         target_type, detail, status, ip_address, user_agent, logged_at
         FROM audit_logs WHERE logged_at >= $1 ORDER BY logged_at",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AuditRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    actor_id: Option<Uuid>,
    actor_username: Option<String>,
    actor_role: Option<String>,
    action: String,
    category: String,
    target: Option<String>,
    target_type: Option<String>,
    detail: String,
    status: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    logged_at: DateTime<Utc>,
}

impl AuditRow {
    fn into_record(self) -> Result<AuditEntry, sqlx::Error> {
        let actor_role = self
            .actor_role
            .as_deref()
            .map(|r| super::decode_enum::<Role>("actor_role", r))
            .transpose()?;
        Ok(AuditEntry {
            id: self.id,
            actor_id: self.actor_id,
            actor_username: self.actor_username,
            actor_role,
            action: self.action,
            category: self.category,
            target: self.target,
            target_type: self.target_type,
            detail: self.detail,
            status: super::decode_enum::<AuditOutcome>("status", &self.status)?,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            timestamp: self.logged_at,
        })
    }
}
