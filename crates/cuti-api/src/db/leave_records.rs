//! Leave record persistence operations.
//!
//! Inserts and updates that consume quota go through [`insert_checked`] and
//! [`update_checked`]: each runs in a transaction that takes a Postgres
//! advisory lock on the (personnel, leave type, year) group and re-sums
//! usage in SQL before writing. This holds even when several API processes
//! share one database.

use chrono::{DateTime, NaiveDate, Utc};
use cuti_core::{LeaveRecord, QuotaKey};
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

/// Failure of a quota-checked write.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The database disagrees with the in-memory usage.
    #[error("quota exceeded at commit: remaining {remaining}, requested {requested}")]
    Quota { remaining: i32, requested: i32 },

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Serialize writers for `key` until the transaction ends.
async fn lock_group(tx: &mut Transaction<'_, Postgres>, key: &QuotaKey) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(key.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Days used in the group according to the database.
async fn used_in_group(
    tx: &mut Transaction<'_, Postgres>,
    key: &QuotaKey,
    exclude: Option<Uuid>,
) -> Result<i32, sqlx::Error> {
    let used: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(days_requested), 0)::BIGINT FROM leave_records
         WHERE personnel_id = $1 AND leave_type_id = $2
           AND start_date >= make_date($3, 1, 1) AND start_date < make_date($3 + 1, 1, 1)
           AND ($4::UUID IS NULL OR id <> $4)",
    )
    .bind(key.personnel_id)
    .bind(key.leave_type_id)
    .bind(key.year)
    .bind(exclude)
    .fetch_one(&mut **tx)
    .await?;
    Ok(i32::try_from(used).unwrap_or(i32::MAX))
}

async fn recheck(
    tx: &mut Transaction<'_, Postgres>,
    key: &QuotaKey,
    quota: i32,
    record: &LeaveRecord,
    exclude: Option<Uuid>,
) -> Result<(), WriteError> {
    lock_group(tx, key).await?;
    let used = used_in_group(tx, key, exclude).await?;
    let remaining = quota.saturating_sub(used).max(0);
    if remaining < record.days_requested {
        return Err(WriteError::Quota {
            remaining,
            requested: record.days_requested,
        });
    }
    Ok(())
}

/// Insert a record after confirming, under the group lock, that `quota`
/// still covers it.
pub async fn insert_checked(
    pool: &PgPool,
    record: &LeaveRecord,
    quota: i32,
) -> Result<(), WriteError> {
    let key = QuotaKey::of(record);
    let mut tx = pool.begin().await?;
    recheck(&mut tx, &key, quota, record, None).await?;

    sqlx::query(
        "INSERT INTO leave_records (id, personnel_id, leave_type_id, days_requested, start_date,
         reason, evidence_path, balance_remaining, created_at, created_by)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(record.id)
    .bind(record.personnel_id)
    .bind(record.leave_type_id)
    .bind(record.days_requested)
    .bind(record.start_date)
    .bind(&record.reason)
    .bind(&record.evidence_path)
    .bind(record.balance_remaining)
    .bind(record.created_at)
    .bind(record.created_by)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Replace a record's editable fields after re-checking its target group,
/// excluding the record itself from usage.
pub async fn update_checked(
    pool: &PgPool,
    record: &LeaveRecord,
    quota: i32,
) -> Result<bool, WriteError> {
    let key = QuotaKey::of(record);
    let mut tx = pool.begin().await?;
    recheck(&mut tx, &key, quota, record, Some(record.id)).await?;

    let result = sqlx::query(
        "UPDATE leave_records SET personnel_id = $2, leave_type_id = $3, days_requested = $4,
         start_date = $5, reason = $6, evidence_path = $7, balance_remaining = $8
         WHERE id = $1",
    )
    .bind(record.id)
    .bind(record.personnel_id)
    .bind(record.leave_type_id)
    .bind(record.days_requested)
    .bind(record.start_date)
    .bind(&record.reason)
    .bind(&record.evidence_path)
    .bind(record.balance_remaining)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM leave_records WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load every leave record into the in-memory store on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<LeaveRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, LeaveRecordRow>(
        "SELECT id, personnel_id, leave_type_id, days_requested, start_date, reason,
         evidence_path, balance_remaining, created_at, created_by
         FROM leave_records ORDER BY start_date, created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(LeaveRecordRow::into_record).collect())
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct LeaveRecordRow {
    id: Uuid,
    personnel_id: Uuid,
    leave_type_id: Uuid,
    days_requested: i32,
    start_date: NaiveDate,
    reason: String,
    evidence_path: Option<String>,
    balance_remaining: i32,
    created_at: DateTime<Utc>,
    created_by: Option<Uuid>,
}

impl LeaveRecordRow {
    fn into_record(self) -> LeaveRecord {
        LeaveRecord {
            id: self.id,
            personnel_id: self.personnel_id,
            leave_type_id: self.leave_type_id,
            days_requested: self.days_requested,
            start_date: self.start_date,
            reason: self.reason,
            evidence_path: self.evidence_path,
            balance_remaining: self.balance_remaining,
            created_at: self.created_at,
            created_by: self.created_by,
        }
    }
}
