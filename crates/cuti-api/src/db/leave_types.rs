//! Leave type persistence operations.
//!
//! Leave types are never hard-deleted; deactivation is an update.

use chrono::{DateTime, Utc};
use cuti_core::{Gender, LeaveType};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn insert(pool: &PgPool, record: &LeaveType) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO leave_types (id, name, code, default_quota, gender_specific, color,
         is_active, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(record.id)
    .bind(&record.name)
    .bind(&record.code)
    .bind(record.default_quota)
    .bind(record.gender_specific.map(|g| g.code()))
    .bind(&record.color)
    .bind(record.is_active)
    .bind(record.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update(pool: &PgPool, record: &LeaveType) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE leave_types SET name = $2, code = $3, default_quota = $4, gender_specific = $5,
         color = $6, is_active = $7
         WHERE id = $1",
    )
    .bind(record.id)
    .bind(&record.name)
    .bind(&record.code)
    .bind(record.default_quota)
    .bind(record.gender_specific.map(|g| g.code()))
    .bind(&record.color)
    .bind(record.is_active)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Load all leave types, active or not.
pub async fn load_all(pool: &PgPool) -> Result<Vec<LeaveType>, sqlx::Error> {
    let rows = sqlx::query_as::<_, LeaveTypeRow>(
        "SELECT id, name, code, default_quota, gender_specific, color, is_active, created_at
         FROM leave_types ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(LeaveTypeRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct LeaveTypeRow {
    id: Uuid,
    name: String,
    code: String,
    default_quota: i32,
    gender_specific: Option<String>,
    color: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl LeaveTypeRow {
    fn into_record(self) -> Result<LeaveType, sqlx::Error> {
        let gender_specific = match self.gender_specific.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                Some(super::decode_enum::<Gender>("gender_specific", raw)?)
            }
            _ => None,
        };
        Ok(LeaveType {
            id: self.id,
            name: self.name,
            code: self.code,
            default_quota: self.default_quota,
            gender_specific,
            color: self.color,
            is_active: self.is_active,
            created_at: self.created_at,
        })
    }
}
