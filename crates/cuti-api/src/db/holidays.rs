//! Holiday calendar persistence operations.

use chrono::NaiveDate;
use cuti_core::Holiday;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn insert(pool: &PgPool, holiday: &Holiday) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO holidays (id, holiday_date, description, is_active) VALUES ($1, $2, $3, $4)",
    )
    .bind(holiday.id)
    .bind(holiday.date)
    .bind(&holiday.description)
    .bind(holiday.is_active)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM holidays WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<Holiday>, sqlx::Error> {
    let rows = sqlx::query_as::<_, HolidayRow>(
        "SELECT id, holiday_date, description, is_active FROM holidays ORDER BY holiday_date",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Holiday {
            id: row.id,
            date: row.holiday_date,
            description: row.description,
            is_active: row.is_active,
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct HolidayRow {
    id: Uuid,
    holiday_date: NaiveDate,
    description: String,
    is_active: bool,
}
