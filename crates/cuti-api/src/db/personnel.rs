//! Personnel persistence operations.
//!
//! Deleting a person cascades to their leave records at the schema level.

use chrono::{DateTime, Utc};
use cuti_core::{Gender, Personnel};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Insert a new personnel record.
pub async fn insert(pool: &PgPool, record: &Personnel) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    insert_tx(&mut tx, record).await?;
    tx.commit().await
}

async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    record: &Personnel,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO personnel (id, nrp, name, rank, position, department, gender, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(record.id)
    .bind(&record.nrp)
    .bind(&record.name)
    .bind(&record.rank)
    .bind(&record.position)
    .bind(&record.department)
    .bind(record.gender.map(|g| g.code()))
    .bind(record.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Overwrite the mutable fields of a personnel record. `nrp` never changes.
pub async fn update(pool: &PgPool, record: &Personnel) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let updated = update_tx(&mut tx, record).await?;
    tx.commit().await?;
    Ok(updated)
}

async fn update_tx(
    tx: &mut Transaction<'_, Postgres>,
    record: &Personnel,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE personnel SET name = $2, rank = $3, position = $4, department = $5, gender = $6
         WHERE id = $1",
    )
    .bind(record.id)
    .bind(&record.name)
    .bind(&record.rank)
    .bind(&record.position)
    .bind(&record.department)
    .bind(record.gender.map(|g| g.code()))
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Apply an import batch atomically: all inserts and updates, or none.
pub async fn apply_batch(
    pool: &PgPool,
    inserts: &[Personnel],
    updates: &[Personnel],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for record in inserts {
        insert_tx(&mut tx, record).await?;
    }
    for record in updates {
        update_tx(&mut tx, record).await?;
    }
    tx.commit().await
}

/// Delete a personnel record; its leave records go with it.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM personnel WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load the full roster into the in-memory store on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Personnel>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PersonnelRow>(
        "SELECT id, nrp, name, rank, position, department, gender, created_at
         FROM personnel ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(PersonnelRow::into_record).collect()
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct PersonnelRow {
    id: Uuid,
    nrp: String,
    name: String,
    rank: String,
    position: String,
    department: Option<String>,
    gender: Option<String>,
    created_at: DateTime<Utc>,
}

impl PersonnelRow {
    fn into_record(self) -> Result<Personnel, sqlx::Error> {
        let gender = match self.gender.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(super::decode_enum::<Gender>("gender", raw)?),
            _ => None,
        };
        Ok(Personnel {
            id: self.id,
            nrp: self.nrp,
            name: self.name,
            rank: self.rank,
            position: self.position,
            department: self.department,
            gender,
            created_at: self.created_at,
        })
    }
}
