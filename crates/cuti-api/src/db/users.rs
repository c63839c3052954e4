//! User account persistence operations.

use chrono::{DateTime, Utc};
use cuti_core::{Role, User, UserStatus};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn insert(pool: &PgPool, user: &User) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (id, username, password_hash, full_name, email, role, status,
         last_active, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(user.id)
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(&user.full_name)
    .bind(&user.email)
    .bind(user.role.as_str())
    .bind(user.status.as_str())
    .bind(user.last_active)
    .bind(user.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Overwrite every mutable column, including the password hash.
pub async fn update(pool: &PgPool, user: &User) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET password_hash = $2, full_name = $3, email = $4, role = $5,
         status = $6, last_active = $7
         WHERE id = $1",
    )
    .bind(user.id)
    .bind(&user.password_hash)
    .bind(&user.full_name)
    .bind(&user.email)
    .bind(user.role.as_str())
    .bind(user.status.as_str())
    .bind(user.last_active)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn touch_last_active(
    pool: &PgPool,
    id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_active = $2 WHERE id = $1")
        .bind(id)
        .bind(at)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<User>, sqlx::Error> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, password_hash, full_name, email, role, status, last_active,
         created_at
         FROM users ORDER BY username",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(UserRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    password_hash: String,
    full_name: String,
    email: Option<String>,
    role: String,
    status: String,
    last_active: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_record(self) -> Result<User, sqlx::Error> {
        Ok(User {
            id: self.id,
            username: self.username,
            password_hash: self.password_hash,
            full_name: self.full_name,
            email: self.email,
            role: super::decode_enum::<Role>("role", &self.role)?,
            status: super::decode_enum::<UserStatus>("status", &self.status)?,
            last_active: self.last_active,
            created_at: self.created_at,
        })
    }
}
