//! # Check Subcommand
//!
//! Prints table counts, accounts and leave types.

use anyhow::{Context, Result};
use sqlx::PgPool;

use cuti_core::{LeaveType, User};

const TABLES: &[&str] = &[
    "users",
    "personnel",
    "leave_types",
    "leave_records",
    "audit_logs",
    "holidays",
];

/// Execute `cuti check`.
pub async fn run_check(pool: &PgPool) -> Result<u8> {
    println!("Tables:");
    for table in TABLES {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .with_context(|| format!("failed to count {table}; has `cuti init` been run?"))?;
        println!("  {table:<14} {count:>8}");
    }

    let state = crate::load_state(pool).await?;

    let mut users = state.users.list();
    users.sort_by(|a, b| a.username.cmp(&b.username));
    println!("\nUsers:");
    for user in &users {
        println!("  {}", user_line(user));
    }

    let mut leave_types = state.leave_types.list();
    leave_types.sort_by(|a, b| a.name.cmp(&b.name));
    println!("\nLeave types:");
    for lt in &leave_types {
        println!("  {}", leave_type_line(lt));
    }
    Ok(0)
}

fn user_line(user: &User) -> String {
    format!(
        "{:<20} {:<12} {}",
        user.username,
        user.role.as_str(),
        user.status.as_str()
    )
}

fn leave_type_line(lt: &LeaveType) -> String {
    let gender = lt.gender_specific.map(|g| g.code()).unwrap_or("-");
    let active = if lt.is_active { "" } else { " (inactive)" };
    format!(
        "{:<20} {:<28} {:>4} days  gender {gender}{active}",
        lt.code, lt.name, lt.default_quota
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cuti_core::Gender;
    use uuid::Uuid;

    #[test]
    fn leave_type_line_marks_restriction_and_inactive() {
        let lt = LeaveType {
            id: Uuid::new_v4(),
            name: "Melahirkan".into(),
            code: "melahirkan".into(),
            default_quota: 90,
            gender_specific: Some(Gender::Female),
            color: "orange".into(),
            is_active: false,
            created_at: Utc::now(),
        };
        let line = leave_type_line(&lt);
        assert!(line.starts_with("melahirkan"));
        assert!(line.contains("90 days"));
        assert!(line.contains("gender P (inactive)"));
    }
}
