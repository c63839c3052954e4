//! # Domain Records
//!
//! Personnel, leave types, leave records, user accounts, audit entries and
//! holidays. These are the shapes held in memory by the API and persisted to
//! Postgres; derived views (balances, progressive totals) live in
//! [`crate::quota`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::DomainError;

// ─── Gender ─────────────────────────────────────────────────────────────────

/// Gender code used for quota gating. Serialized as the roster codes `L`/`P`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Gender {
    /// Laki-laki.
    #[serde(rename = "L")]
    Male,
    /// Perempuan.
    #[serde(rename = "P")]
    Female,
}

impl Gender {
    /// The single-letter roster code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Male => "L",
            Self::Female => "P",
        }
    }

    /// Lenient parse used by roster imports: accepts codes and spelled-out words.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "L" | "LAKI" | "LAKI-LAKI" | "LAKI LAKI" | "PRIA" => Some(Self::Male),
            "P" | "PEREMPUAN" | "WANITA" => Some(Self::Female),
            _ => None,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Gender {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| DomainError::Validation(format!("unknown gender code '{s}'")))
    }
}

// ─── Roles & accounts ───────────────────────────────────────────────────────

/// Account roles ordered by privilege: `Atasan < Admin < SuperAdmin`.
///
/// `Ord` follows declaration order, so an authorization check is a single
/// comparison against the minimum role.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Supervisor with read access.
    Atasan,
    /// Operator who records leave and maintains the roster.
    Admin,
    /// Full access including account management.
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Atasan => "atasan",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "atasan" => Ok(Self::Atasan),
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(DomainError::Validation(format!("unknown role '{other}'"))),
        }
    }
}

/// Whether an account may sign in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl FromStr for UserStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(DomainError::Validation(format!("unknown status '{other}'"))),
        }
    }
}

/// An operator account. The password hash never leaves the process.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub full_name: String,
    pub email: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub last_active: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

// ─── Roster ─────────────────────────────────────────────────────────────────

/// A member of the roster, keyed by service number (`nrp`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Personnel {
    pub id: Uuid,
    /// Service number. Unique and immutable once created.
    pub nrp: String,
    pub name: String,
    pub rank: String,
    pub position: String,
    pub department: Option<String>,
    pub gender: Option<Gender>,
    pub created_at: DateTime<Utc>,
}

// ─── Leave types ────────────────────────────────────────────────────────────

/// A category of leave with an annual day quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LeaveType {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    /// Days available per calendar year.
    pub default_quota: i32,
    /// When set, only personnel of this gender may take the leave.
    pub gender_specific: Option<Gender>,
    pub color: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl LeaveType {
    /// Unrestricted types apply to everyone; restricted ones only to a
    /// known, matching gender.
    pub fn applies_to(&self, gender: Option<Gender>) -> bool {
        match self.gender_specific {
            None => true,
            Some(required) => gender == Some(required),
        }
    }
}

// ─── Leave records ──────────────────────────────────────────────────────────

/// One accepted leave entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LeaveRecord {
    pub id: Uuid,
    pub personnel_id: Uuid,
    pub leave_type_id: Uuid,
    pub days_requested: i32,
    pub start_date: NaiveDate,
    pub reason: String,
    /// Relative path of the evidence file under the upload directory.
    pub evidence_path: Option<String>,
    /// Remaining balance immediately after this record was accepted.
    /// Written once, never recomputed.
    pub balance_remaining: i32,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
}

impl LeaveRecord {
    /// Calendar year the record counts against.
    pub fn year(&self) -> i32 {
        self.start_date.year()
    }

    /// Last day of leave, inclusive. Saturates at the last representable
    /// date.
    pub fn end_date(&self) -> NaiveDate {
        let span = Duration::days(i64::from(self.days_requested.max(1)) - 1);
        self.start_date
            .checked_add_signed(span)
            .unwrap_or(NaiveDate::MAX)
    }

    /// Whether `day` falls inside the leave period.
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date()
    }
}

// ─── Audit ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for AuditOutcome {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::Validation(format!("unknown outcome '{other}'"))),
        }
    }
}

/// Append-only audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub actor_username: Option<String>,
    pub actor_role: Option<Role>,
    /// Action code, e.g. `INPUT_IZIN` or `CREATE_LEAVE_TYPE`.
    pub action: String,
    pub category: String,
    pub target: Option<String>,
    pub target_type: Option<String>,
    pub detail: String,
    pub status: AuditOutcome,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ─── Holidays ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Holiday {
    pub id: Uuid,
    pub date: NaiveDate,
    pub description: String,
    pub is_active: bool,
}
