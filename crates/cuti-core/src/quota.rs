//! # Leave-Quota Accounting
//!
//! Computes, for a (personnel, leave type, calendar year) group, how many
//! days have been used and how many remain, and gates new or edited leave
//! requests against that balance.
//!
//! Everything here is a pure function over a set of [`LeaveRecord`]s. The
//! caller is responsible for serializing read-validate-write sequences for
//! the same [`QuotaKey`]; two validations that observe the same record set
//! will both pass.
//!
//! ## Balances
//!
//! Two balances exist and are deliberately kept apart:
//!
//! - the **snapshot** stored on each record (`balance_remaining`), computed
//!   once by [`validate_request`] at acceptance time;
//! - the **progressive** balance computed at display time by
//!   [`progressive_remaining`], which orders a group by
//!   `(start_date, created_at, id)` and reports the balance after each entry.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::DomainError;
use crate::model::{LeaveRecord, LeaveType, Personnel};

// ─── Keys ───────────────────────────────────────────────────────────────────

/// The unit quota is counted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuotaKey {
    pub personnel_id: Uuid,
    pub leave_type_id: Uuid,
    pub year: i32,
}

impl QuotaKey {
    pub fn new(personnel_id: Uuid, leave_type_id: Uuid, year: i32) -> Self {
        Self {
            personnel_id,
            leave_type_id,
            year,
        }
    }

    /// The group an existing record belongs to.
    pub fn of(record: &LeaveRecord) -> Self {
        Self::new(record.personnel_id, record.leave_type_id, record.year())
    }

    pub fn matches(&self, record: &LeaveRecord) -> bool {
        record.personnel_id == self.personnel_id
            && record.leave_type_id == self.leave_type_id
            && record.year() == self.year
    }
}

impl fmt::Display for QuotaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.personnel_id, self.leave_type_id, self.year)
    }
}

// ─── Primitives ─────────────────────────────────────────────────────────────

/// Days used in the group, optionally ignoring one record (the one being
/// edited). Zero when nothing matches.
pub fn used_days<'a, I>(records: I, key: QuotaKey, exclude: Option<Uuid>) -> i32
where
    I: IntoIterator<Item = &'a LeaveRecord>,
{
    records
        .into_iter()
        .filter(|r| key.matches(r) && Some(r.id) != exclude)
        .fold(0i32, |acc, r| acc.saturating_add(r.days_requested))
}

/// Remaining days for a type given usage; clamped at zero for legacy overuse.
pub fn remaining(leave_type: &LeaveType, used: i32) -> i32 {
    leave_type.default_quota.saturating_sub(used).max(0)
}

// ─── Validation ─────────────────────────────────────────────────────────────

/// Calendar years a leave request may start in.
pub const LEAVE_YEARS: RangeInclusive<i32> = 1900..=9999;

/// The parts of a leave request the engine reasons about.
#[derive(Debug, Clone, Copy)]
pub struct LeaveRequest {
    pub days_requested: i32,
    pub start_date: NaiveDate,
    /// Set when editing an existing record; that record is excluded from usage.
    pub editing: Option<Uuid>,
}

/// Result of a successful validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acceptance {
    pub key: QuotaKey,
    pub used: i32,
    pub remaining_before: i32,
    /// Snapshot to store on the accepted record.
    pub balance_remaining: i32,
}

/// Gate a request for `personnel` against `leave_type`.
///
/// Both entities must already be resolved by the caller (absent ones are a
/// [`DomainError::NotFound`] at the call site). Nothing is written here.
pub fn validate_request<'a, I>(
    personnel: &Personnel,
    leave_type: &LeaveType,
    request: &LeaveRequest,
    records: I,
) -> Result<Acceptance, DomainError>
where
    I: IntoIterator<Item = &'a LeaveRecord>,
{
    if !leave_type.is_active {
        return Err(DomainError::Validation(format!(
            "leave type {} is inactive",
            leave_type.name
        )));
    }

    if let Some(required) = leave_type.gender_specific {
        if personnel.gender != Some(required) {
            return Err(DomainError::Validation(format!(
                "leave type {} is restricted to gender {}",
                leave_type.name, required
            )));
        }
    }

    if request.days_requested <= 0 {
        return Err(DomainError::Validation(
            "days_requested must be greater than zero".into(),
        ));
    }

    if !LEAVE_YEARS.contains(&request.start_date.year()) {
        return Err(DomainError::Validation(format!(
            "start_date must fall between {} and {}",
            LEAVE_YEARS.start(),
            LEAVE_YEARS.end()
        )));
    }

    let key = QuotaKey::new(personnel.id, leave_type.id, request.start_date.year());
    let used = used_days(records, key, request.editing);
    let remaining_before = remaining(leave_type, used);

    if remaining_before < request.days_requested {
        return Err(DomainError::QuotaExceeded {
            leave_type: leave_type.name.clone(),
            remaining: remaining_before,
            requested: request.days_requested,
        });
    }

    Ok(Acceptance {
        key,
        used,
        remaining_before,
        balance_remaining: remaining_before - request.days_requested,
    })
}

// ─── Derived views ──────────────────────────────────────────────────────────

/// Per-type balance for one person and year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LeaveBalance {
    pub leave_type_id: Uuid,
    pub code: String,
    pub name: String,
    pub color: String,
    pub quota: i32,
    pub used: i32,
    pub remaining: i32,
}

/// Balances for every active type applicable to the person's gender,
/// ordered by type name.
pub fn balances(
    personnel: &Personnel,
    leave_types: &[LeaveType],
    records: &[LeaveRecord],
    year: i32,
) -> Vec<LeaveBalance> {
    let mut applicable: Vec<&LeaveType> = leave_types
        .iter()
        .filter(|lt| lt.is_active && lt.applies_to(personnel.gender))
        .collect();
    applicable.sort_by(|a, b| a.name.cmp(&b.name));

    applicable
        .into_iter()
        .map(|lt| {
            let used = used_days(records, QuotaKey::new(personnel.id, lt.id, year), None);
            LeaveBalance {
                leave_type_id: lt.id,
                code: lt.code.clone(),
                name: lt.name.clone(),
                color: lt.color.clone(),
                quota: lt.default_quota,
                used,
                remaining: remaining(lt, used),
            }
        })
        .collect()
}

/// Total order used for progressive balances within a group.
pub fn ledger_order(a: &LeaveRecord, b: &LeaveRecord) -> Ordering {
    a.start_date
        .cmp(&b.start_date)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

/// Balance remaining after each record, in ledger order within its group.
///
/// `quota_of` resolves a leave type id to its quota; records whose type
/// cannot be resolved are omitted from the result.
pub fn progressive_remaining<F>(records: &[LeaveRecord], quota_of: F) -> HashMap<Uuid, i32>
where
    F: Fn(Uuid) -> Option<i32>,
{
    let mut groups: HashMap<QuotaKey, Vec<&LeaveRecord>> = HashMap::new();
    for record in records {
        groups.entry(QuotaKey::of(record)).or_default().push(record);
    }

    let mut out = HashMap::with_capacity(records.len());
    for (key, mut group) in groups {
        let Some(quota) = quota_of(key.leave_type_id) else {
            continue;
        };
        group.sort_by(|a, b| ledger_order(a, b));
        let mut running = 0i32;
        for record in group {
            running = running.saturating_add(record.days_requested);
            out.insert(record.id, quota.saturating_sub(running).max(0));
        }
    }
    out
}
