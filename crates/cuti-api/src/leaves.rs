//! # Leave Record Service
//!
//! Create, update and delete of leave records, shared by the HTTP handlers.
//!
//! ## Write path
//!
//! ```text
//! resolve personnel + type → check evidence type → acquire quota lock
//!   → validate against in-memory usage → write evidence file
//!   → persist (transaction + advisory lock + SQL re-check)
//!   → apply to memory → release lock → audit → notify
//! ```
//!
//! A rejected request writes nothing except a `failed` audit entry. If
//! persistence fails after the evidence file was written, the file is
//! removed again.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate, Utc};
use cuti_core::quota::{self, progressive_remaining};
use cuti_core::{DomainError, LeaveRecord, LeaveRequest, LeaveType, Personnel, QuotaKey};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::{self, AuditAction, AuditEvent, RequestMeta};
use crate::auth::CallerIdentity;
use crate::db::leave_records::WriteError;
use crate::error::AppError;
use crate::evidence::{EvidenceError, EvidenceStore};
use crate::extractors::{MultipartForm, UploadedFile};
use crate::notify::{ChangeAction, Entity};
use crate::state::AppState;

// ── Input ───────────────────────────────────────────────────────────────────

/// Fields of a leave form. On update, absent fields keep their value.
#[derive(Debug, Default)]
pub struct LeaveForm {
    pub nrp: Option<String>,
    /// Leave type id, or its code.
    pub leave_type: Option<String>,
    pub days_requested: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub reason: Option<String>,
    pub file: Option<UploadedFile>,
    pub remove_file: bool,
}

impl LeaveForm {
    pub fn from_multipart(mut form: MultipartForm) -> Result<Self, AppError> {
        Ok(Self {
            nrp: form.text("nrp").map(str::to_string),
            leave_type: form
                .text("leave_type_id")
                .or_else(|| form.text("leave_type"))
                .map(str::to_string),
            days_requested: form.parse("days_requested")?,
            start_date: form.parse("start_date")?,
            reason: form.text("reason").map(str::to_string),
            remove_file: form.flag("remove_file"),
            file: form.file.take(),
        })
    }

    fn required<T: Clone>(value: &Option<T>, name: &str) -> Result<T, AppError> {
        value
            .clone()
            .ok_or_else(|| AppError::Validation(format!("field '{name}' is required")))
    }
}

// ── Views ───────────────────────────────────────────────────────────────────

/// A leave record with its personnel and type resolved.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaveRecordView {
    #[serde(flatten)]
    pub record: LeaveRecord,
    pub end_date: NaiveDate,
    pub personnel: Option<Personnel>,
    pub leave_type: Option<LeaveType>,
    pub created_by_username: Option<String>,
    /// Balance after this record in ledger order, computed at read time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progressive_remaining: Option<i32>,
}

pub fn view(state: &AppState, record: LeaveRecord, progressive: Option<i32>) -> LeaveRecordView {
    LeaveRecordView {
        end_date: record.end_date(),
        personnel: state.personnel.get(&record.personnel_id),
        leave_type: state.leave_types.get(&record.leave_type_id),
        created_by_username: record
            .created_by
            .and_then(|id| state.users.get(&id))
            .map(|u| u.username),
        progressive_remaining: progressive,
        record,
    }
}

/// Views for `page`, with progressive balances when `progressive` is set.
///
/// Progressive balances are computed over every record in the groups the
/// page touches, not only the records on the page.
pub fn views(state: &AppState, page: Vec<LeaveRecord>, progressive: bool) -> Vec<LeaveRecordView> {
    if !progressive {
        return page.into_iter().map(|r| view(state, r, None)).collect();
    }
    let keys: HashSet<QuotaKey> = page.iter().map(QuotaKey::of).collect();
    let groups = state
        .leave_records
        .filter(|r| keys.contains(&QuotaKey::of(r)));
    let quotas: HashMap<Uuid, i32> = state
        .leave_types
        .list()
        .into_iter()
        .map(|lt| (lt.id, lt.default_quota))
        .collect();
    let balances = progressive_remaining(&groups, |id| quotas.get(&id).copied());
    page.into_iter()
        .map(|r| {
            let p = balances.get(&r.id).copied();
            view(state, r, p)
        })
        .collect()
}

// ── Resolution helpers ──────────────────────────────────────────────────────

fn resolve_personnel(state: &AppState, nrp: &str) -> Result<Personnel, AppError> {
    state
        .personnel_by_nrp(nrp)
        .ok_or_else(|| DomainError::not_found("personnel", nrp).into())
}

/// Resolve by id, falling back to code.
fn resolve_leave_type(state: &AppState, key: &str) -> Result<LeaveType, AppError> {
    let found = match key.parse::<Uuid>() {
        Ok(id) => state.leave_types.get(&id),
        Err(_) => state.leave_types.find(|lt| lt.code == key),
    };
    found.ok_or_else(|| DomainError::not_found("leave type", key).into())
}

fn current_personnel(state: &AppState, id: Uuid) -> Result<Personnel, AppError> {
    state
        .personnel
        .get(&id)
        .ok_or_else(|| DomainError::not_found("personnel", id.to_string()).into())
}

/// Store `record` unless its member is gone. Membership is checked while
/// the record map is write-locked; a roster delete removes the member
/// before sweeping their records.
fn apply_to_memory(state: &AppState, record: &LeaveRecord) -> Result<(), AppError> {
    state.leave_records.with_write(|records| {
        if !state.personnel.contains(&record.personnel_id) {
            let id = record.personnel_id.to_string();
            return Err(AppError::from(DomainError::not_found("personnel", id)));
        }
        records.insert(record.id, record.clone());
        Ok(())
    })
}

fn evidence_error(err: EvidenceError) -> AppError {
    match err {
        EvidenceError::Io(e) => AppError::internal("failed to store evidence", e),
        other => AppError::BadRequest(other.to_string()),
    }
}

fn write_error(err: WriteError, leave_type: &LeaveType) -> AppError {
    match err {
        WriteError::Quota {
            remaining,
            requested,
        } => DomainError::QuotaExceeded {
            leave_type: leave_type.name.clone(),
            remaining,
            requested,
        }
        .into(),
        WriteError::Db(e) => {
            tracing::error!(error = %e, "failed to persist leave record");
            AppError::from(e)
        }
    }
}

// ── Create ──────────────────────────────────────────────────────────────────

/// Record a new leave entry for `form.nrp`.
pub async fn create(
    state: &AppState,
    caller: &CallerIdentity,
    meta: &RequestMeta,
    form: LeaveForm,
) -> Result<LeaveRecordView, AppError> {
    let nrp = form.nrp.clone().unwrap_or_default();
    match create_inner(state, caller, form).await {
        Ok((record, leave_type)) => {
            let detail = format!(
                "Input izin for NRP {nrp}: {} ({} days)",
                leave_type.name, record.days_requested
            );
            audit::record(
                state,
                caller,
                meta,
                AuditEvent::success(AuditAction::InputIzin, detail).target("Personnel", &nrp),
            )
            .await;
            state.notifier.notify_change(
                Entity::Leaves,
                ChangeAction::Create,
                &caller.username,
                Some(record.id.to_string()),
                Some(serde_json::json!({
                    "nrp": nrp,
                    "leave_type": leave_type.name,
                    "days": record.days_requested,
                })),
            );
            Ok(view(state, record, None))
        }
        Err(e) => {
            audit::record(
                state,
                caller,
                meta,
                AuditEvent::failed(
                    AuditAction::InputIzin,
                    format!("Input izin for NRP {nrp} rejected: {e}"),
                )
                .target("Personnel", &nrp),
            )
            .await;
            Err(e)
        }
    }
}

async fn create_inner(
    state: &AppState,
    caller: &CallerIdentity,
    form: LeaveForm,
) -> Result<(LeaveRecord, LeaveType), AppError> {
    let personnel = resolve_personnel(state, &LeaveForm::required(&form.nrp, "nrp")?)?;
    let leave_type =
        resolve_leave_type(state, &LeaveForm::required(&form.leave_type, "leave_type_id")?)?;
    let request = LeaveRequest {
        days_requested: LeaveForm::required(&form.days_requested, "days_requested")?,
        start_date: LeaveForm::required(&form.start_date, "start_date")?,
        editing: None,
    };
    let reason = LeaveForm::required(&form.reason, "reason")?;
    if let Some(file) = &form.file {
        EvidenceStore::check(&file.content_type, &file.bytes).map_err(evidence_error)?;
    }

    let key = QuotaKey::new(personnel.id, leave_type.id, request.start_date.year());
    let _guard = state.quota_locks.acquire(key).await;
    let personnel = current_personnel(state, personnel.id)?;

    let group = state.leave_records.filter(|r| key.matches(r));
    let acceptance = quota::validate_request(&personnel, &leave_type, &request, &group)?;

    let evidence_path = match &form.file {
        Some(file) => Some(
            state
                .evidence
                .save(&file.content_type, &file.bytes)
                .await
                .map_err(evidence_error)?,
        ),
        None => None,
    };

    let record = LeaveRecord {
        id: Uuid::new_v4(),
        personnel_id: personnel.id,
        leave_type_id: leave_type.id,
        days_requested: request.days_requested,
        start_date: request.start_date,
        reason,
        evidence_path,
        balance_remaining: acceptance.balance_remaining,
        created_at: Utc::now(),
        created_by: Some(caller.user_id),
    };

    if let Some(pool) = &state.db_pool {
        if let Err(e) =
            crate::db::leave_records::insert_checked(pool, &record, leave_type.default_quota).await
        {
            if let Some(path) = &record.evidence_path {
                state.evidence.remove(path).await;
            }
            return Err(write_error(e, &leave_type));
        }
    }
    if let Err(e) = apply_to_memory(state, &record) {
        if let Some(path) = &record.evidence_path {
            state.evidence.remove(path).await;
        }
        return Err(e);
    }

    tracing::info!(
        record_id = %record.id,
        nrp = %personnel.nrp,
        leave_type = %leave_type.code,
        days = record.days_requested,
        balance_remaining = record.balance_remaining,
        "leave recorded"
    );
    Ok((record, leave_type))
}

// ── Update ──────────────────────────────────────────────────────────────────

/// Edit a leave record. The record's own days are excluded from usage and
/// only its own snapshot is recomputed.
pub async fn update(
    state: &AppState,
    caller: &CallerIdentity,
    meta: &RequestMeta,
    id: Uuid,
    form: LeaveForm,
) -> Result<LeaveRecordView, AppError> {
    match update_inner(state, id, form).await {
        Ok((record, personnel, leave_type)) => {
            let detail = format!(
                "Update izin {id} for NRP {}: {} ({} days)",
                personnel.nrp, leave_type.name, record.days_requested
            );
            audit::record(
                state,
                caller,
                meta,
                AuditEvent::success(AuditAction::UpdateIzin, detail)
                    .target("LeaveRecord", id.to_string()),
            )
            .await;
            state.notifier.notify_change(
                Entity::Leaves,
                ChangeAction::Update,
                &caller.username,
                Some(id.to_string()),
                None,
            );
            Ok(view(state, record, None))
        }
        Err(e) => {
            audit::record(
                state,
                caller,
                meta,
                AuditEvent::failed(
                    AuditAction::UpdateIzin,
                    format!("Update izin {id} rejected: {e}"),
                )
                .target("LeaveRecord", id.to_string()),
            )
            .await;
            Err(e)
        }
    }
}

async fn update_inner(
    state: &AppState,
    id: Uuid,
    form: LeaveForm,
) -> Result<(LeaveRecord, Personnel, LeaveType), AppError> {
    let existing = state
        .leave_records
        .get(&id)
        .ok_or_else(|| AppError::from(DomainError::not_found("leave record", id.to_string())))?;

    let personnel = match &form.nrp {
        Some(nrp) => resolve_personnel(state, nrp)?,
        None => current_personnel(state, existing.personnel_id)?,
    };
    let leave_type = match &form.leave_type {
        Some(key) => resolve_leave_type(state, key)?,
        None => state.leave_types.get(&existing.leave_type_id).ok_or_else(|| {
            AppError::from(DomainError::not_found(
                "leave type",
                existing.leave_type_id.to_string(),
            ))
        })?,
    };
    let request = LeaveRequest {
        days_requested: form.days_requested.unwrap_or(existing.days_requested),
        start_date: form.start_date.unwrap_or(existing.start_date),
        editing: Some(id),
    };
    if let Some(file) = &form.file {
        EvidenceStore::check(&file.content_type, &file.bytes).map_err(evidence_error)?;
    }

    let key = QuotaKey::new(personnel.id, leave_type.id, request.start_date.year());
    let _guard = state.quota_locks.acquire(key).await;

    // The record or its member may have been deleted while waiting.
    let existing = state
        .leave_records
        .get(&id)
        .ok_or_else(|| AppError::from(DomainError::not_found("leave record", id.to_string())))?;
    let personnel = current_personnel(state, personnel.id)?;

    let group = state.leave_records.filter(|r| key.matches(r));
    let acceptance = quota::validate_request(&personnel, &leave_type, &request, &group)?;

    let new_file = match &form.file {
        Some(file) => Some(
            state
                .evidence
                .save(&file.content_type, &file.bytes)
                .await
                .map_err(evidence_error)?,
        ),
        None => None,
    };
    let evidence_path = match (&new_file, form.remove_file) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => None,
        (None, false) => existing.evidence_path.clone(),
    };

    let record = LeaveRecord {
        personnel_id: personnel.id,
        leave_type_id: leave_type.id,
        days_requested: request.days_requested,
        start_date: request.start_date,
        reason: form.reason.clone().unwrap_or_else(|| existing.reason.clone()),
        evidence_path,
        balance_remaining: acceptance.balance_remaining,
        ..existing.clone()
    };

    if let Some(pool) = &state.db_pool {
        let persisted =
            crate::db::leave_records::update_checked(pool, &record, leave_type.default_quota).await;
        let failure = match persisted {
            Ok(true) => None,
            Ok(false) => Some(DomainError::not_found("leave record", id.to_string()).into()),
            Err(e) => Some(write_error(e, &leave_type)),
        };
        if let Some(err) = failure {
            if let Some(path) = &new_file {
                state.evidence.remove(path).await;
            }
            return Err(err);
        }
    }
    if let Err(e) = apply_to_memory(state, &record) {
        if let Some(path) = &new_file {
            state.evidence.remove(path).await;
        }
        return Err(e);
    }

    if let Some(old) = &existing.evidence_path {
        if record.evidence_path.as_ref() != Some(old) {
            state.evidence.remove(old).await;
        }
    }

    tracing::info!(
        record_id = %record.id,
        days = record.days_requested,
        balance_remaining = record.balance_remaining,
        "leave record updated"
    );
    Ok((record, personnel, leave_type))
}

// ── Delete ──────────────────────────────────────────────────────────────────

/// Remove a record and its evidence. Other records' snapshots are untouched.
pub async fn delete(
    state: &AppState,
    caller: &CallerIdentity,
    meta: &RequestMeta,
    id: Uuid,
) -> Result<(), AppError> {
    match delete_inner(state, id).await {
        Ok(existing) => {
            let nrp = state
                .personnel
                .get(&existing.personnel_id)
                .map(|p| p.nrp)
                .unwrap_or_default();
            audit::record(
                state,
                caller,
                meta,
                AuditEvent::success(
                    AuditAction::DeleteIzin,
                    format!(
                        "Deleted izin {id} for NRP {nrp} ({} days)",
                        existing.days_requested
                    ),
                )
                .target("LeaveRecord", id.to_string()),
            )
            .await;
            state.notifier.notify_change(
                Entity::Leaves,
                ChangeAction::Delete,
                &caller.username,
                Some(id.to_string()),
                None,
            );
            Ok(())
        }
        Err(e) => {
            audit::record(
                state,
                caller,
                meta,
                AuditEvent::failed(
                    AuditAction::DeleteIzin,
                    format!("Delete izin {id} rejected: {e}"),
                )
                .target("LeaveRecord", id.to_string()),
            )
            .await;
            Err(e)
        }
    }
}

async fn delete_inner(state: &AppState, id: Uuid) -> Result<LeaveRecord, AppError> {
    let existing = state
        .leave_records
        .get(&id)
        .ok_or_else(|| AppError::from(DomainError::not_found("leave record", id.to_string())))?;

    let guard = state.quota_locks.acquire(QuotaKey::of(&existing)).await;
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::leave_records::delete(pool, id).await {
            tracing::error!(record_id = %id, error = %e, "failed to delete leave record");
            return Err(AppError::Internal(
                "leave record delete failed to persist".to_string(),
            ));
        }
    }
    state.leave_records.remove(&id);
    drop(guard);

    if let Some(path) = &existing.evidence_path {
        state.evidence.remove(path).await;
    }
    Ok(existing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cuti_core::{Gender, Role};

    fn caller() -> CallerIdentity {
        CallerIdentity {
            user_id: Uuid::new_v4(),
            username: "operator".into(),
            role: Role::Admin,
        }
    }

    async fn seeded() -> (AppState, Personnel, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::state::AppConfig {
            upload_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let state = AppState::with_config(config, None);
        state.seed_leave_types_if_empty().await.unwrap();
        let person = Personnel {
            id: Uuid::new_v4(),
            nrp: "85011001".into(),
            name: "Budi".into(),
            rank: "BRIPKA".into(),
            position: "BA".into(),
            department: None,
            gender: Some(Gender::Male),
            created_at: Utc::now(),
        };
        state.personnel.insert(person.id, person.clone());
        (state, person, dir)
    }

    fn form(nrp: &str, code: &str, days: i32, start: &str) -> LeaveForm {
        LeaveForm {
            nrp: Some(nrp.into()),
            leave_type: Some(code.into()),
            days_requested: Some(days),
            start_date: Some(start.parse().unwrap()),
            reason: Some("keperluan keluarga".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_then_reject_over_quota() {
        let (state, _, _dir) = seeded().await;
        let c = caller();
        let meta = RequestMeta::default();

        let v = create(&state, &c, &meta, form("85011001", "cuti_tahunan", 5, "2025-03-01"))
            .await
            .unwrap();
        assert_eq!(v.record.balance_remaining, 7);
        assert_eq!(v.end_date.to_string(), "2025-03-05");

        let err = create(&state, &c, &meta, form("85011001", "cuti_tahunan", 8, "2025-06-01"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded { remaining: 7, requested: 8, .. }));
        assert_eq!(state.leave_records.len(), 1);

        let failed = state
            .audit_log
            .filter(|e| e.status == cuti_core::AuditOutcome::Failed);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].action, "INPUT_IZIN");
    }

    #[tokio::test]
    async fn gender_restriction_writes_no_file() {
        let (state, _, dir) = seeded().await;
        let mut f = form("85011001", "melahirkan", 1, "2025-01-10");
        f.file = Some(UploadedFile {
            file_name: Some("surat.pdf".into()),
            content_type: "application/pdf".into(),
            bytes: b"%PDF-1.4".to_vec(),
        });
        let err = create(&state, &caller(), &RequestMeta::default(), f)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::BadRequest(ref m) if m.contains("restricted to gender P")
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn update_excludes_self_and_replaces_file() {
        let (state, _, _dir) = seeded().await;
        let c = caller();
        let meta = RequestMeta::default();
        let mut f = form("85011001", "cuti_tahunan", 12, "2025-02-01");
        f.file = Some(UploadedFile {
            file_name: None,
            content_type: "image/png".into(),
            bytes: vec![1, 2, 3],
        });
        let created = create(&state, &c, &meta, f).await.unwrap();
        let old_file = created.record.evidence_path.clone().unwrap();
        assert!(state.evidence.exists(&old_file));

        let edit = LeaveForm {
            days_requested: Some(10),
            remove_file: true,
            ..Default::default()
        };
        let updated = update(&state, &c, &meta, created.record.id, edit).await.unwrap();
        assert_eq!(updated.record.balance_remaining, 2);
        assert!(updated.record.evidence_path.is_none());
        assert!(!state.evidence.exists(&old_file));
        assert_eq!(updated.record.created_at, created.record.created_at);
    }

    #[tokio::test]
    async fn delete_leaves_sibling_snapshots() {
        let (state, _, _dir) = seeded().await;
        let c = caller();
        let meta = RequestMeta::default();
        let a = create(&state, &c, &meta, form("85011001", "sakit", 4, "2025-01-02"))
            .await
            .unwrap();
        let b = create(&state, &c, &meta, form("85011001", "sakit", 3, "2025-02-02"))
            .await
            .unwrap();
        assert_eq!(b.record.balance_remaining, 7);

        delete(&state, &c, &meta, a.record.id).await.unwrap();
        assert_eq!(state.leave_records.get(&b.record.id).unwrap().balance_remaining, 7);
        assert!(matches!(
            delete(&state, &c, &meta, a.record.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_creates_never_overcommit() {
        let (state, _, _dir) = seeded().await;
        let mut handles = Vec::new();
        for i in 0..4 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                let start = format!("2025-0{}-01", i + 1);
                let f = form("85011001", "cuti_tahunan", 5, &start);
                create(&state, &caller(), &RequestMeta::default(), f).await
            }));
        }
        let mut ok = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 2);
        let used: i32 = state
            .leave_records
            .list()
            .iter()
            .map(|r| r.days_requested)
            .sum();
        assert_eq!(used, 10);
    }

    #[tokio::test]
    async fn progressive_view_spans_whole_group() {
        let (state, _, _dir) = seeded().await;
        let c = caller();
        let meta = RequestMeta::default();
        create(&state, &c, &meta, form("85011001", "istimewa", 2, "2025-01-01"))
            .await
            .unwrap();
        let late = create(&state, &c, &meta, form("85011001", "istimewa", 3, "2025-05-01"))
            .await
            .unwrap();

        let page = views(&state, vec![late.record.clone()], true);
        assert_eq!(page[0].progressive_remaining, Some(3));
        let page = views(&state, vec![late.record], false);
        assert_eq!(page[0].progressive_remaining, None);
    }

    #[tokio::test]
    async fn member_removed_while_waiting_gets_nothing() {
        let (state, person, dir) = seeded().await;
        let annual = state
            .leave_types
            .find(|lt| lt.code == "cuti_tahunan")
            .unwrap();
        let held = state
            .quota_locks
            .acquire(QuotaKey::new(person.id, annual.id, 2025))
            .await;

        let task = {
            let state = state.clone();
            tokio::spawn(async move {
                let mut f = form("85011001", "cuti_tahunan", 2, "2025-04-01");
                f.file = Some(UploadedFile {
                    file_name: None,
                    content_type: "image/jpeg".into(),
                    bytes: vec![0xff, 0xd8],
                });
                create(&state, &caller(), &RequestMeta::default(), f).await
            })
        };
        tokio::task::yield_now().await;
        state.personnel.remove(&person.id);
        drop(held);

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(state.leave_records.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn apply_refuses_records_of_removed_member() {
        let (state, person, _dir) = seeded().await;
        let annual = state
            .leave_types
            .find(|lt| lt.code == "cuti_tahunan")
            .unwrap();
        let record = LeaveRecord {
            id: Uuid::new_v4(),
            personnel_id: person.id,
            leave_type_id: annual.id,
            days_requested: 1,
            start_date: "2025-01-06".parse().unwrap(),
            reason: "urusan keluarga".into(),
            evidence_path: None,
            balance_remaining: 11,
            created_at: Utc::now(),
            created_by: None,
        };
        state.personnel.remove(&person.id);
        assert!(matches!(
            apply_to_memory(&state, &record),
            Err(AppError::NotFound(_))
        ));
        assert!(state.leave_records.is_empty());
    }

    #[tokio::test]
    async fn failed_database_delete_is_audited() {
        let dir = tempfile::tempdir().unwrap();
        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy("postgres://cuti@127.0.0.1:1/cuti")
            .unwrap();
        let config = crate::state::AppConfig {
            upload_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let state = AppState::with_config(config, Some(pool));
        let record = LeaveRecord {
            id: Uuid::new_v4(),
            personnel_id: Uuid::new_v4(),
            leave_type_id: Uuid::new_v4(),
            days_requested: 2,
            start_date: "2025-03-03".parse().unwrap(),
            reason: "sakit".into(),
            evidence_path: None,
            balance_remaining: 12,
            created_at: Utc::now(),
            created_by: None,
        };
        state.leave_records.insert(record.id, record.clone());

        let err = delete(&state, &caller(), &RequestMeta::default(), record.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(state.leave_records.contains(&record.id));

        let entries = state.audit_log.list();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "DELETE_IZIN");
        assert_eq!(entries[0].status, cuti_core::AuditOutcome::Failed);
        assert_eq!(entries[0].target.as_deref(), Some(record.id.to_string().as_str()));
    }
}
