//! # Personnel Directory API
//!
//! - **GET `/api/personnel`** — filtered, sorted, paged roster
//! - **POST `/api/personnel`** — add one member (admin+)
//! - **GET `/api/personnel/:nrp`** — look up by service number
//! - **PUT `/api/personnel/:nrp`** — edit a member (admin+)
//! - **DELETE `/api/personnel/:nrp`** — remove a member and their leave
//!   records (admin+)
//! - **GET `/api/personnel/:nrp/balances`** — remaining quota per leave type
//! - **POST `/api/personnel/import`** — bulk upsert from `.xlsx`/`.csv` (admin+)
//! - **POST `/api/personnel/import/grid`** — bulk upsert from a JSON grid (admin+)

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Datelike, Utc};
use cuti_core::import::{apply_row, parse_roster, plan_import, ImportAction, ImportSummary};
use cuti_core::quota::balances;
use cuti_core::{Gender, LeaveBalance, LeaveRecord, Personnel, Role};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::audit::{self, AuditAction, AuditEvent, RequestMeta};
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{
    contains_ci, extract_json, extract_query, extract_validated_json, paginate, read_multipart,
    Validate,
};
use crate::notify::{ChangeAction, Entity};
use crate::state::AppState;

// ── DTOs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PersonnelSort {
    #[default]
    Name,
    Nrp,
    Rank,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PersonnelQuery {
    /// Matches name, NRP, rank, position or department.
    pub q: Option<String>,
    pub rank: Option<String>,
    pub position: Option<String>,
    pub department: Option<String>,
    pub sort_by: Option<PersonnelSort>,
    pub order: Option<SortOrder>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

/// Multipart roster upload.
#[derive(Debug, ToSchema)]
pub struct RosterUpload {
    /// `.xlsx` or `.csv` roster.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PersonnelPage {
    pub total: usize,
    pub items: Vec<Personnel>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePersonnelRequest {
    pub nrp: String,
    pub name: String,
    pub rank: String,
    pub position: String,
    pub department: Option<String>,
    pub gender: Option<Gender>,
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), String> {
    if value.trim().is_empty() || value.len() > max {
        return Err(format!("{field} must be between 1 and {max} characters"));
    }
    Ok(())
}

impl Validate for CreatePersonnelRequest {
    fn validate(&self) -> Result<(), String> {
        check_len("nrp", &self.nrp, 50)?;
        if self.nrp.trim().chars().any(char::is_whitespace) {
            return Err("nrp must not contain spaces".into());
        }
        check_len("name", &self.name, 200)?;
        check_len("rank", &self.rank, 100)?;
        check_len("position", &self.position, 200)
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdatePersonnelRequest {
    pub name: Option<String>,
    pub rank: Option<String>,
    pub position: Option<String>,
    /// An empty string clears the department.
    pub department: Option<String>,
    pub gender: Option<Gender>,
}

impl Validate for UpdatePersonnelRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            check_len("name", name, 200)?;
        }
        if let Some(rank) = &self.rank {
            check_len("rank", rank, 100)?;
        }
        if let Some(position) = &self.position {
            check_len("position", position, 200)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeletePersonnelResponse {
    pub nrp: String,
    pub removed_leave_records: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BalanceQuery {
    /// Defaults to the current year.
    pub year: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub nrp: String,
    pub name: String,
    pub year: i32,
    pub balances: Vec<LeaveBalance>,
}

/// Roster rows as a JSON grid of cells.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportGridRequest {
    pub rows: Vec<Vec<String>>,
}

// ── Router ──────────────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/personnel", get(list_personnel).post(create_personnel))
        .route("/api/personnel/import", post(import_file))
        .route("/api/personnel/import/grid", post(import_grid))
        .route(
            "/api/personnel/:nrp",
            get(get_personnel)
                .put(update_personnel)
                .delete(delete_personnel),
        )
        .route("/api/personnel/:nrp/balances", get(get_balances))
}

fn find_by_nrp(state: &AppState, nrp: &str) -> Result<Personnel, AppError> {
    state
        .personnel_by_nrp(nrp)
        .ok_or_else(|| AppError::NotFound(format!("personnel {nrp} not found")))
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// GET /api/personnel — List the roster.
#[utoipa::path(
    get,
    path = "/api/personnel",
    params(PersonnelQuery),
    responses((status = 200, description = "Roster page", body = PersonnelPage)),
    tag = "personnel"
)]
async fn list_personnel(
    State(state): State<AppState>,
    query: Result<Query<PersonnelQuery>, QueryRejection>,
) -> Result<Json<PersonnelPage>, AppError> {
    let q = extract_query(query)?;
    let needle = q.q.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase);
    let exact = |filter: &Option<String>, value: &str| {
        filter
            .as_deref()
            .filter(|f| !f.is_empty() && *f != "all")
            .map_or(true, |f| f == value)
    };

    let mut items = state.personnel.filter(|p| {
        let matches_q = needle.as_deref().map_or(true, |n| {
            contains_ci(&p.name, n)
                || contains_ci(&p.nrp, n)
                || contains_ci(&p.rank, n)
                || contains_ci(&p.position, n)
                || p.department.as_deref().is_some_and(|d| contains_ci(d, n))
        });
        matches_q
            && exact(&q.rank, &p.rank)
            && exact(&q.position, &p.position)
            && exact(&q.department, p.department.as_deref().unwrap_or_default())
    });

    match q.sort_by.unwrap_or_default() {
        PersonnelSort::Name => items.sort_by(|a, b| a.name.cmp(&b.name)),
        PersonnelSort::Nrp => items.sort_by(|a, b| a.nrp.cmp(&b.nrp)),
        PersonnelSort::Rank => items.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.name.cmp(&b.name))),
        PersonnelSort::CreatedAt => items.sort_by_key(|p| p.created_at),
    }
    if q.order.unwrap_or_default() == SortOrder::Desc {
        items.reverse();
    }

    let (total, items) = paginate(items, q.skip, q.limit);
    Ok(Json(PersonnelPage { total, items }))
}

/// GET /api/personnel/:nrp — Look up a member.
#[utoipa::path(
    get,
    path = "/api/personnel/{nrp}",
    params(("nrp" = String, Path, description = "Service number")),
    responses(
        (status = 200, description = "Member", body = Personnel),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "personnel"
)]
async fn get_personnel(
    State(state): State<AppState>,
    Path(nrp): Path<String>,
) -> Result<Json<Personnel>, AppError> {
    find_by_nrp(&state, &nrp).map(Json)
}

/// POST /api/personnel — Add a member.
#[utoipa::path(
    post,
    path = "/api/personnel",
    request_body = CreatePersonnelRequest,
    responses(
        (status = 201, description = "Created", body = Personnel),
        (status = 409, description = "NRP already registered", body = crate::error::ErrorBody),
    ),
    tag = "personnel"
)]
async fn create_personnel(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    body: Result<Json<CreatePersonnelRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Personnel>), AppError> {
    require_role(&caller, Role::Admin)?;

    let person = match create_personnel_inner(&state, body).await {
        Ok(person) => person,
        Err(e) => {
            audit::record(
                &state,
                &caller,
                &meta,
                AuditEvent::rejected(AuditAction::CreatePersonnel, &e),
            )
            .await;
            return Err(e);
        }
    };

    audit::record(
        &state,
        &caller,
        &meta,
        AuditEvent::success(
            AuditAction::CreatePersonnel,
            format!("Added {} {}", person.rank, person.name),
        )
        .target("Personnel", &person.nrp),
    )
    .await;
    state.notifier.notify_change(
        Entity::Personnel,
        ChangeAction::Create,
        &caller.username,
        Some(person.nrp.clone()),
        None,
    );
    Ok((StatusCode::CREATED, Json(person)))
}

async fn create_personnel_inner(
    state: &AppState,
    body: Result<Json<CreatePersonnelRequest>, JsonRejection>,
) -> Result<Personnel, AppError> {
    let req = extract_validated_json(body)?;
    let nrp = req.nrp.trim().to_string();

    let _guard = state.write_locks.roster.lock().await;
    if state.personnel_by_nrp(&nrp).is_some() {
        return Err(AppError::Conflict(format!(
            "personnel with NRP {nrp} already exists"
        )));
    }

    let person = Personnel {
        id: Uuid::new_v4(),
        nrp,
        name: req.name.trim().to_string(),
        rank: req.rank.trim().to_string(),
        position: req.position.trim().to_string(),
        department: req
            .department
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        gender: req.gender,
        created_at: Utc::now(),
    };
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::personnel::insert(pool, &person).await {
            tracing::error!(nrp = %person.nrp, error = %e, "failed to persist personnel");
            return Err(e.into());
        }
    }
    state.personnel.insert(person.id, person.clone());
    Ok(person)
}

/// PUT /api/personnel/:nrp — Edit a member. The NRP itself cannot change.
#[utoipa::path(
    put,
    path = "/api/personnel/{nrp}",
    params(("nrp" = String, Path, description = "Service number")),
    request_body = UpdatePersonnelRequest,
    responses(
        (status = 200, description = "Updated", body = Personnel),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "personnel"
)]
async fn update_personnel(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    Path(nrp): Path<String>,
    body: Result<Json<UpdatePersonnelRequest>, JsonRejection>,
) -> Result<Json<Personnel>, AppError> {
    require_role(&caller, Role::Admin)?;

    let person = match update_personnel_inner(&state, &nrp, body).await {
        Ok(person) => person,
        Err(e) => {
            audit::record(
                &state,
                &caller,
                &meta,
                AuditEvent::rejected(AuditAction::UpdatePersonnel, &e).target("Personnel", &nrp),
            )
            .await;
            return Err(e);
        }
    };

    audit::record(
        &state,
        &caller,
        &meta,
        AuditEvent::success(AuditAction::UpdatePersonnel, format!("Updated {}", person.name))
            .target("Personnel", &nrp),
    )
    .await;
    state.notifier.notify_change(
        Entity::Personnel,
        ChangeAction::Update,
        &caller.username,
        Some(nrp),
        None,
    );
    Ok(Json(person))
}

async fn update_personnel_inner(
    state: &AppState,
    nrp: &str,
    body: Result<Json<UpdatePersonnelRequest>, JsonRejection>,
) -> Result<Personnel, AppError> {
    let req = extract_validated_json(body)?;

    let _guard = state.write_locks.roster.lock().await;
    let mut person = find_by_nrp(state, nrp)?;
    if let Some(name) = req.name {
        person.name = name.trim().to_string();
    }
    if let Some(rank) = req.rank {
        person.rank = rank.trim().to_string();
    }
    if let Some(position) = req.position {
        person.position = position.trim().to_string();
    }
    if let Some(department) = req.department {
        person.department = Some(department.trim().to_string()).filter(|d| !d.is_empty());
    }
    if let Some(gender) = req.gender {
        person.gender = Some(gender);
    }

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::personnel::update(pool, &person).await {
            tracing::error!(nrp = %nrp, error = %e, "failed to persist personnel update");
            return Err(e.into());
        }
    }
    state.personnel.insert(person.id, person.clone());
    Ok(person)
}

/// DELETE /api/personnel/:nrp — Remove a member with their leave history.
#[utoipa::path(
    delete,
    path = "/api/personnel/{nrp}",
    params(("nrp" = String, Path, description = "Service number")),
    responses(
        (status = 200, description = "Removed", body = DeletePersonnelResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "personnel"
)]
async fn delete_personnel(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    Path(nrp): Path<String>,
) -> Result<Json<DeletePersonnelResponse>, AppError> {
    require_role(&caller, Role::Admin)?;

    let (person, removed) = match delete_personnel_inner(&state, &nrp).await {
        Ok(done) => done,
        Err(e) => {
            audit::record(
                &state,
                &caller,
                &meta,
                AuditEvent::rejected(AuditAction::DeletePersonnel, &e).target("Personnel", &nrp),
            )
            .await;
            return Err(e);
        }
    };

    for path in removed.iter().filter_map(|r| r.evidence_path.as_deref()) {
        state.evidence.remove(path).await;
    }

    audit::record(
        &state,
        &caller,
        &meta,
        AuditEvent::success(
            AuditAction::DeletePersonnel,
            format!(
                "Deleted {} {} and {} leave records",
                person.rank,
                person.name,
                removed.len()
            ),
        )
        .target("Personnel", &nrp),
    )
    .await;
    state.notifier.notify_change(
        Entity::Personnel,
        ChangeAction::Delete,
        &caller.username,
        Some(nrp.clone()),
        Some(serde_json::json!({ "removed_leave_records": removed.len() })),
    );
    Ok(Json(DeletePersonnelResponse {
        nrp,
        removed_leave_records: removed.len(),
    }))
}

/// Remove the member, then their records. Leave writers check membership
/// while holding the record map, so nothing is inserted for a removed
/// member.
async fn delete_personnel_inner(
    state: &AppState,
    nrp: &str,
) -> Result<(Personnel, Vec<LeaveRecord>), AppError> {
    let _guard = state.write_locks.roster.lock().await;
    let person = find_by_nrp(state, nrp)?;
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::personnel::delete(pool, person.id).await {
            tracing::error!(nrp = %nrp, error = %e, "failed to delete personnel from database");
            return Err(e.into());
        }
    }
    state.personnel.remove(&person.id);
    let removed = state
        .leave_records
        .remove_where(|r| r.personnel_id == person.id);
    Ok((person, removed))
}

/// GET /api/personnel/:nrp/balances — Remaining quota per applicable type.
#[utoipa::path(
    get,
    path = "/api/personnel/{nrp}/balances",
    params(("nrp" = String, Path, description = "Service number"), BalanceQuery),
    responses(
        (status = 200, description = "Balances", body = BalanceResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "personnel"
)]
async fn get_balances(
    State(state): State<AppState>,
    Path(nrp): Path<String>,
    query: Result<Query<BalanceQuery>, QueryRejection>,
) -> Result<Json<BalanceResponse>, AppError> {
    let year = extract_query(query)?
        .year
        .unwrap_or_else(|| Utc::now().date_naive().year());
    let person = find_by_nrp(&state, &nrp)?;
    let records = state
        .leave_records
        .filter(|r| r.personnel_id == person.id);
    let types = state.leave_types.list();
    Ok(Json(BalanceResponse {
        balances: balances(&person, &types, &records, year),
        nrp: person.nrp,
        name: person.name,
        year,
    }))
}

// ── Import ──────────────────────────────────────────────────────────────────

/// POST /api/personnel/import — Upsert the roster from a spreadsheet.
#[utoipa::path(
    post,
    path = "/api/personnel/import",
    request_body(
        content = RosterUpload,
        content_type = "multipart/form-data",
        description = "Roster spreadsheet"
    ),
    responses(
        (status = 200, description = "Import summary", body = ImportSummary),
        (status = 400, description = "Unreadable file or no header row",
            body = crate::error::ErrorBody),
    ),
    tag = "personnel"
)]
async fn import_file(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    multipart: Multipart,
) -> Result<Json<ImportSummary>, AppError> {
    require_role(&caller, Role::Admin)?;
    let form = read_multipart(multipart, "file").await?;
    let file = form
        .file
        .ok_or_else(|| AppError::Validation("field 'file' is required".into()))?;
    let grid = crate::spreadsheet::read_grid(&file)?;
    let source = file.file_name.unwrap_or_else(|| "upload".into());
    run_import(&state, &caller, &meta, &grid, &source).await.map(Json)
}

/// POST /api/personnel/import/grid — Upsert the roster from JSON rows.
#[utoipa::path(
    post,
    path = "/api/personnel/import/grid",
    request_body = ImportGridRequest,
    responses(
        (status = 200, description = "Import summary", body = ImportSummary),
        (status = 400, description = "No header row", body = crate::error::ErrorBody),
    ),
    tag = "personnel"
)]
async fn import_grid(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    body: Result<Json<ImportGridRequest>, JsonRejection>,
) -> Result<Json<ImportSummary>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_json(body)?;
    run_import(&state, &caller, &meta, &req.rows, "grid").await.map(Json)
}

/// Plan and apply an import in one pass under the roster lock.
pub async fn run_import(
    state: &AppState,
    caller: &CallerIdentity,
    meta: &RequestMeta,
    grid: &[Vec<String>],
    source: &str,
) -> Result<ImportSummary, AppError> {
    let entries = match parse_roster(grid) {
        Ok(entries) => entries,
        Err(e) => {
            let err = AppError::from(e);
            audit::record(
                state,
                caller,
                meta,
                AuditEvent::failed(
                    AuditAction::ImportPersonnel,
                    format!("Import of {source} rejected: {err}"),
                ),
            )
            .await;
            return Err(err);
        }
    };

    let guard = state.write_locks.roster.lock().await;
    let plan = plan_import(entries, |nrp| state.personnel_by_nrp(nrp));
    let now = Utc::now();
    let mut inserts = Vec::new();
    let mut updates = Vec::new();
    for action in plan.actions {
        match action {
            ImportAction::Insert(row) => inserts.push(Personnel {
                id: Uuid::new_v4(),
                nrp: row.nrp,
                name: row.name,
                rank: row.rank,
                position: row.position,
                department: row.department,
                gender: row.gender,
                created_at: now,
            }),
            ImportAction::Update { id, row } => {
                if let Some(mut person) = state.personnel.get(&id) {
                    apply_row(&mut person, &row);
                    updates.push(person);
                }
            }
        }
    }

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::personnel::apply_batch(pool, &inserts, &updates).await {
            tracing::error!(source, error = %e, "failed to persist roster import");
            return Err(e.into());
        }
    }
    for person in inserts.iter().chain(updates.iter()) {
        state.personnel.insert(person.id, person.clone());
    }
    drop(guard);

    let summary = plan.summary;
    tracing::info!(
        source,
        added = summary.added,
        updated = summary.updated,
        skipped = summary.skipped,
        unresolved = summary.unresolved,
        "roster imported"
    );
    audit::record(
        state,
        caller,
        meta,
        AuditEvent::success(
            AuditAction::ImportPersonnel,
            format!(
                "Imported {source}: {} added, {} updated, {} skipped, {} unresolved",
                summary.added, summary.updated, summary.skipped, summary.unresolved
            ),
        ),
    )
    .await;
    state.notifier.notify_change(
        Entity::Personnel,
        ChangeAction::Import,
        &caller.username,
        None,
        Some(serde_json::json!({
            "added": summary.added,
            "updated": summary.updated,
            "skipped": summary.skipped,
        })),
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> CallerIdentity {
        CallerIdentity {
            user_id: Uuid::new_v4(),
            username: "admin".into(),
            role: Role::Admin,
        }
    }

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[tokio::test]
    async fn import_inserts_then_updates() {
        let state = AppState::new();
        let meta = RequestMeta::default();
        let first = grid(&[
            &["NO", "NAMA", "PANGKAT / NRP", "JABATAN"],
            &["1", "Budi", "BRIPKA / 85011001", "BA SIUM"],
            &["2", "Sari", "BRIPDA / 99020202", "BA SPKT"],
        ]);
        let summary = run_import(&state, &admin(), &meta, &first, "grid").await.unwrap();
        assert_eq!((summary.added, summary.updated), (2, 0));
        assert_eq!(state.personnel.len(), 2);

        let second = grid(&[
            &["NO", "NAMA", "PANGKAT / NRP", "JABATAN"],
            &["1", "Budi", "AIPDA / 85011001", "BA SIUM"],
            &["2", "Sari", "BRIPDA / 99020202", "BA SPKT"],
        ]);
        let summary = run_import(&state, &admin(), &meta, &second, "grid").await.unwrap();
        assert_eq!((summary.added, summary.updated, summary.skipped), (0, 1, 1));
        assert_eq!(state.personnel_by_nrp("85011001").unwrap().rank, "AIPDA");
        assert_eq!(state.audit_log.len(), 2);
    }

    #[tokio::test]
    async fn import_without_header_is_rejected_and_audited() {
        let state = AppState::new();
        let err = run_import(
            &state,
            &admin(),
            &RequestMeta::default(),
            &grid(&[&["foo", "bar"]]),
            "grid",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(state.audit_log.len(), 1);
        assert!(state.personnel.is_empty());
    }

    #[test]
    fn create_request_rejects_spaces_in_nrp() {
        let req = CreatePersonnelRequest {
            nrp: "850 11001".into(),
            name: "Budi".into(),
            rank: "BRIPKA".into(),
            position: "BA".into(),
            department: None,
            gender: None,
        };
        assert!(req.validate().is_err());
    }
}
