//! # Leave Records API
//!
//! - **GET `/api/leaves`** — filtered, sorted, paged records with both the
//!   stored snapshot balance and, by default, the progressive balance
//! - **POST `/api/leaves`** — record leave (multipart, admin+)
//! - **GET `/api/leaves/recent`** — the caller's five latest entries
//! - **GET `/api/leaves/:id`** — one record
//! - **PUT `/api/leaves/:id`** — edit (multipart, admin+)
//! - **DELETE `/api/leaves/:id`** — remove (admin+)

use std::collections::HashMap;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use cuti_core::{LeaveRecord, Role};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::audit::RequestMeta;
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{contains_ci, extract_query, paginate, read_multipart};
use crate::leaves::{self, LeaveForm, LeaveRecordView};
use crate::routes::personnel::SortOrder;
use crate::state::AppState;

const RECENT_LIMIT: usize = 5;

// ── DTOs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LeaveSort {
    #[default]
    StartDate,
    CreatedAt,
    DaysRequested,
    Name,
}

/// Which balance the list carries besides the stored snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BalanceView {
    #[default]
    Progressive,
    Snapshot,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct LeaveQuery {
    /// Matches personnel name or NRP, leave type name, or reason.
    pub q: Option<String>,
    /// Leave type code.
    pub leave_type: Option<String>,
    pub creator_id: Option<Uuid>,
    /// Earliest start date, inclusive.
    pub start_date: Option<NaiveDate>,
    /// Latest start date, inclusive.
    pub end_date: Option<NaiveDate>,
    pub sort_by: Option<LeaveSort>,
    /// Defaults to `desc`.
    pub order: Option<SortOrder>,
    pub balance: Option<BalanceView>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

/// Multipart leave form. On update every field is optional.
#[derive(Debug, ToSchema)]
pub struct LeaveUpload {
    pub nrp: Option<String>,
    /// Leave type id or code.
    pub leave_type_id: Option<String>,
    pub days_requested: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub reason: Option<String>,
    /// JPG, PNG or PDF evidence.
    #[schema(value_type = Option<String>, format = Binary)]
    pub file: Option<Vec<u8>>,
    /// Update only: drop the current evidence.
    pub remove_file: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LeaveRecordPage {
    pub total: usize,
    pub items: Vec<LeaveRecordView>,
}

// ── Router ──────────────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/leaves", get(list_leaves).post(create_leave))
        .route("/api/leaves/recent", get(recent_leaves))
        .route(
            "/api/leaves/:id",
            get(get_leave).put(update_leave).delete(delete_leave),
        )
}

fn filter_and_sort(state: &AppState, q: &LeaveQuery) -> Vec<LeaveRecord> {
    let needle = q
        .q
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);
    let type_id = q
        .leave_type
        .as_deref()
        .filter(|c| !c.is_empty() && *c != "all")
        .map(|code| state.leave_types.find(|lt| lt.code == code).map(|lt| lt.id));
    let people: HashMap<Uuid, (String, String)> = state
        .personnel
        .list()
        .into_iter()
        .map(|p| (p.id, (p.name, p.nrp)))
        .collect();
    let type_names: HashMap<Uuid, String> = state
        .leave_types
        .list()
        .into_iter()
        .map(|lt| (lt.id, lt.name))
        .collect();

    let mut records = state.leave_records.filter(|r| {
        let matches_q = needle.as_deref().map_or(true, |n| {
            people
                .get(&r.personnel_id)
                .is_some_and(|(name, nrp)| contains_ci(name, n) || contains_ci(nrp, n))
                || type_names
                    .get(&r.leave_type_id)
                    .is_some_and(|t| contains_ci(t, n))
                || contains_ci(&r.reason, n)
        });
        // An unknown code matches nothing.
        let matches_type = match type_id {
            None => true,
            Some(Some(id)) => r.leave_type_id == id,
            Some(None) => false,
        };
        matches_q
            && matches_type
            && q.creator_id.map_or(true, |c| r.created_by == Some(c))
            && q.start_date.map_or(true, |d| r.start_date >= d)
            && q.end_date.map_or(true, |d| r.start_date <= d)
    });

    let name_of = |r: &LeaveRecord| {
        people
            .get(&r.personnel_id)
            .map(|(name, _)| name.clone())
            .unwrap_or_default()
    };
    match q.sort_by.unwrap_or_default() {
        LeaveSort::StartDate => records.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then(a.created_at.cmp(&b.created_at))
        }),
        LeaveSort::CreatedAt => records.sort_by_key(|r| r.created_at),
        LeaveSort::DaysRequested => records.sort_by_key(|r| r.days_requested),
        LeaveSort::Name => records.sort_by_cached_key(name_of),
    }
    if q.order.unwrap_or(SortOrder::Desc) == SortOrder::Desc {
        records.reverse();
    }
    records
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// GET /api/leaves — List leave records.
#[utoipa::path(
    get,
    path = "/api/leaves",
    params(LeaveQuery),
    responses((status = 200, description = "Leave records", body = LeaveRecordPage)),
    tag = "leaves"
)]
async fn list_leaves(
    State(state): State<AppState>,
    query: Result<Query<LeaveQuery>, QueryRejection>,
) -> Result<Json<LeaveRecordPage>, AppError> {
    let q = extract_query(query)?;
    let records = filter_and_sort(&state, &q);
    let (total, page) = paginate(records, q.skip, q.limit);
    let progressive = q.balance.unwrap_or_default() == BalanceView::Progressive;
    Ok(Json(LeaveRecordPage {
        total,
        items: leaves::views(&state, page, progressive),
    }))
}

/// GET /api/leaves/recent — The caller's latest entries.
#[utoipa::path(
    get,
    path = "/api/leaves/recent",
    responses((status = 200, description = "Latest entries by the caller", body = Vec<LeaveRecordView>)),
    tag = "leaves"
)]
async fn recent_leaves(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Json<Vec<LeaveRecordView>> {
    let mut mine = state
        .leave_records
        .filter(|r| r.created_by == Some(caller.user_id));
    mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    mine.truncate(RECENT_LIMIT);
    Json(leaves::views(&state, mine, false))
}

/// GET /api/leaves/:id — Fetch one record.
#[utoipa::path(
    get,
    path = "/api/leaves/{id}",
    params(("id" = Uuid, Path, description = "Leave record ID")),
    responses(
        (status = 200, description = "Leave record", body = LeaveRecordView),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "leaves"
)]
async fn get_leave(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LeaveRecordView>, AppError> {
    let record = state
        .leave_records
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("leave record {id} not found")))?;
    Ok(Json(leaves::view(&state, record, None)))
}

/// POST /api/leaves — Record leave.
///
/// Multipart fields: `nrp`, `leave_type_id` (id or code), `days_requested`,
/// `start_date`, `reason`, optional `file` (JPG, PNG or PDF).
#[utoipa::path(
    post,
    path = "/api/leaves",
    request_body(
        content = LeaveUpload,
        content_type = "multipart/form-data",
        description = "Leave form with optional evidence file"
    ),
    responses(
        (status = 201, description = "Recorded", body = LeaveRecordView),
        (status = 400, description = "Quota exceeded or rule violated",
            body = crate::error::ErrorBody),
        (status = 404, description = "Unknown personnel or leave type",
            body = crate::error::ErrorBody),
    ),
    tag = "leaves"
)]
async fn create_leave(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    multipart: Multipart,
) -> Result<(StatusCode, Json<LeaveRecordView>), AppError> {
    require_role(&caller, Role::Admin)?;
    let form = LeaveForm::from_multipart(read_multipart(multipart, "file").await?)?;
    let view = leaves::create(&state, &caller, &meta, form).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// PUT /api/leaves/:id — Edit a record.
///
/// Same fields as create, all optional, plus `remove_file=true` to drop the
/// current evidence.
#[utoipa::path(
    put,
    path = "/api/leaves/{id}",
    params(("id" = Uuid, Path, description = "Leave record ID")),
    request_body(
        content = LeaveUpload,
        content_type = "multipart/form-data",
        description = "Changed fields"
    ),
    responses(
        (status = 200, description = "Updated", body = LeaveRecordView),
        (status = 400, description = "Quota exceeded or rule violated",
            body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "leaves"
)]
async fn update_leave(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<LeaveRecordView>, AppError> {
    require_role(&caller, Role::Admin)?;
    let form = LeaveForm::from_multipart(read_multipart(multipart, "file").await?)?;
    leaves::update(&state, &caller, &meta, id, form).await.map(Json)
}

/// DELETE /api/leaves/:id — Remove a record and its evidence.
#[utoipa::path(
    delete,
    path = "/api/leaves/{id}",
    params(("id" = Uuid, Path, description = "Leave record ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "leaves"
)]
async fn delete_leave(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Admin)?;
    leaves::delete(&state, &caller, &meta, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cuti_core::{Gender, Personnel};

    fn seed(state: &AppState, name: &str, nrp: &str) -> Personnel {
        let p = Personnel {
            id: Uuid::new_v4(),
            nrp: nrp.into(),
            name: name.into(),
            rank: "BRIPKA".into(),
            position: "BA".into(),
            department: None,
            gender: Some(Gender::Male),
            created_at: Utc::now(),
        };
        state.personnel.insert(p.id, p.clone());
        p
    }

    fn record(state: &AppState, p: &Personnel, code: &str, days: i32, start: &str) -> LeaveRecord {
        let lt = state.leave_types.find(|lt| lt.code == code).unwrap();
        let r = LeaveRecord {
            id: Uuid::new_v4(),
            personnel_id: p.id,
            leave_type_id: lt.id,
            days_requested: days,
            start_date: start.parse().unwrap(),
            reason: "keluarga".into(),
            evidence_path: None,
            balance_remaining: 0,
            created_at: Utc::now(),
            created_by: None,
        };
        state.leave_records.insert(r.id, r.clone());
        r
    }

    #[tokio::test]
    async fn filters_by_type_code_and_date_range() {
        let state = AppState::new();
        state.seed_leave_types_if_empty().await.unwrap();
        let budi = seed(&state, "Budi", "85011001");
        let sari = seed(&state, "Sari", "99020202");
        record(&state, &budi, "cuti_tahunan", 2, "2025-01-10");
        record(&state, &budi, "sakit", 1, "2025-02-10");
        record(&state, &sari, "cuti_tahunan", 3, "2025-03-10");

        let q = LeaveQuery {
            leave_type: Some("cuti_tahunan".into()),
            ..Default::default()
        };
        let found = filter_and_sort(&state, &q);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].personnel_id, sari.id, "default order is newest start first");

        let q = LeaveQuery {
            start_date: Some("2025-02-01".parse().unwrap()),
            end_date: Some("2025-02-28".parse().unwrap()),
            ..Default::default()
        };
        assert_eq!(filter_and_sort(&state, &q).len(), 1);

        let q = LeaveQuery {
            q: Some("sari".into()),
            ..Default::default()
        };
        assert_eq!(filter_and_sort(&state, &q).len(), 1);

        let q = LeaveQuery {
            leave_type: Some("tidak_ada".into()),
            ..Default::default()
        };
        assert!(filter_and_sort(&state, &q).is_empty());
    }

    #[tokio::test]
    async fn sorts_by_name_ascending() {
        let state = AppState::new();
        state.seed_leave_types_if_empty().await.unwrap();
        let budi = seed(&state, "Budi", "85011001");
        let ani = seed(&state, "Ani", "99020202");
        record(&state, &budi, "sakit", 1, "2025-01-10");
        record(&state, &ani, "sakit", 1, "2025-02-10");

        let q = LeaveQuery {
            sort_by: Some(LeaveSort::Name),
            order: Some(SortOrder::Asc),
            ..Default::default()
        };
        let found = filter_and_sort(&state, &q);
        assert_eq!(found[0].personnel_id, ani.id);
    }
}
