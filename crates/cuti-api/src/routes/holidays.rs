//! # Holiday Calendar API
//!
//! - **GET `/api/holidays`** — active holidays in a date range, ascending
//! - **POST `/api/holidays`** — add a holiday (admin+)
//! - **DELETE `/api/holidays/:id`** — remove a holiday (admin+)

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::NaiveDate;
use cuti_core::{Holiday, Role};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::audit::{self, AuditAction, AuditEvent, RequestMeta};
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, Validate};
use crate::notify::{ChangeAction, Entity};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct HolidayQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateHolidayRequest {
    pub date: NaiveDate,
    pub description: String,
}

impl Validate for CreateHolidayRequest {
    fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() || self.description.len() > 200 {
            return Err("description must be between 1 and 200 characters".into());
        }
        Ok(())
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/holidays", get(list_holidays).post(create_holiday))
        .route("/api/holidays/:id", delete(delete_holiday))
}

/// GET /api/holidays — Active holidays, earliest first.
#[utoipa::path(
    get,
    path = "/api/holidays",
    params(HolidayQuery),
    responses((status = 200, description = "Holidays", body = Vec<Holiday>)),
    tag = "holidays"
)]
async fn list_holidays(
    State(state): State<AppState>,
    query: Result<Query<HolidayQuery>, QueryRejection>,
) -> Result<Json<Vec<Holiday>>, AppError> {
    let q = extract_query(query)?;
    let mut holidays = state.holidays.filter(|h| {
        h.is_active
            && q.start_date.map_or(true, |d| h.date >= d)
            && q.end_date.map_or(true, |d| h.date <= d)
    });
    holidays.sort_by_key(|h| h.date);
    Ok(Json(holidays))
}

/// POST /api/holidays — Add a holiday.
#[utoipa::path(
    post,
    path = "/api/holidays",
    request_body = CreateHolidayRequest,
    responses(
        (status = 201, description = "Created", body = Holiday),
        (status = 409, description = "Date already has a holiday", body = crate::error::ErrorBody),
    ),
    tag = "holidays"
)]
async fn create_holiday(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    body: Result<Json<CreateHolidayRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Holiday>), AppError> {
    require_role(&caller, Role::Admin)?;

    let holiday = match create_holiday_inner(&state, body).await {
        Ok(holiday) => holiday,
        Err(e) => {
            audit::record(
                &state,
                &caller,
                &meta,
                AuditEvent::rejected(AuditAction::CreateHoliday, &e),
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
            AuditAction::CreateHoliday,
            format!("Added holiday {}: {}", holiday.date, holiday.description),
        )
        .target("Holiday", holiday.date.to_string()),
    )
    .await;
    state.notifier.notify_change(
        Entity::Holidays,
        ChangeAction::Create,
        &caller.username,
        Some(holiday.id.to_string()),
        None,
    );
    Ok((StatusCode::CREATED, Json(holiday)))
}

async fn create_holiday_inner(
    state: &AppState,
    body: Result<Json<CreateHolidayRequest>, JsonRejection>,
) -> Result<Holiday, AppError> {
    let req = extract_validated_json(body)?;

    let _guard = state.write_locks.holidays.lock().await;
    if state.holidays.any(|h| h.date == req.date) {
        return Err(AppError::Conflict(format!(
            "a holiday on {} already exists",
            req.date
        )));
    }
    let holiday = Holiday {
        id: Uuid::new_v4(),
        date: req.date,
        description: req.description.trim().to_string(),
        is_active: true,
    };
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::holidays::insert(pool, &holiday).await {
            tracing::error!(date = %holiday.date, error = %e, "failed to persist holiday");
            return Err(e.into());
        }
    }
    state.holidays.insert(holiday.id, holiday.clone());
    Ok(holiday)
}

/// DELETE /api/holidays/:id — Remove a holiday.
#[utoipa::path(
    delete,
    path = "/api/holidays/{id}",
    params(("id" = Uuid, Path, description = "Holiday ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "holidays"
)]
async fn delete_holiday(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Admin)?;

    let holiday = match delete_holiday_inner(&state, id).await {
        Ok(holiday) => holiday,
        Err(e) => {
            audit::record(
                &state,
                &caller,
                &meta,
                AuditEvent::rejected(AuditAction::DeleteHoliday, &e)
                    .target("Holiday", id.to_string()),
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
            AuditAction::DeleteHoliday,
            format!("Removed holiday {}: {}", holiday.date, holiday.description),
        )
        .target("Holiday", holiday.date.to_string()),
    )
    .await;
    state.notifier.notify_change(
        Entity::Holidays,
        ChangeAction::Delete,
        &caller.username,
        Some(id.to_string()),
        None,
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_holiday_inner(state: &AppState, id: Uuid) -> Result<Holiday, AppError> {
    let _guard = state.write_locks.holidays.lock().await;
    let holiday = state
        .holidays
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("holiday {id} not found")))?;
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::holidays::delete(pool, id).await {
            tracing::error!(holiday_id = %id, error = %e, "failed to delete holiday");
            return Err(e.into());
        }
    }
    state.holidays.remove(&id);
    Ok(holiday)
}
