//! # Leave Type Registry API
//!
//! - **GET `/api/leave-types`** — list types by name, optionally including
//!   inactive ones or filtered to those applicable to a gender
//! - **GET `/api/leave-types/:id`** — fetch one type
//! - **POST `/api/leave-types`** — create (admin+)
//! - **PUT `/api/leave-types/:id`** — partial update (admin+)
//! - **DELETE `/api/leave-types/:id`** — deactivate (admin+); records that
//!   reference the type are untouched

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use cuti_core::registry::{validate_leave_type_fields, DEFAULT_COLOR};
use cuti_core::{Gender, LeaveType, Role};
use serde::{Deserialize, Deserializer};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::audit::{self, AuditAction, AuditEvent, RequestMeta};
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, Validate};
use crate::notify::{ChangeAction, Entity};
use crate::state::AppState;

// ── DTOs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct LeaveTypeQuery {
    #[serde(default)]
    pub include_inactive: bool,
    /// `L` or `P`: only types usable by that gender.
    pub gender: Option<Gender>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLeaveTypeRequest {
    pub name: String,
    pub code: String,
    pub default_quota: i32,
    pub gender_specific: Option<Gender>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
}

impl Validate for CreateLeaveTypeRequest {
    fn validate(&self) -> Result<(), String> {
        validate_leave_type_fields(
            Some(&self.name),
            Some(&self.code),
            Some(self.default_quota),
            self.color.as_deref(),
        )
        .map_err(|e| e.to_string())
    }
}

/// Distinguishes an absent field from an explicit `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateLeaveTypeRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    pub default_quota: Option<i32>,
    /// `null` removes the restriction; absent keeps it.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<Gender>)]
    pub gender_specific: Option<Option<Gender>>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
}

impl Validate for UpdateLeaveTypeRequest {
    fn validate(&self) -> Result<(), String> {
        validate_leave_type_fields(
            self.name.as_deref(),
            self.code.as_deref(),
            self.default_quota,
            self.color.as_deref(),
        )
        .map_err(|e| e.to_string())
    }
}

// ── Router ──────────────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/leave-types",
            get(list_leave_types).post(create_leave_type),
        )
        .route(
            "/api/leave-types/:id",
            get(get_leave_type)
                .put(update_leave_type)
                .delete(deactivate_leave_type),
        )
}

/// Name or code already used by a type other than `except`.
fn collision(state: &AppState, name: &str, code: &str, except: Option<Uuid>) -> Option<AppError> {
    state
        .leave_types
        .find(|lt| Some(lt.id) != except && (lt.name == name || lt.code == code))
        .map(|lt| {
            let field = if lt.name == name { "name" } else { "code" };
            AppError::Conflict(format!(
                "a leave type with this {field} already exists ({})",
                lt.code
            ))
        })
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// GET /api/leave-types — List leave types.
#[utoipa::path(
    get,
    path = "/api/leave-types",
    params(LeaveTypeQuery),
    responses((status = 200, description = "Leave types by name", body = Vec<LeaveType>)),
    tag = "leave-types"
)]
async fn list_leave_types(
    State(state): State<AppState>,
    query: Result<Query<LeaveTypeQuery>, QueryRejection>,
) -> Result<Json<Vec<LeaveType>>, AppError> {
    let q = extract_query(query)?;
    let mut types = state.leave_types.filter(|lt| {
        (q.include_inactive || lt.is_active)
            && q.gender
                .map_or(true, |g| lt.gender_specific.map_or(true, |req| req == g))
    });
    types.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(types))
}

/// GET /api/leave-types/:id — Fetch a leave type.
#[utoipa::path(
    get,
    path = "/api/leave-types/{id}",
    params(("id" = Uuid, Path, description = "Leave type ID")),
    responses(
        (status = 200, description = "Leave type", body = LeaveType),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "leave-types"
)]
async fn get_leave_type(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LeaveType>, AppError> {
    state
        .leave_types
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("leave type {id} not found")))
}

/// POST /api/leave-types — Create a leave type.
#[utoipa::path(
    post,
    path = "/api/leave-types",
    request_body = CreateLeaveTypeRequest,
    responses(
        (status = 201, description = "Created", body = LeaveType),
        (status = 409, description = "Name or code taken", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "leave-types"
)]
async fn create_leave_type(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    body: Result<Json<CreateLeaveTypeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LeaveType>), AppError> {
    require_role(&caller, Role::Admin)?;

    let leave_type = match create_leave_type_inner(&state, body).await {
        Ok(leave_type) => leave_type,
        Err(e) => {
            audit::record(
                &state,
                &caller,
                &meta,
                AuditEvent::rejected(AuditAction::CreateLeaveType, &e),
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
            AuditAction::CreateLeaveType,
            format!(
                "Created leave type {} (quota {} days)",
                leave_type.name, leave_type.default_quota
            ),
        )
        .target("LeaveType", &leave_type.code),
    )
    .await;
    state.notifier.notify_change(
        Entity::LeaveTypes,
        ChangeAction::Create,
        &caller.username,
        Some(leave_type.id.to_string()),
        None,
    );
    Ok((StatusCode::CREATED, Json(leave_type)))
}

async fn create_leave_type_inner(
    state: &AppState,
    body: Result<Json<CreateLeaveTypeRequest>, JsonRejection>,
) -> Result<LeaveType, AppError> {
    let req = extract_validated_json(body)?;
    let name = req.name.trim().to_string();

    let _guard = state.write_locks.leave_types.lock().await;
    if let Some(err) = collision(state, &name, &req.code, None) {
        return Err(err);
    }

    let leave_type = LeaveType {
        id: Uuid::new_v4(),
        name,
        code: req.code,
        default_quota: req.default_quota,
        gender_specific: req.gender_specific,
        color: req.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        is_active: req.is_active.unwrap_or(true),
        created_at: Utc::now(),
    };
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::leave_types::insert(pool, &leave_type).await {
            tracing::error!(code = %leave_type.code, error = %e, "failed to persist leave type");
            return Err(e.into());
        }
    }
    state.leave_types.insert(leave_type.id, leave_type.clone());
    Ok(leave_type)
}

/// PUT /api/leave-types/:id — Update a leave type.
#[utoipa::path(
    put,
    path = "/api/leave-types/{id}",
    params(("id" = Uuid, Path, description = "Leave type ID")),
    request_body = UpdateLeaveTypeRequest,
    responses(
        (status = 200, description = "Updated", body = LeaveType),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Name or code taken", body = crate::error::ErrorBody),
    ),
    tag = "leave-types"
)]
async fn update_leave_type(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateLeaveTypeRequest>, JsonRejection>,
) -> Result<Json<LeaveType>, AppError> {
    require_role(&caller, Role::Admin)?;

    let leave_type = match update_leave_type_inner(&state, id, body).await {
        Ok(leave_type) => leave_type,
        Err(e) => {
            audit::record(
                &state,
                &caller,
                &meta,
                AuditEvent::rejected(AuditAction::UpdateLeaveType, &e)
                    .target("LeaveType", id.to_string()),
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
            AuditAction::UpdateLeaveType,
            format!("Updated leave type {}", leave_type.name),
        )
        .target("LeaveType", &leave_type.code),
    )
    .await;
    state.notifier.notify_change(
        Entity::LeaveTypes,
        ChangeAction::Update,
        &caller.username,
        Some(id.to_string()),
        None,
    );
    Ok(Json(leave_type))
}

async fn update_leave_type_inner(
    state: &AppState,
    id: Uuid,
    body: Result<Json<UpdateLeaveTypeRequest>, JsonRejection>,
) -> Result<LeaveType, AppError> {
    let req = extract_validated_json(body)?;

    let _guard = state.write_locks.leave_types.lock().await;
    let mut leave_type = state
        .leave_types
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("leave type {id} not found")))?;

    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .unwrap_or(&leave_type.name)
        .to_string();
    let code = req.code.clone().unwrap_or_else(|| leave_type.code.clone());
    if let Some(err) = collision(state, &name, &code, Some(id)) {
        return Err(err);
    }

    leave_type.name = name;
    leave_type.code = code;
    if let Some(quota) = req.default_quota {
        leave_type.default_quota = quota;
    }
    if let Some(gender) = req.gender_specific {
        leave_type.gender_specific = gender;
    }
    if let Some(color) = req.color {
        leave_type.color = color;
    }
    if let Some(active) = req.is_active {
        leave_type.is_active = active;
    }

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::leave_types::update(pool, &leave_type).await {
            tracing::error!(leave_type_id = %id, error = %e, "failed to persist leave type update");
            return Err(e.into());
        }
    }
    state.leave_types.insert(id, leave_type.clone());
    Ok(leave_type)
}

/// DELETE /api/leave-types/:id — Deactivate a leave type.
#[utoipa::path(
    delete,
    path = "/api/leave-types/{id}",
    params(("id" = Uuid, Path, description = "Leave type ID")),
    responses(
        (status = 204, description = "Deactivated"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "leave-types"
)]
async fn deactivate_leave_type(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Admin)?;

    let leave_type = match deactivate_leave_type_inner(&state, id).await {
        Ok(leave_type) => leave_type,
        Err(e) => {
            audit::record(
                &state,
                &caller,
                &meta,
                AuditEvent::rejected(AuditAction::DeleteLeaveType, &e)
                    .target("LeaveType", id.to_string()),
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
            AuditAction::DeleteLeaveType,
            format!("Deactivated leave type {}", leave_type.name),
        )
        .target("LeaveType", &leave_type.code),
    )
    .await;
    state.notifier.notify_change(
        Entity::LeaveTypes,
        ChangeAction::Delete,
        &caller.username,
        Some(id.to_string()),
        None,
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn deactivate_leave_type_inner(state: &AppState, id: Uuid) -> Result<LeaveType, AppError> {
    let _guard = state.write_locks.leave_types.lock().await;
    let mut leave_type = state
        .leave_types
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("leave type {id} not found")))?;
    leave_type.is_active = false;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::leave_types::update(pool, &leave_type).await {
            tracing::error!(leave_type_id = %id, error = %e, "failed to deactivate leave type");
            return Err(e.into());
        }
    }
    state.leave_types.insert(id, leave_type.clone());
    Ok(leave_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_distinguishes_null_from_absent() {
        let req: UpdateLeaveTypeRequest =
            serde_json::from_str(r#"{"gender_specific": null}"#).unwrap();
        assert_eq!(req.gender_specific, Some(None));
        let req: UpdateLeaveTypeRequest = serde_json::from_str(r#"{"name": "Cuti"}"#).unwrap();
        assert_eq!(req.gender_specific, None);
        let req: UpdateLeaveTypeRequest =
            serde_json::from_str(r#"{"gender_specific": "P"}"#).unwrap();
        assert_eq!(req.gender_specific, Some(Some(Gender::Female)));
    }

    #[test]
    fn create_rejects_bad_code_and_color() {
        let mut req = CreateLeaveTypeRequest {
            name: "Cuti Besar".into(),
            code: "cuti_besar".into(),
            default_quota: 90,
            gender_specific: None,
            color: Some("teal".into()),
            is_active: None,
        };
        assert!(req.validate().is_ok());
        req.code = "Cuti Besar".into();
        assert!(req.validate().is_err());
        req.code = "cuti_besar".into();
        req.color = Some("magenta".into());
        assert!(req.validate().is_err());
    }

    #[tokio::test]
    async fn collision_ignores_the_type_itself() {
        let state = AppState::new();
        state.seed_leave_types_if_empty().await.unwrap();
        let annual = state.leave_types.find(|lt| lt.code == "cuti_tahunan").unwrap();
        assert!(collision(&state, &annual.name, &annual.code, Some(annual.id)).is_none());
        assert!(matches!(
            collision(&state, "Lain", &annual.code, None),
            Some(AppError::Conflict(_))
        ));
    }
}
