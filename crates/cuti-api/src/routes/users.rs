//! # User Accounts API
//!
//! - **GET `/api/users`** — list accounts (admin+)
//! - **POST `/api/users`** — create an account (super_admin)
//! - **GET `/api/users/me`** — the caller's profile
//! - **PUT `/api/users/me/password`** — change the caller's own password
//! - **PUT `/api/users/:id`** — update profile; role and status are
//!   super_admin-only
//! - **POST `/api/users/:id/reset-password`** — issue a temporary password
//!   (super_admin)

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use cuti_core::{Role, User, UserStatus};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::audit::{self, AuditAction, AuditEvent, RequestMeta};
use crate::auth::{
    check_password_policy, hash_password, require_role, temporary_password, verify_password,
    CallerIdentity,
};
use crate::error::AppError;
use crate::extractors::{
    contains_ci, extract_query, extract_validated_json, paginate, Validate,
};
use crate::notify::{ChangeAction, Entity};
use crate::state::AppState;

// ── DTOs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, IntoParams)]
pub struct UserQuery {
    /// Matches username, full name or email.
    pub search: Option<String>,
    /// `all` disables the filter.
    pub role: Option<String>,
    pub status: Option<String>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserPage {
    pub total: usize,
    pub items: Vec<User>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: Option<String>,
    pub role: Role,
    pub status: Option<UserStatus>,
}

fn validate_username(username: &str) -> Result<(), String> {
    let ok = (3..=50).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if ok {
        Ok(())
    } else {
        Err("username must be 3-50 characters of letters, digits, '.', '_' or '-'".into())
    }
}

fn validate_email(email: &str) -> Result<(), String> {
    let trimmed = email.trim();
    match trimmed.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && domain.contains('.') && trimmed.len() <= 100 =>
        {
            Ok(())
        }
        _ => Err(format!("email '{trimmed}' is not valid")),
    }
}

impl Validate for CreateUserRequest {
    fn validate(&self) -> Result<(), String> {
        validate_username(&self.username)?;
        if self.full_name.trim().is_empty() || self.full_name.len() > 100 {
            return Err("full_name must be 1-100 characters".into());
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        check_password_policy(&self.password).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.full_name {
            if name.trim().is_empty() || name.len() > 100 {
                return Err("full_name must be 1-100 characters".into());
            }
        }
        if let Some(email) = self.email.as_deref().filter(|e| !e.trim().is_empty()) {
            validate_email(email)?;
        }
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            check_password_policy(password).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl Validate for ChangePasswordRequest {
    fn validate(&self) -> Result<(), String> {
        check_password_policy(&self.new_password).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResetPasswordResponse {
    pub message: String,
    /// Shown once; the account should change it at next login.
    pub temporary_password: String,
}

// ── Router ──────────────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/me", get(me))
        .route("/api/users/me/password", put(change_password))
        .route("/api/users/:id", put(update_user))
        .route("/api/users/:id/reset-password", post(reset_password))
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// GET /api/users — List accounts.
#[utoipa::path(
    get,
    path = "/api/users",
    params(UserQuery),
    responses(
        (status = 200, description = "Accounts", body = UserPage),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn list_users(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<UserPage>, AppError> {
    require_role(&caller, Role::Admin)?;
    let q = extract_query(query)?;
    let search = q.search.as_deref().map(str::to_lowercase);
    let role = q.role.filter(|r| r != "all");
    let status = q.status.filter(|s| s != "all");

    let mut users = state.users.filter(|u| {
        let matches_search = search.as_deref().map_or(true, |s| {
            contains_ci(&u.username, s)
                || contains_ci(&u.full_name, s)
                || u.email.as_deref().is_some_and(|e| contains_ci(e, s))
        });
        matches_search
            && role.as_deref().map_or(true, |r| u.role.as_str() == r)
            && status.as_deref().map_or(true, |st| u.status.as_str() == st)
    });
    users.sort_by(|a, b| a.username.cmp(&b.username));
    let (total, items) = paginate(users, q.skip, q.limit);
    Ok(Json(UserPage { total, items }))
}

/// POST /api/users — Create an account.
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 409, description = "Username or email taken", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn create_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), AppError> {
    require_role(&caller, Role::SuperAdmin)?;

    let user = match create_user_inner(&state, body).await {
        Ok(user) => user,
        Err(e) => {
            audit::record(
                &state,
                &caller,
                &meta,
                AuditEvent::rejected(AuditAction::CreateUser, &e),
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
            AuditAction::CreateUser,
            format!("Created user with role {}", user.role),
        )
        .target("User", &user.username),
    )
    .await;
    state.notifier.notify_change(
        Entity::Users,
        ChangeAction::Create,
        &caller.username,
        Some(user.id.to_string()),
        None,
    );
    Ok((StatusCode::CREATED, Json(user)))
}

async fn create_user_inner(
    state: &AppState,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<User, AppError> {
    let req = extract_validated_json(body)?;
    let email = req
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());

    let _guard = state.write_locks.users.lock().await;
    if state.user_by_username(&req.username).is_some() {
        return Err(AppError::Conflict(format!(
            "username '{}' is already registered",
            req.username
        )));
    }
    if let Some(email) = &email {
        if state.users.any(|u| u.email.as_deref() == Some(email.as_str())) {
            return Err(AppError::Conflict(format!("email '{email}' is already registered")));
        }
    }

    let user = User {
        id: Uuid::new_v4(),
        username: req.username,
        password_hash: hash_password(&req.password, state.config.bcrypt_cost).await?,
        full_name: req.full_name.trim().to_string(),
        email,
        role: req.role,
        status: req.status.unwrap_or(UserStatus::Active),
        last_active: None,
        created_at: Utc::now(),
    };

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::users::insert(pool, &user).await {
            tracing::error!(username = %user.username, error = %e, "failed to persist user");
            return Err(e.into());
        }
    }
    state.users.insert(user.id, user.clone());
    Ok(user)
}

/// GET /api/users/me — The caller's own account.
#[utoipa::path(
    get,
    path = "/api/users/me",
    responses((status = 200, description = "Caller profile", body = User)),
    tag = "users"
)]
async fn me(State(state): State<AppState>, caller: CallerIdentity) -> Result<Json<User>, AppError> {
    state
        .users
        .get(&caller.user_id)
        .map(Json)
        .ok_or_else(|| AppError::Unauthorized("account no longer exists".into()))
}

/// PUT /api/users/:id — Update an account.
///
/// Anyone may edit their own name, email and password. Editing another
/// account, or any role or status, requires super_admin; a super_admin
/// cannot change their own role or status.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Account updated", body = User),
        (status = 403, description = "Not permitted", body = crate::error::ErrorBody),
        (status = 404, description = "Account not found", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn update_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    if caller.user_id != id {
        require_role(&caller, Role::SuperAdmin)?;
    }

    let (user, changed) = match update_user_inner(&state, &caller, id, body).await {
        Ok(done) => done,
        Err(e) => {
            audit::record(
                &state,
                &caller,
                &meta,
                AuditEvent::rejected(AuditAction::UpdateUser, &e).target("User", id.to_string()),
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
            AuditAction::UpdateUser,
            format!("Updated user profile: {}", changed.join(", ")),
        )
        .target("User", &user.username),
    )
    .await;
    state.notifier.notify_change(
        Entity::Users,
        ChangeAction::Update,
        &caller.username,
        Some(id.to_string()),
        None,
    );
    Ok(Json(user))
}

/// Apply a profile update, returning the account and the fields changed.
async fn update_user_inner(
    state: &AppState,
    caller: &CallerIdentity,
    id: Uuid,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<(User, Vec<&'static str>), AppError> {
    let req = extract_validated_json(body)?;
    if req.role.is_some() || req.status.is_some() {
        require_role(caller, Role::SuperAdmin)?;
        if caller.user_id == id {
            return Err(AppError::Forbidden(
                "cannot change your own role or status".into(),
            ));
        }
    }

    let _guard = state.write_locks.users.lock().await;
    let mut user = state
        .users
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;

    let mut changed = Vec::new();
    if let Some(name) = &req.full_name {
        user.full_name = name.trim().to_string();
        changed.push("full_name");
    }
    if let Some(email) = &req.email {
        let email = Some(email.trim().to_string()).filter(|e| !e.is_empty());
        if let Some(e) = &email {
            if state
                .users
                .any(|u| u.id != id && u.email.as_deref() == Some(e.as_str()))
            {
                return Err(AppError::Conflict(format!("email '{e}' is already registered")));
            }
        }
        user.email = email;
        changed.push("email");
    }
    if let Some(password) = req.password.as_deref().filter(|p| !p.is_empty()) {
        user.password_hash = hash_password(password, state.config.bcrypt_cost).await?;
        changed.push("password");
    }
    if let Some(role) = req.role {
        user.role = role;
        changed.push("role");
    }
    if let Some(status) = req.status {
        user.status = status;
        changed.push("status");
    }

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::users::update(pool, &user).await {
            tracing::error!(user_id = %id, error = %e, "failed to persist user update");
            return Err(e.into());
        }
    }
    state.users.insert(id, user.clone());
    Ok((user, changed))
}

/// PUT /api/users/me/password — Change the caller's password.
#[utoipa::path(
    put,
    path = "/api/users/me/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Current password wrong", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn change_password(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let event = match change_password_inner(&state, &caller, body).await {
        Ok(()) => AuditEvent::success(AuditAction::ChangePassword, "Changed own password"),
        Err(e) => {
            audit::record(
                &state,
                &caller,
                &meta,
                AuditEvent::rejected(AuditAction::ChangePassword, &e)
                    .target("User", &caller.username),
            )
            .await;
            return Err(e);
        }
    };

    audit::record(&state, &caller, &meta, event.target("User", &caller.username)).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_password_inner(
    state: &AppState,
    caller: &CallerIdentity,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<(), AppError> {
    let req = extract_validated_json(body)?;
    let mut user = state
        .users
        .get(&caller.user_id)
        .ok_or_else(|| AppError::Unauthorized("account no longer exists".into()))?;

    if !verify_password(&req.current_password, &user.password_hash).await? {
        return Err(AppError::BadRequest("current password is incorrect".into()));
    }
    user.password_hash = hash_password(&req.new_password, state.config.bcrypt_cost).await?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::users::update(pool, &user).await {
            tracing::error!(user_id = %user.id, error = %e, "failed to persist password change");
            return Err(e.into());
        }
    }
    state
        .users
        .update(&user.id, |u| u.password_hash = user.password_hash.clone());
    Ok(())
}

/// POST /api/users/:id/reset-password — Replace a password with a random one.
#[utoipa::path(
    post,
    path = "/api/users/{id}/reset-password",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Temporary password issued", body = ResetPasswordResponse),
        (status = 404, description = "Account not found", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn reset_password(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<ResetPasswordResponse>, AppError> {
    require_role(&caller, Role::SuperAdmin)?;

    let (user, temporary) = match reset_password_inner(&state, id).await {
        Ok(done) => done,
        Err(e) => {
            audit::record(
                &state,
                &caller,
                &meta,
                AuditEvent::rejected(AuditAction::ResetPassword, &e)
                    .target("User", id.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    audit::record(
        &state,
        &caller,
        &meta,
        AuditEvent::success(AuditAction::ResetPassword, "Reset user password")
            .target("User", &user.username),
    )
    .await;
    Ok(Json(ResetPasswordResponse {
        message: "Password reset successfully".into(),
        temporary_password: temporary,
    }))
}

/// Replace the password, returning the account and the plain temporary one.
async fn reset_password_inner(state: &AppState, id: Uuid) -> Result<(User, String), AppError> {
    let mut user = state
        .users
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;

    let temporary = temporary_password();
    user.password_hash = hash_password(&temporary, state.config.bcrypt_cost).await?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::users::update(pool, &user).await {
            tracing::error!(user_id = %id, error = %e, "failed to persist password reset");
            return Err(e.into());
        }
    }
    state
        .users
        .update(&id, |u| u.password_hash = user.password_hash.clone());
    Ok((user, temporary))
}
