//! # Login
//!
//! - **POST `/api/token`** — exchange form-encoded `username` and `password`
//!   for a bearer token.
//!
//! Mounted outside the auth middleware, behind the login rate limiter.

use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Form, Json, Router};
use chrono::Utc;
use cuti_core::Role;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::audit::{self, AuditAction, AuditActor, AuditEvent, RequestMeta};
use crate::auth::{verify_password, CallerIdentity};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `bearer`.
    pub token_type: String,
    pub role: Role,
    pub username: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/token", post(login))
}

/// POST /api/token — Authenticate and issue an access token.
#[utoipa::path(
    post,
    path = "/api/token",
    request_body(content = LoginRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Bad credentials", body = crate::error::ErrorBody),
        (status = 403, description = "Account inactive", body = crate::error::ErrorBody),
        (status = 429, description = "Too many attempts", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn login(
    State(state): State<AppState>,
    meta: RequestMeta,
    form: Result<Form<LoginRequest>, FormRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let Form(req) = form.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let username = req.username.trim().to_string();

    let user = state.user_by_username(&username);
    let verified = match &user {
        Some(u) => verify_password(&req.password, &u.password_hash).await?,
        None => false,
    };
    let user = match user {
        Some(u) if verified => u,
        _ => {
            audit::record(
                &state,
                AuditActor::anonymous(&username),
                &meta,
                AuditEvent::failed(AuditAction::LoginFailed, "Incorrect username or password")
                    .target("User", &username),
            )
            .await;
            return Err(AppError::Unauthorized(
                "Incorrect username or password".into(),
            ));
        }
    };

    let identity = CallerIdentity::of(&user);
    if !user.is_active() {
        audit::record(
            &state,
            &identity,
            &meta,
            AuditEvent::failed(AuditAction::LoginFailed, "Login attempt on inactive account")
                .target("User", &username),
        )
        .await;
        return Err(AppError::Forbidden("account is inactive".into()));
    }

    let now = Utc::now();
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::users::touch_last_active(pool, user.id, now).await {
            tracing::warn!(user = %username, error = %e, "failed to persist last_active");
        }
    }
    state.users.update(&user.id, |u| u.last_active = Some(now));

    let access_token = state.tokens.issue(&user)?;
    audit::record(
        &state,
        &identity,
        &meta,
        AuditEvent::success(AuditAction::Login, "Successful login to system")
            .target("User", &username),
    )
    .await;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        role: user.role,
        username: user.username,
    }))
}
