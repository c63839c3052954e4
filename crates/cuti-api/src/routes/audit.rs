//! # Audit Trail API
//!
//! - **GET `/api/audit`** — newest-first audit entries with filters (admin+)

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use cuti_core::{AuditEntry, Role};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{contains_ci, extract_query, paginate};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AuditQuery {
    /// Matches detail, target or username.
    pub search: Option<String>,
    /// Substring of the action code, e.g. `IZIN`.
    pub action: Option<String>,
    pub role: Option<String>,
    pub category: Option<String>,
    /// `success` or `failed`.
    pub status: Option<String>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditPage {
    pub total: usize,
    pub items: Vec<AuditEntry>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/audit", get(list_audit))
}

fn active(filter: &Option<String>) -> Option<&str> {
    filter
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty() && *f != "all")
}

fn select(state: &AppState, q: &AuditQuery) -> Vec<AuditEntry> {
    let search = active(&q.search).map(str::to_lowercase);
    let action = active(&q.action).map(str::to_uppercase);
    let role = active(&q.role);
    let category = active(&q.category);
    let status = active(&q.status);

    let mut entries = state.audit_log.filter(|e| {
        search.as_deref().map_or(true, |s| {
            contains_ci(&e.detail, s)
                || e.target.as_deref().is_some_and(|t| contains_ci(t, s))
                || e.actor_username.as_deref().is_some_and(|u| contains_ci(u, s))
        }) && action.as_deref().map_or(true, |a| e.action.contains(a))
            && role.map_or(true, |r| e.actor_role.is_some_and(|er| er.as_str() == r))
            && category.map_or(true, |c| e.category == c)
            && status.map_or(true, |s| e.status.as_str() == s)
    });
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries
}

/// GET /api/audit — Query the audit trail.
#[utoipa::path(
    get,
    path = "/api/audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit entries, newest first", body = AuditPage),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorBody),
    ),
    tag = "audit"
)]
async fn list_audit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> Result<Json<AuditPage>, AppError> {
    require_role(&caller, Role::Admin)?;
    let q = extract_query(query)?;
    let (total, items) = paginate(select(&state, &q), q.skip, q.limit);
    Ok(Json(AuditPage { total, items }))
}
