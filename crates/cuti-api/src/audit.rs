//! # Audit Sink
//!
//! Append-only record of every mutating attempt that passed authorization,
//! plus logins. Entries are written after the data change they describe has
//! committed; a failed audit write is logged at `warn` and never unwinds the
//! change.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use axum::http::header;
use chrono::Utc;
use cuti_core::{AuditEntry, AuditOutcome, Role};
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::state::AppState;

/// Audit action codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    // Authentication
    Login,
    LoginFailed,
    ChangePassword,

    // Users
    CreateUser,
    UpdateUser,
    ResetPassword,

    // Leave types
    CreateLeaveType,
    UpdateLeaveType,
    DeleteLeaveType,

    // Roster
    CreatePersonnel,
    UpdatePersonnel,
    DeletePersonnel,
    ImportPersonnel,

    // Leave records
    InputIzin,
    UpdateIzin,
    DeleteIzin,

    // Calendar and reports
    CreateHoliday,
    DeleteHoliday,
    ExportReport,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::ChangePassword => "CHANGE_PASSWORD",
            Self::CreateUser => "CREATE_USER",
            Self::UpdateUser => "UPDATE_USER",
            Self::ResetPassword => "RESET_PASSWORD",
            Self::CreateLeaveType => "CREATE_LEAVE_TYPE",
            Self::UpdateLeaveType => "UPDATE_LEAVE_TYPE",
            Self::DeleteLeaveType => "DELETE_LEAVE_TYPE",
            Self::CreatePersonnel => "CREATE_PERSONNEL",
            Self::UpdatePersonnel => "UPDATE_PERSONNEL",
            Self::DeletePersonnel => "DELETE_PERSONNEL",
            Self::ImportPersonnel => "IMPORT_PERSONNEL",
            Self::InputIzin => "INPUT_IZIN",
            Self::UpdateIzin => "UPDATE_IZIN",
            Self::DeleteIzin => "DELETE_IZIN",
            Self::CreateHoliday => "CREATE_HOLIDAY",
            Self::DeleteHoliday => "DELETE_HOLIDAY",
            Self::ExportReport => "EXPORT_REPORT",
        }
    }

    /// Category shown in the audit console.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Login | Self::LoginFailed | Self::ChangePassword => "Authentication",
            Self::CreateUser | Self::UpdateUser | Self::ResetPassword => "User Management",
            Self::CreateLeaveType | Self::UpdateLeaveType | Self::DeleteLeaveType => {
                "Leave Type Management"
            }
            Self::CreatePersonnel
            | Self::UpdatePersonnel
            | Self::DeletePersonnel
            | Self::ImportPersonnel => "Personnel Management",
            Self::InputIzin | Self::UpdateIzin | Self::DeleteIzin => "Leave Management",
            Self::CreateHoliday | Self::DeleteHoliday => "Holiday Management",
            Self::ExportReport => "Reports",
        }
    }
}

/// Who performed an audited action.
#[derive(Debug, Clone, Default)]
pub struct AuditActor {
    pub id: Option<Uuid>,
    pub username: Option<String>,
    pub role: Option<Role>,
}

impl From<&CallerIdentity> for AuditActor {
    fn from(caller: &CallerIdentity) -> Self {
        Self {
            id: Some(caller.user_id),
            username: Some(caller.username.clone()),
            role: Some(caller.role),
        }
    }
}

impl AuditActor {
    /// An unauthenticated actor known only by the name they presented.
    pub fn anonymous(username: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            ..Self::default()
        }
    }
}

/// What happened.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub target: Option<String>,
    pub target_type: Option<&'static str>,
    pub detail: String,
    pub status: AuditOutcome,
}

impl AuditEvent {
    pub fn success(action: AuditAction, detail: impl Into<String>) -> Self {
        Self {
            action,
            target: None,
            target_type: None,
            detail: detail.into(),
            status: AuditOutcome::Success,
        }
    }

    pub fn failed(action: AuditAction, detail: impl Into<String>) -> Self {
        Self {
            status: AuditOutcome::Failed,
            ..Self::success(action, detail)
        }
    }

    /// Failed attempt described by the error it produced. Internal error
    /// details stay in the logs.
    pub fn rejected(action: AuditAction, err: &AppError) -> Self {
        let detail = match err {
            AppError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        Self::failed(action, detail)
    }

    pub fn target(mut self, target_type: &'static str, target: impl Into<String>) -> Self {
        self.target_type = Some(target_type);
        self.target = Some(target.into());
        self
    }
}

// ── Request metadata ────────────────────────────────────────────────────────

/// Client address and user agent of the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn from_parts(parts: &Parts) -> Self {
        let header_str = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let ip_address = header_str("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .or_else(|| header_str("x-real-ip").map(str::to_string))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            });
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.chars().take(255).collect());
        Self {
            ip_address,
            user_agent,
        }
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for RequestMeta {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

// ── Sink ────────────────────────────────────────────────────────────────────

/// Append an audit entry. Never fails the caller.
pub async fn record(
    state: &AppState,
    actor: impl Into<AuditActor>,
    meta: &RequestMeta,
    event: AuditEvent,
) -> AuditEntry {
    let actor = actor.into();
    let entry = AuditEntry {
        id: Uuid::new_v4(),
        actor_id: actor.id,
        actor_username: actor.username,
        actor_role: actor.role,
        action: event.action.as_str().to_string(),
        category: event.action.category().to_string(),
        target: event.target,
        target_type: event.target_type.map(str::to_string),
        detail: event.detail,
        status: event.status,
        ip_address: meta.ip_address.clone(),
        user_agent: meta.user_agent.clone(),
        timestamp: Utc::now(),
    };

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::audit::insert(pool, &entry).await {
            tracing::warn!(
                audit_id = %entry.id,
                action = %entry.action,
                error = %e,
                "failed to persist audit entry"
            );
        }
    }
    state.audit_log.insert(entry.id, entry.clone());

    tracing::info!(
        action = %entry.action,
        actor = entry.actor_username.as_deref().unwrap_or("-"),
        status = entry.status.as_str(),
        "audit"
    );
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn action_codes_and_categories() {
        assert_eq!(AuditAction::InputIzin.as_str(), "INPUT_IZIN");
        assert_eq!(AuditAction::InputIzin.category(), "Leave Management");
        assert_eq!(AuditAction::DeleteLeaveType.as_str(), "DELETE_LEAVE_TYPE");
        assert_eq!(AuditAction::DeleteLeaveType.category(), "Leave Type Management");
        assert_eq!(AuditAction::LoginFailed.category(), "Authentication");
    }

    #[test]
    fn meta_prefers_forwarded_for() {
        let (parts, _) = Request::builder()
            .header("x-forwarded-for", "10.0.0.7, 172.16.0.1")
            .header("user-agent", "curl/8.0")
            .body(())
            .unwrap()
            .into_parts();
        let meta = RequestMeta::from_parts(&parts);
        assert_eq!(meta.ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn meta_falls_back_to_connect_info() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 5], 4000))));
        assert_eq!(
            RequestMeta::from_parts(&parts).ip_address.as_deref(),
            Some("192.168.1.5")
        );
    }

    #[tokio::test]
    async fn record_appends_in_memory() {
        let state = AppState::new();
        let caller = CallerIdentity {
            user_id: Uuid::new_v4(),
            username: "admin".into(),
            role: Role::Admin,
        };
        let entry = record(
            &state,
            &caller,
            &RequestMeta::default(),
            AuditEvent::failed(AuditAction::InputIzin, "quota exceeded")
                .target("Personnel", "85011001"),
        )
        .await;

        assert_eq!(state.audit_log.len(), 1);
        assert_eq!(entry.status, AuditOutcome::Failed);
        assert_eq!(entry.category, "Leave Management");
        assert_eq!(entry.target.as_deref(), Some("85011001"));
        assert_eq!(entry.actor_role, Some(Role::Admin));
    }

    #[test]
    fn rejected_hides_internal_details() {
        let event = AuditEvent::rejected(
            AuditAction::DeleteIzin,
            &AppError::Internal("connection reset by peer".into()),
        );
        assert_eq!(event.status, AuditOutcome::Failed);
        assert_eq!(event.detail, "internal error");

        let event = AuditEvent::rejected(
            AuditAction::UpdateLeaveType,
            &AppError::NotFound("leave type x not found".into()),
        );
        assert_eq!(event.detail, "leave type x not found");
    }
}
