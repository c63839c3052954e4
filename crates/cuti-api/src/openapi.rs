//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec, served
//! at `/openapi.json` to authenticated callers.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "E-Cuti API",
        version = "0.3.0",
        description = "Personnel leave tracking: roster, leave types, quota-checked leave records, accounts, audit trail and reports.",
        license(name = "MIT")
    ),
    paths(
        // Authentication
        crate::routes::auth::login,
        // Users
        crate::routes::users::list_users,
        crate::routes::users::create_user,
        crate::routes::users::me,
        crate::routes::users::update_user,
        crate::routes::users::change_password,
        crate::routes::users::reset_password,
        // Leave types
        crate::routes::leave_types::list_leave_types,
        crate::routes::leave_types::get_leave_type,
        crate::routes::leave_types::create_leave_type,
        crate::routes::leave_types::update_leave_type,
        crate::routes::leave_types::deactivate_leave_type,
        // Personnel
        crate::routes::personnel::list_personnel,
        crate::routes::personnel::get_personnel,
        crate::routes::personnel::create_personnel,
        crate::routes::personnel::update_personnel,
        crate::routes::personnel::delete_personnel,
        crate::routes::personnel::get_balances,
        crate::routes::personnel::import_file,
        crate::routes::personnel::import_grid,
        // Leave records
        crate::routes::leave_records::list_leaves,
        crate::routes::leave_records::recent_leaves,
        crate::routes::leave_records::get_leave,
        crate::routes::leave_records::create_leave,
        crate::routes::leave_records::update_leave,
        crate::routes::leave_records::delete_leave,
        // Audit
        crate::routes::audit::list_audit,
        // Holidays
        crate::routes::holidays::list_holidays,
        crate::routes::holidays::create_holiday,
        crate::routes::holidays::delete_holiday,
        // Dashboard & reports
        crate::routes::dashboard::dashboard_stats,
        crate::routes::reports::report_summary,
        crate::routes::reports::export_report,
        // Notifications
        crate::routes::notifications::ws_handler,
    ),
    components(schemas(
        // Domain records
        cuti_core::Personnel,
        cuti_core::LeaveType,
        cuti_core::LeaveRecord,
        cuti_core::User,
        cuti_core::AuditEntry,
        cuti_core::AuditOutcome,
        cuti_core::Holiday,
        cuti_core::Gender,
        cuti_core::Role,
        cuti_core::UserStatus,
        cuti_core::LeaveBalance,
        cuti_core::import::ImportSummary,
        cuti_core::import::ImportDetail,
        cuti_core::import::ImportStatus,
        cuti_core::import::FieldChange,
        // Error types
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        // Views
        crate::leaves::LeaveRecordView,
        crate::notify::ChangeEvent,
        crate::notify::Entity,
        crate::notify::ChangeAction,
        // DTOs
        crate::routes::auth::LoginRequest,
        crate::routes::auth::TokenResponse,
        crate::routes::users::UserPage,
        crate::routes::users::CreateUserRequest,
        crate::routes::users::UpdateUserRequest,
        crate::routes::users::ChangePasswordRequest,
        crate::routes::users::ResetPasswordResponse,
        crate::routes::leave_types::CreateLeaveTypeRequest,
        crate::routes::leave_types::UpdateLeaveTypeRequest,
        crate::routes::personnel::PersonnelPage,
        crate::routes::personnel::PersonnelSort,
        crate::routes::personnel::SortOrder,
        crate::routes::personnel::CreatePersonnelRequest,
        crate::routes::personnel::UpdatePersonnelRequest,
        crate::routes::personnel::DeletePersonnelResponse,
        crate::routes::personnel::RosterUpload,
        crate::routes::personnel::BalanceResponse,
        crate::routes::personnel::ImportGridRequest,
        crate::routes::leave_records::LeaveRecordPage,
        crate::routes::leave_records::LeaveUpload,
        crate::routes::leave_records::LeaveSort,
        crate::routes::leave_records::BalanceView,
        crate::routes::audit::AuditPage,
        crate::routes::holidays::CreateHolidayRequest,
        crate::routes::dashboard::DashboardStats,
        crate::routes::dashboard::FrequentTaker,
        crate::routes::reports::ReportSummary,
        crate::routes::reports::ExportFormat,
    )),
    tags(
        (name = "auth", description = "Sign-in"),
        (name = "users", description = "Operator accounts"),
        (name = "leave-types", description = "Leave type registry"),
        (name = "personnel", description = "Personnel directory and roster import"),
        (name = "leaves", description = "Leave records with quota enforcement"),
        (name = "audit", description = "Audit trail"),
        (name = "holidays", description = "Holiday calendar"),
        (name = "dashboard", description = "Dashboard figures"),
        (name = "reports", description = "Summaries and exports"),
        (name = "notifications", description = "Live change notifications"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI JSON spec at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json — Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
