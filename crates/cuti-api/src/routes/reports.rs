//! # Reports API
//!
//! - **GET `/api/reports/summary`** — totals over a filtered set of records
//! - **GET `/api/reports/export`** — leave report for a year or month as
//!   `.xlsx` or `.csv`

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Datelike, NaiveDate, Utc};
use cuti_core::LeaveRecord;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::audit::{self, AuditAction, AuditEvent, RequestMeta};
use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::extract_query;
use crate::leaves::{self, LeaveRecordView};
use crate::spreadsheet::{write_report_csv, write_report_xlsx, ReportRow};
use crate::state::AppState;

// ── Summary ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SummaryQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub department: Option<String>,
    /// Leave type code.
    pub leave_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportSummary {
    pub total_records: usize,
    pub total_days: i64,
    pub unique_personnel: usize,
    pub data: Vec<LeaveRecordView>,
}

// ── Export ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Excel,
    Csv,
    Pdf,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ExportQuery {
    pub format: ExportFormat,
    pub year: Option<i32>,
    /// 1-12; requires or defaults `year` to the current year.
    pub month: Option<u32>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/reports/summary", get(report_summary))
        .route("/api/reports/export", get(export_report))
}

fn active(filter: &Option<String>) -> Option<&str> {
    filter.as_deref().filter(|f| !f.is_empty() && *f != "all")
}

pub fn summarize(state: &AppState, q: &SummaryQuery) -> ReportSummary {
    let department = active(&q.department);
    let type_id = active(&q.leave_type).map(|code| {
        state
            .leave_types
            .find(|lt| lt.code == code)
            .map(|lt| lt.id)
    });
    let mut records = state.leave_records.filter(|r| {
        q.start_date.map_or(true, |d| r.start_date >= d)
            && q.end_date.map_or(true, |d| r.start_date <= d)
            && type_id.map_or(true, |id| Some(r.leave_type_id) == id)
            && department.map_or(true, |dep| {
                state
                    .personnel
                    .get(&r.personnel_id)
                    .is_some_and(|p| p.department.as_deref() == Some(dep))
            })
    });
    records.sort_by(|a, b| b.start_date.cmp(&a.start_date));

    let total_days = records.iter().map(|r| i64::from(r.days_requested)).sum();
    let mut people: Vec<_> = records.iter().map(|r| r.personnel_id).collect();
    people.sort();
    people.dedup();

    ReportSummary {
        total_records: records.len(),
        total_days,
        unique_personnel: people.len(),
        data: leaves::views(state, records, false),
    }
}

/// GET /api/reports/summary — Aggregate figures over a selection.
#[utoipa::path(
    get,
    path = "/api/reports/summary",
    params(SummaryQuery),
    responses((status = 200, description = "Summary", body = ReportSummary)),
    tag = "reports"
)]
async fn report_summary(
    State(state): State<AppState>,
    query: Result<Query<SummaryQuery>, QueryRejection>,
) -> Result<Json<ReportSummary>, AppError> {
    let q = extract_query(query)?;
    Ok(Json(summarize(&state, &q)))
}

/// Report rows for the period, ordered by start date.
pub fn report_rows(state: &AppState, year: Option<i32>, month: Option<u32>) -> Vec<ReportRow> {
    let mut records: Vec<LeaveRecord> = state.leave_records.filter(|r| {
        year.map_or(true, |y| r.start_date.year() == y)
            && month.map_or(true, |m| r.start_date.month() == m)
    });
    records.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.created_at.cmp(&b.created_at)));

    records
        .into_iter()
        .filter_map(|r| {
            let person = state.personnel.get(&r.personnel_id)?;
            let type_name = state
                .leave_types
                .get(&r.leave_type_id)
                .map(|lt| lt.name)
                .unwrap_or_default();
            Some(ReportRow {
                name: person.name,
                rank: person.rank,
                nrp: person.nrp,
                position: person.position,
                leave: format!("{type_name} ({} hari)", r.days_requested),
                reason: r.reason,
            })
        })
        .collect()
}

/// GET /api/reports/export — Download the leave report.
#[utoipa::path(
    get,
    path = "/api/reports/export",
    params(ExportQuery),
    responses(
        (status = 200, description = "Report file", content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        (status = 400, description = "Unsupported format", body = crate::error::ErrorBody),
        (status = 404, description = "No data for the period", body = crate::error::ErrorBody),
    ),
    tag = "reports"
)]
async fn export_report(
    State(state): State<AppState>,
    caller: CallerIdentity,
    meta: RequestMeta,
    query: Result<Query<ExportQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let q = extract_query(query)?;
    if let Some(month) = q.month {
        if !(1..=12).contains(&month) {
            return Err(AppError::Validation("month must be between 1 and 12".into()));
        }
    }
    if q.format == ExportFormat::Pdf {
        return Err(AppError::BadRequest(
            "PDF export is not available; use format=excel or format=csv".into(),
        ));
    }
    let year = match (q.year, q.month) {
        (None, Some(_)) => Some(Utc::now().year()),
        (year, _) => year,
    };

    let rows = report_rows(&state, year, q.month);
    if rows.is_empty() {
        return Err(AppError::NotFound(
            "No data found for the selected period".into(),
        ));
    }

    let period = format!(
        "{}_{}",
        year.map_or_else(|| "All".to_string(), |y| y.to_string()),
        q.month.map_or_else(|| "All".to_string(), |m| m.to_string())
    );
    let (bytes, content_type, ext) = match q.format {
        ExportFormat::Csv => (write_report_csv(&rows)?, "text/csv; charset=utf-8", "csv"),
        _ => {
            let title = format!("LAPORAN DATA IZIN/CUTI PERSONEL - {}", period.replace('_', "/"));
            (
                write_report_xlsx(&title, &rows)?,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "xlsx",
            )
        }
    };
    let filename = format!("Laporan_Izin_{period}.{ext}");

    audit::record(
        &state,
        &caller,
        &meta,
        AuditEvent::success(
            AuditAction::ExportReport,
            format!("Exported {} rows to {filename}", rows.len()),
        ),
    )
    .await;

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}
