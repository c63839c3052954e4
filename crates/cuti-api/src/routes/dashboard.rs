//! # Dashboard API
//!
//! - **GET `/api/dashboard/stats`** — who is on leave today, the most
//!   frequent leave takers and the latest entries

use std::collections::HashMap;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::leaves::{self, LeaveRecordView};
use crate::state::AppState;

const TOP_FREQUENT: usize = 10;
const RECENT_ACTIVITY: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FrequentTaker {
    pub nrp: String,
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardStats {
    /// Records whose period covers today.
    pub total_leaves_today: usize,
    pub top_frequent: Vec<FrequentTaker>,
    pub recent_activity: Vec<LeaveRecordView>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/dashboard/stats", get(dashboard_stats))
}

pub fn compute_stats(state: &AppState, today: NaiveDate) -> DashboardStats {
    let records = state.leave_records.list();
    let total_leaves_today = records.iter().filter(|r| r.covers(today)).count();

    let mut counts: HashMap<Uuid, usize> = HashMap::new();
    for r in &records {
        *counts.entry(r.personnel_id).or_default() += 1;
    }
    let mut top_frequent: Vec<FrequentTaker> = counts
        .into_iter()
        .filter_map(|(id, count)| {
            state.personnel.get(&id).map(|p| FrequentTaker {
                nrp: p.nrp,
                name: p.name,
                count,
            })
        })
        .collect();
    top_frequent.sort_by(|a, b| b.count.cmp(&a.count).then(a.name.cmp(&b.name)));
    top_frequent.truncate(TOP_FREQUENT);

    let mut recent = records;
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    recent.truncate(RECENT_ACTIVITY);

    DashboardStats {
        total_leaves_today,
        top_frequent,
        recent_activity: leaves::views(state, recent, false),
    }
}

/// GET /api/dashboard/stats — Headline figures.
#[utoipa::path(
    get,
    path = "/api/dashboard/stats",
    responses((status = 200, description = "Dashboard figures", body = DashboardStats)),
    tag = "dashboard"
)]
async fn dashboard_stats(State(state): State<AppState>) -> Json<DashboardStats> {
    Json(compute_stats(&state, Utc::now().date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use cuti_core::{LeaveRecord, Personnel};

    #[test]
    fn counts_leave_covering_today() {
        let state = AppState::new();
        let p = Personnel {
            id: Uuid::new_v4(),
            nrp: "85011001".into(),
            name: "Budi".into(),
            rank: "BRIPKA".into(),
            position: "BA".into(),
            department: None,
            gender: None,
            created_at: Utc::now(),
        };
        state.personnel.insert(p.id, p.clone());
        let today: NaiveDate = "2025-05-10".parse().unwrap();
        let entries = [("2025-05-08", 3, 0), ("2025-05-08", 2, 1), ("2025-04-01", 1, 2)];
        for (start, days, offset) in entries {
            let r = LeaveRecord {
                id: Uuid::new_v4(),
                personnel_id: p.id,
                leave_type_id: Uuid::new_v4(),
                days_requested: days,
                start_date: start.parse().unwrap(),
                reason: String::new(),
                evidence_path: None,
                balance_remaining: 0,
                created_at: Utc::now() + Duration::seconds(offset),
                created_by: None,
            };
            state.leave_records.insert(r.id, r);
        }

        let stats = compute_stats(&state, today);
        assert_eq!(stats.total_leaves_today, 1);
        assert_eq!(
            stats.top_frequent,
            vec![FrequentTaker {
                nrp: "85011001".into(),
                name: "Budi".into(),
                count: 3
            }]
        );
        assert_eq!(stats.recent_activity.len(), 3);
        assert_eq!(stats.recent_activity[0].record.start_date.to_string(), "2025-04-01");
    }
}
