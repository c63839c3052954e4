//! # Integration Tests for cuti-api
//!
//! Drives the assembled router end to end: sign-in, role checks, quota
//! enforcement on leave records, roster import, balances, leave type
//! uniqueness, reports and the OpenAPI document.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use cuti_api::state::{AppConfig, AppState};
use cuti_core::{AuditOutcome, Gender, Personnel, Role, User, UserStatus};

const BOUNDARY: &str = "cuti-test-boundary";

struct TestApp {
    state: AppState,
    admin_token: String,
    atasan_token: String,
    _uploads: tempfile::TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let config = AppConfig {
            upload_dir: uploads.path().to_path_buf(),
            bcrypt_cost: 4,
            ..Default::default()
        };
        let state = AppState::with_config(config, None);
        state.seed_leave_types_if_empty().await.unwrap();

        let admin = add_user(&state, "operator", "rahasia", Role::Admin);
        let atasan = add_user(&state, "kabag", "rahasia", Role::Atasan);
        add_personnel(&state, "85011001", "Budi Santoso", Some(Gender::Male));
        add_personnel(&state, "99020202", "Sari Dewi", Some(Gender::Female));

        Self {
            admin_token: state.tokens.issue(&admin).unwrap(),
            atasan_token: state.tokens.issue(&atasan).unwrap(),
            state,
            _uploads: uploads,
        }
    }

    fn router(&self) -> axum::Router {
        cuti_api::app(self.state.clone())
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .uri(uri)
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn post_json(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("authorization", format!("Bearer {token}"))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn put_json(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("PUT")
                .uri(uri)
                .header("authorization", format!("Bearer {token}"))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn post_leave(&self, token: &str, fields: &[(&str, &str)]) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/api/leaves")
                .header("authorization", format!("Bearer {token}"))
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart(fields, None)))
                .unwrap(),
        )
        .await
    }
}

fn add_user(state: &AppState, username: &str, password: &str, role: Role) -> User {
    let user = User {
        id: Uuid::new_v4(),
        username: username.into(),
        password_hash: bcrypt::hash(password, 4).unwrap(),
        full_name: username.to_uppercase(),
        email: None,
        role,
        status: UserStatus::Active,
        last_active: None,
        created_at: Utc::now(),
    };
    state.users.insert(user.id, user.clone());
    user
}

fn add_personnel(state: &AppState, nrp: &str, name: &str, gender: Option<Gender>) {
    let p = Personnel {
        id: Uuid::new_v4(),
        nrp: nrp.into(),
        name: name.into(),
        rank: "BRIPKA".into(),
        position: "BA SIUM".into(),
        department: Some("SIUM".into()),
        gender,
        created_at: Utc::now(),
    };
    state.personnel.insert(p.id, p);
}

/// Encode text fields and an optional `(file_name, content_type, bytes)` part.
fn multipart(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn leave_fields<'a>(
    nrp: &'a str,
    code: &'a str,
    days: &'a str,
    start: &'a str,
) -> Vec<(&'a str, &'a str)> {
    vec![
        ("nrp", nrp),
        ("leave_type_id", code),
        ("days_requested", days),
        ("start_date", start),
        ("reason", "keperluan keluarga"),
    ]
}

// -- Health Checks ------------------------------------------------------------

#[tokio::test]
async fn test_health_checks_need_no_auth() {
    let app = TestApp::new().await;
    for (uri, expected) in [("/health/liveness", "ok"), ("/health/readiness", "ready")] {
        let response = app
            .router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], expected.as_bytes());
    }
}

// -- Authentication -----------------------------------------------------------

#[tokio::test]
async fn test_login_issues_token_and_audits_failures() {
    let app = TestApp::new().await;
    let login = |password: &str| {
        Request::builder()
            .method("POST")
            .uri("/api/token")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(format!("username=operator&password={password}")))
            .unwrap()
    };

    let (status, body) = app.send(login("rahasia")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["role"], "admin");
    let token = body["access_token"].as_str().unwrap().to_string();
    let (status, me) = app.get("/api/users/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "operator");
    assert!(me.get("password_hash").is_none());

    let (status, body) = app.send(login("salah")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let actions: Vec<String> = app.state.audit_log.list().into_iter().map(|e| e.action).collect();
    assert!(actions.contains(&"LOGIN".to_string()));
    assert!(actions.contains(&"LOGIN_FAILED".to_string()));
}

#[tokio::test]
async fn test_protected_routes_require_bearer_token() {
    let app = TestApp::new().await;
    let (status, _) = app
        .send(Request::builder().uri("/api/leaves").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/leaves", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/openapi.json", &app.admin_token).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_atasan_cannot_record_leave() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post_leave(&app.atasan_token, &leave_fields("85011001", "cuti_tahunan", "2", "2025-03-01"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
    assert!(app.state.leave_records.is_empty());

    // Reads stay open to every role.
    let (status, _) = app.get("/api/leaves", &app.atasan_token).await;
    assert_eq!(status, StatusCode::OK);
}

// -- Quota Enforcement --------------------------------------------------------

#[tokio::test]
async fn test_annual_quota_is_enforced() {
    let app = TestApp::new().await;
    let token = app.admin_token.clone();

    let (status, body) = app
        .post_leave(&token, &leave_fields("85011001", "cuti_tahunan", "5", "2025-03-01"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["balance_remaining"], 7);
    assert_eq!(body["end_date"], "2025-03-05");
    assert_eq!(body["personnel"]["nrp"], "85011001");
    let first_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post_leave(&token, &leave_fields("85011001", "cuti_tahunan", "8", "2025-06-01"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "QUOTA_EXCEEDED");
    assert_eq!(body["error"]["details"]["remaining"], 7);
    assert_eq!(body["error"]["details"]["requested"], 8);

    // Editing excludes the record itself from usage.
    let (status, body) = app
        .send(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/leaves/{first_id}"))
                .header("authorization", format!("Bearer {token}"))
                .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
                .body(Body::from(multipart(&[("days_requested", "3")], None)))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance_remaining"], 9);

    let (status, body) = app
        .post_leave(&token, &leave_fields("85011001", "cuti_tahunan", "9", "2025-06-01"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["balance_remaining"], 0);

    // A new year starts with a fresh quota.
    let (status, body) = app
        .post_leave(&token, &leave_fields("85011001", "cuti_tahunan", "12", "2026-01-05"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["balance_remaining"], 0);
}

#[tokio::test]
async fn test_start_date_outside_calendar_range_rejected() {
    let app = TestApp::new().await;
    for start in ["+262142-12-31", "1899-12-31"] {
        let (status, body) = app
            .post_leave(&app.admin_token, &leave_fields("85011001", "sakit", "2", start))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "start {start}");
        assert!(body["error"]["message"].as_str().unwrap().contains("start_date"));
    }
    assert!(app.state.leave_records.is_empty());
}

#[tokio::test]
async fn test_gender_restricted_type_rejected() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post_leave(&app.admin_token, &leave_fields("85011001", "melahirkan", "30", "2025-03-01"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("gender P"));

    let (status, _) = app
        .post_leave(&app.admin_token, &leave_fields("99020202", "melahirkan", "30", "2025-03-01"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_unknown_personnel_and_type_are_not_found() {
    let app = TestApp::new().await;
    let (status, _) = app
        .post_leave(&app.admin_token, &leave_fields("00000000", "cuti_tahunan", "1", "2025-03-01"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .post_leave(&app.admin_token, &leave_fields("85011001", "cuti_bulan", "1", "2025-03-01"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_evidence_type_is_checked() {
    let app = TestApp::new().await;
    let fields = leave_fields("85011001", "sakit", "2", "2025-03-01");
    let (status, body) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/leaves")
                .header("authorization", format!("Bearer {}", app.admin_token))
                .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
                .body(Body::from(multipart(
                    &fields,
                    Some(("surat.exe", "application/x-msdownload", b"MZ")),
                )))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("JPG, PNG, PDF"));

    let (status, body) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/leaves")
                .header("authorization", format!("Bearer {}", app.admin_token))
                .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
                .body(Body::from(multipart(
                    &fields,
                    Some(("surat.pdf", "application/pdf", b"%PDF-1.4")),
                )))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let stored = body["evidence_path"].as_str().unwrap();
    assert!(stored.ends_with(".pdf"));
    assert!(app.state.evidence.exists(stored));
}

// -- Listing & Balances -------------------------------------------------------

#[tokio::test]
async fn test_list_carries_snapshot_and_progressive_balances() {
    let app = TestApp::new().await;
    let token = app.admin_token.clone();
    // Entered out of date order: the later leave first.
    app.post_leave(&token, &leave_fields("85011001", "istimewa", "3", "2025-05-01")).await;
    app.post_leave(&token, &leave_fields("85011001", "istimewa", "2", "2025-01-01")).await;

    let (status, page) = app.get("/api/leaves?sort_by=start_date&order=asc", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    let items = page["items"].as_array().unwrap();
    // Snapshots reflect entry order; progressive follows the calendar.
    assert_eq!(items[0]["start_date"], "2025-01-01");
    assert_eq!(items[0]["balance_remaining"], 3);
    assert_eq!(items[0]["progressive_remaining"], 6);
    assert_eq!(items[1]["balance_remaining"], 5);
    assert_eq!(items[1]["progressive_remaining"], 3);

    let (_, page) = app.get("/api/leaves?balance=snapshot", &token).await;
    assert!(page["items"][0].get("progressive_remaining").is_none());

    let (status, balances) = app.get("/api/personnel/85011001/balances?year=2025", &token).await;
    assert_eq!(status, StatusCode::OK);
    let istimewa = balances["balances"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["code"] == "istimewa")
        .unwrap();
    assert_eq!(istimewa["used"], 5);
    assert_eq!(istimewa["remaining"], 3);
    // Male personnel do not see the maternity type.
    assert!(balances["balances"]
        .as_array()
        .unwrap()
        .iter()
        .all(|b| b["code"] != "melahirkan"));
}

// -- Roster Import ------------------------------------------------------------

#[tokio::test]
async fn test_grid_import_upserts_roster() {
    let app = TestApp::new().await;
    let grid = json!({
        "rows": [
            ["DAFTAR PERSONEL", "", "", ""],
            ["NO", "NAMA", "PANGKAT / NRP", "JABATAN"],
            ["1", "Budi Santoso", "AIPDA / 85011001", "BA SIUM"],
            ["2", "Agus", "BRIPTU NRP 01020304", "BA SPKT"],
            ["3", "Tanpa Nomor", "BRIPDA", "BA"],
            ["4", "Agus Lagi", "BRIPTU / 01020304", "BA"]
        ]
    });
    let (status, summary) = app
        .post_json("/api/personnel/import/grid", &app.admin_token, grid)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["added"], 1);
    assert_eq!(summary["updated"], 1);
    assert_eq!(summary["unresolved"], 1);
    assert_eq!(summary["skipped"], 1);
    assert_eq!(summary["total"], 4);

    let (_, page) = app.get("/api/personnel?q=agus", &app.admin_token).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["nrp"], "01020304");
    let (_, budi) = app.get("/api/personnel/85011001", &app.admin_token).await;
    assert_eq!(budi["rank"], "AIPDA");

    let (status, _) = app
        .post_json("/api/personnel/import/grid", &app.atasan_token, json!({ "rows": [] }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_duplicate_personnel_conflicts() {
    let app = TestApp::new().await;
    let body = json!({
        "nrp": "85011001",
        "name": "Budi Lain",
        "rank": "BRIPKA",
        "position": "BA"
    });
    let (status, body) = app.post_json("/api/personnel", &app.admin_token, body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

// -- Leave Types --------------------------------------------------------------

#[tokio::test]
async fn test_leave_type_name_and_code_are_unique() {
    let app = TestApp::new().await;
    let (status, created) = app
        .post_json(
            "/api/leave-types",
            &app.admin_token,
            json!({ "name": "Cuti Besar", "code": "cuti_besar", "default_quota": 90 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["color"], "blue");

    let (status, _) = app
        .post_json(
            "/api/leave-types",
            &app.admin_token,
            json!({ "name": "Cuti Besar", "code": "lain", "default_quota": 10 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post_json(
            "/api/leave-types",
            &app.admin_token,
            json!({ "name": "Lain", "code": "Bad Code", "default_quota": 10 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, types) = app.get("/api/leave-types?gender=L", &app.admin_token).await;
    let codes: Vec<&str> = types
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["code"].as_str().unwrap())
        .collect();
    assert!(codes.contains(&"cuti_besar"));
    assert!(!codes.contains(&"melahirkan"));
}

#[tokio::test]
async fn test_deactivated_leave_type_keeps_history() {
    let app = TestApp::new().await;
    let token = app.admin_token.clone();
    let (status, created) = app
        .post_leave(&token, &leave_fields("85011001", "istimewa", "3", "2025-04-07"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let record_id = created["id"].as_str().unwrap().to_string();
    let type_id = created["leave_type_id"].as_str().unwrap().to_string();

    let (status, _) = app.delete(&format!("/api/leave-types/{type_id}"), &token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, record) = app.get(&format!("/api/leaves/{record_id}"), &token).await;
    assert_eq!(status, StatusCode::OK);
    for field in ["days_requested", "start_date", "reason", "balance_remaining", "leave_type_id"] {
        assert_eq!(record[field], created[field], "field {field}");
    }
    assert_eq!(record["balance_remaining"], 5);
    assert_eq!(record["leave_type"]["is_active"], false);

    let (_, active) = app.get("/api/leave-types", &token).await;
    assert!(active
        .as_array()
        .unwrap()
        .iter()
        .all(|t| t["id"] != type_id.as_str()));
    let (_, all) = app.get("/api/leave-types?include_inactive=true", &token).await;
    let retired = all
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["id"] == type_id.as_str())
        .unwrap();
    assert_eq!(retired["is_active"], false);

    let (status, body) = app
        .post_leave(&token, &leave_fields("85011001", "istimewa", "1", "2025-05-05"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(app.state.leave_records.len(), 1);
}

#[tokio::test]
async fn test_rejected_admin_writes_are_audited() {
    let app = TestApp::new().await;
    let missing = Uuid::new_v4();
    let (status, _) = app
        .put_json(
            &format!("/api/leave-types/{missing}"),
            &app.admin_token,
            json!({ "default_quota": 20 }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let entries = app
        .state
        .audit_log
        .filter(|e| e.action == "UPDATE_LEAVE_TYPE");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, AuditOutcome::Failed);
    assert_eq!(entries[0].target.as_deref(), Some(missing.to_string().as_str()));
    assert_eq!(entries[0].actor_username.as_deref(), Some("operator"));

    let (status, _) = app
        .post_json(
            "/api/personnel",
            &app.admin_token,
            json!({ "nrp": "12 34", "name": "X", "rank": "BRIPDA", "position": "BA" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = app
        .delete(&format!("/api/holidays/{missing}"), &app.admin_token)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let failed: Vec<String> = app
        .state
        .audit_log
        .filter(|e| e.status == AuditOutcome::Failed)
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert!(failed.contains(&"CREATE_PERSONNEL".to_string()));
    assert!(failed.contains(&"DELETE_HOLIDAY".to_string()));

    // Callers stopped by the role gate leave no entry.
    let before = app.state.audit_log.len();
    let (status, _) = app
        .put_json(
            &format!("/api/leave-types/{missing}"),
            &app.atasan_token,
            json!({ "default_quota": 20 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.state.audit_log.len(), before);
}

// -- Reports ------------------------------------------------------------------

#[tokio::test]
async fn test_report_export() {
    let app = TestApp::new().await;
    let (status, _) = app
        .get("/api/reports/export?format=excel&year=2025", &app.admin_token)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.post_leave(&app.admin_token, &leave_fields("85011001", "sakit", "2", "2025-03-01"))
        .await;

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/reports/export?format=excel&year=2025&month=3")
                .header("authorization", format!("Bearer {}", app.admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.contains("Laporan_Izin_2025_3.xlsx"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let grid = cuti_api::spreadsheet::read_xlsx(&bytes).unwrap();
    assert!(grid.iter().any(|row| row.iter().any(|c| c == "Sakit (2 hari)")));

    let (status, _) = app
        .get("/api/reports/export?format=pdf&year=2025", &app.admin_token)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
