//! # cuti-api — Axum API Service
//!
//! HTTP layer of the personnel leave tracker, built on Axum/Tower/Tokio.
//! Domain rules live in `cuti-core`; this crate owns storage, locking,
//! transport, authentication, audit and notifications.
//!
//! ## Routers
//!
//! - `/api/token` — sign-in (unauthenticated, rate limited)
//! - `/api/users/*` — operator accounts
//! - `/api/leave-types/*` — leave type registry
//! - `/api/personnel/*` — roster, balances, bulk import
//! - `/api/leaves/*` — quota-checked leave records
//! - `/api/audit`, `/api/holidays/*`, `/api/dashboard/*`, `/api/reports/*`
//! - `/static/evidence/*` — uploaded evidence files
//! - `/ws` — live change notifications (token in query string)
//! - `/health/*` — health checks and counters (unauthenticated)
//!
//! ## Middleware Stack (Tower)
//!
//! Cors → Trace → Metrics → Auth (protected routers) / RateLimit (login)
//!
//! ## Storage
//!
//! In-memory stores are the read path. With `DATABASE_URL` set, every write
//! goes to Postgres first and the stores are hydrated on startup.

pub mod audit;
pub mod auth;
pub mod db;
pub mod error;
pub mod evidence;
pub mod extractors;
pub mod housekeeping;
pub mod leaves;
pub mod middleware;
pub mod notify;
pub mod openapi;
pub mod routes;
pub mod spreadsheet;
pub mod state;

pub use error::AppError;
pub use state::AppState;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::middleware::metrics::{metrics_handler, metrics_middleware, ApiMetrics};
use crate::middleware::rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimiter};

/// Upload ceiling for evidence files and roster spreadsheets.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Assemble the full application router with all routes and middleware.
///
/// Health checks (`/health/*`), sign-in and the WebSocket endpoint are
/// mounted outside the auth middleware.
pub fn app(state: AppState) -> Router {
    let metrics = ApiMetrics::new();
    let limiter = RateLimiter::new(RateLimitConfig {
        max_requests: state.config.login_rate_limit,
        window_secs: state.config.login_rate_window_secs,
    });

    // Authenticated API routes.
    let protected = Router::new()
        .merge(routes::users::router())
        .merge(routes::leave_types::router())
        .merge(routes::personnel::router())
        .merge(routes::leave_records::router())
        .merge(routes::audit::router())
        .merge(routes::holidays::router())
        .merge(routes::dashboard::router())
        .merge(routes::reports::router())
        .merge(openapi::router())
        .nest_service("/static/evidence", ServeDir::new(state.evidence.dir()))
        .layer(from_fn_with_state(state.clone(), auth::auth_middleware));

    let public = Router::new()
        .merge(routes::auth::router().route_layer(from_fn(rate_limit_middleware)))
        .merge(routes::notifications::router());

    // Unauthenticated health checks.
    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/health/metrics", get(metrics_handler));

    Router::new()
        .merge(health)
        .merge(public)
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .layer(axum::Extension(metrics))
        .layer(axum::Extension(limiter))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

/// Liveness: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness: 503 while the database is unreachable.
async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!(error = %e, "readiness check failed");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unavailable");
        }
    }
    (StatusCode::OK, "ready")
}
