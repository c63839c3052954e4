//! # Middleware Stack
//!
//! Tower middleware for the API layer:
//! - [`metrics`]: in-process request and error counters.
//! - [`rate_limit`]: per-client throttling of login attempts.
//!
//! Per-request tracing spans come from `tower_http::trace::TraceLayer`,
//! installed in [`crate::app`].

pub mod metrics;
pub mod rate_limit;
