//! # Route Modules
//!
//! Each module defines an Axum Router for one API surface area.
//! Routers are assembled in [`crate::app`].

pub mod audit;
pub mod auth;
pub mod dashboard;
pub mod holidays;
pub mod leave_records;
pub mod leave_types;
pub mod notifications;
pub mod personnel;
pub mod reports;
pub mod users;
