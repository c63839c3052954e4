//! # cuti-core — Personnel Leave Domain
//!
//! Pure domain logic for the leave ("cuti/izin") tracker. No I/O: the API
//! crate owns storage, transport and locking, and calls into this crate to
//! decide what is allowed.
//!
//! - [`model`] — personnel, leave types, leave records, accounts, audit entries.
//! - [`quota`] — the leave-quota accounting engine.
//! - [`import`] — roster spreadsheet parsing and upsert planning.
//! - [`registry`] — reference leave types and field rules.
//! - [`error`] — the domain error taxonomy.

pub mod error;
pub mod import;
pub mod model;
pub mod quota;
pub mod registry;

pub use error::DomainError;
pub use model::{
    AuditEntry, AuditOutcome, Gender, Holiday, LeaveRecord, LeaveType, Personnel, Role, User,
    UserStatus,
};
pub use quota::{Acceptance, LeaveBalance, LeaveRequest, QuotaKey};
