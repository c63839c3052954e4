//! # Error Taxonomy
//!
//! Domain errors raised by the registry, roster and quota engine, built with
//! `thiserror`. Every variant carries enough context to render an actionable
//! message to the operator without consulting logs.

use thiserror::Error;

/// Errors raised by domain operations before any state is written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced entity does not exist.
    #[error("{kind} {key} not found")]
    NotFound {
        /// Entity kind, e.g. "personnel" or "leave type".
        kind: &'static str,
        /// The identifier that failed to resolve.
        key: String,
    },

    /// A uniqueness rule would be violated.
    #[error("{0}")]
    Conflict(String),

    /// Input is malformed or violates a business rule.
    #[error("{0}")]
    Validation(String),

    /// The request asks for more days than the remaining annual balance.
    #[error(
        "Quota for {leave_type} insufficient. Remaining: {remaining} days, Requested: {requested} days"
    )]
    QuotaExceeded {
        leave_type: String,
        remaining: i32,
        requested: i32,
    },

    /// The caller's role does not permit the operation.
    #[error("{0}")]
    Forbidden(String),
}

impl DomainError {
    /// Shorthand for [`DomainError::NotFound`].
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_message_is_actionable() {
        let err = DomainError::QuotaExceeded {
            leave_type: "Cuti Tahunan".into(),
            remaining: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Quota for Cuti Tahunan insufficient. Remaining: 3 days, Requested: 5 days"
        );
    }

    #[test]
    fn not_found_names_kind_and_key() {
        let err = DomainError::not_found("personnel", "85011001");
        assert_eq!(err.to_string(), "personnel 85011001 not found");
    }
}
