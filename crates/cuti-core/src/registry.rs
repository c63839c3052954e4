//! Reference data for the leave-type registry.

use crate::error::DomainError;
use crate::model::Gender;

/// Display colors a leave type may use.
pub const LEAVE_TYPE_COLORS: &[&str] = &[
    "blue", "red", "green", "orange", "purple", "indigo", "teal", "pink", "cyan", "amber", "lime",
    "emerald", "rose", "slate", "gray",
];

pub const DEFAULT_COLOR: &str = "blue";

/// Seed definition for a leave type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveTypeSeed {
    pub name: &'static str,
    pub code: &'static str,
    pub default_quota: i32,
    pub gender_specific: Option<Gender>,
    pub color: &'static str,
}

/// The leave types a fresh installation starts with.
pub fn default_leave_types() -> &'static [LeaveTypeSeed] {
    const SEEDS: &[LeaveTypeSeed] = &[
        LeaveTypeSeed {
            name: "Cuti Tahunan",
            code: "cuti_tahunan",
            default_quota: 12,
            gender_specific: None,
            color: "blue",
        },
        LeaveTypeSeed {
            name: "Sakit",
            code: "sakit",
            default_quota: 14,
            gender_specific: None,
            color: "red",
        },
        LeaveTypeSeed {
            name: "Istimewa",
            code: "istimewa",
            default_quota: 8,
            gender_specific: None,
            color: "indigo",
        },
        LeaveTypeSeed {
            name: "Keagamaan",
            code: "keagamaan",
            default_quota: 5,
            gender_specific: None,
            color: "teal",
        },
        LeaveTypeSeed {
            name: "Melahirkan",
            code: "melahirkan",
            default_quota: 90,
            gender_specific: Some(Gender::Female),
            color: "orange",
        },
        LeaveTypeSeed {
            name: "Di Luar Tanggungan Negara",
            code: "di_luar_tanggungan",
            default_quota: 30,
            gender_specific: None,
            color: "slate",
        },
        LeaveTypeSeed {
            name: "Alasan Penting",
            code: "alasan_penting",
            default_quota: 10,
            gender_specific: None,
            color: "purple",
        },
    ];
    SEEDS
}

/// Check the fields shared by leave type create and update.
pub fn validate_leave_type_fields(
    name: Option<&str>,
    code: Option<&str>,
    default_quota: Option<i32>,
    color: Option<&str>,
) -> Result<(), DomainError> {
    if let Some(name) = name {
        if name.trim().is_empty() || name.len() > 100 {
            return Err(DomainError::Validation(
                "name must be between 1 and 100 characters".into(),
            ));
        }
    }
    if let Some(code) = code {
        let valid = !code.is_empty()
            && code.len() <= 50
            && code
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(DomainError::Validation(
                "code must be 1-50 characters of a-z, 0-9 or '_'".into(),
            ));
        }
    }
    if let Some(quota) = default_quota {
        if !(0..=366).contains(&quota) {
            return Err(DomainError::Validation(
                "default_quota must be between 0 and 366".into(),
            ));
        }
    }
    if let Some(color) = color {
        if !LEAVE_TYPE_COLORS.contains(&color) {
            return Err(DomainError::Validation(format!(
                "color '{color}' is not one of the preset colors"
            )));
        }
    }
    Ok(())
}
