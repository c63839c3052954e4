//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs, helpers to extract and
//! validate JSON bodies and query strings in handlers, paging, and a
//! multipart reader for forms that carry an optional file.

use std::collections::HashMap;

use axum::extract::multipart::Multipart;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::Json;

use crate::error::AppError;

/// Trait for request types that can validate their business rules
/// beyond what serde deserialization checks.
pub trait Validate {
    /// Validate business rules. Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
///
/// ```ignore
/// async fn handler(body: Result<Json<T>, JsonRejection>) -> Result<..., AppError> {
///     let req = extract_json(body)?;
/// }
/// ```
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// Extract query parameters, mapping parse errors to [`AppError::BadRequest`].
pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    result
        .map(|Query(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

// ── Paging ──────────────────────────────────────────────────────────────────

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 500;

/// Apply `skip`/`limit` to an already filtered and sorted list.
///
/// Returns the total before paging alongside the page.
pub fn paginate<T>(items: Vec<T>, skip: Option<usize>, limit: Option<usize>) -> (usize, Vec<T>) {
    let total = items.len();
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let page = items
        .into_iter()
        .skip(skip.unwrap_or(0))
        .take(limit)
        .collect();
    (total, page)
}

/// Case-insensitive substring match used by list filters.
pub fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

// ── Multipart ───────────────────────────────────────────────────────────────

/// A file part of a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Text fields and at most one file from a multipart form.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl MultipartForm {
    /// Trimmed, non-empty text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn required(&self, name: &str) -> Result<&str, AppError> {
        self.text(name)
            .ok_or_else(|| AppError::Validation(format!("field '{name}' is required")))
    }

    /// Parse a field with `FromStr`, naming the field in the error.
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>, AppError> {
        self.text(name)
            .map(|raw| {
                raw.parse::<T>().map_err(|_| {
                    AppError::Validation(format!("field '{name}' is invalid: '{raw}'"))
                })
            })
            .transpose()
    }

    pub fn flag(&self, name: &str) -> bool {
        matches!(
            self.text(name).map(str::to_ascii_lowercase).as_deref(),
            Some("true" | "1" | "yes" | "on")
        )
    }
}

/// Read a multipart body. The part named `file_field` is kept as a file;
/// an empty file part (no file chosen) is ignored.
pub async fn read_multipart(
    mut multipart: Multipart,
    file_field: &str,
) -> Result<MultipartForm, AppError> {
    let mut form = MultipartForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == file_field {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("failed to read upload: {e}")))?;
            if !bytes.is_empty() {
                form.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("failed to read field '{name}': {e}")))?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}
