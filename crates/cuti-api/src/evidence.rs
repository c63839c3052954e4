//! Evidence file storage for leave records.
//!
//! Files are written under the upload directory as `<uuid>.<ext>` and the
//! bare file name is stored on the record. Removal is best-effort: a file
//! that cannot be deleted is logged and left behind.

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

/// Accepted content types and the extension each is stored under.
const ALLOWED: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("application/pdf", "pdf"),
];

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("Invalid file type. Allowed: JPG, PNG, PDF")]
    UnsupportedType(String),

    #[error("evidence file is empty")]
    Empty,

    #[error("failed to write evidence file: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle on the evidence directory.
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    dir: PathBuf,
}

impl EvidenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Extension for an accepted content type.
    pub fn extension_for(content_type: &str) -> Option<&'static str> {
        let essence = content_type.split(';').next().unwrap_or("").trim();
        ALLOWED
            .iter()
            .find(|(ct, _)| ct.eq_ignore_ascii_case(essence))
            .map(|(_, ext)| *ext)
    }

    /// Reject a file before anything is written.
    pub fn check(content_type: &str, bytes: &[u8]) -> Result<&'static str, EvidenceError> {
        let ext = Self::extension_for(content_type)
            .ok_or_else(|| EvidenceError::UnsupportedType(content_type.to_string()))?;
        if bytes.is_empty() {
            return Err(EvidenceError::Empty);
        }
        Ok(ext)
    }

    /// Write a file and return its stored name.
    pub async fn save(&self, content_type: &str, bytes: &[u8]) -> Result<String, EvidenceError> {
        let ext = Self::check(content_type, bytes)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = format!("{}.{ext}", Uuid::new_v4());
        tokio::fs::write(self.dir.join(&name), bytes).await?;
        tracing::debug!(file = %name, size = bytes.len(), "evidence stored");
        Ok(name)
    }

    /// Delete a stored file, logging rather than failing.
    pub async fn remove(&self, name: &str) {
        // Stored names never contain separators; refuse anything else.
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            tracing::warn!(file = %name, "refusing to remove evidence outside upload dir");
            return;
        }
        if let Err(e) = tokio::fs::remove_file(self.dir.join(name)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(file = %name, error = %e, "failed to remove evidence file");
            }
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.dir.join(name).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_mapping() {
        assert_eq!(EvidenceStore::extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(EvidenceStore::extension_for("application/pdf; charset=binary"), Some("pdf"));
        assert_eq!(EvidenceStore::extension_for("IMAGE/PNG"), Some("png"));
        assert_eq!(EvidenceStore::extension_for("text/plain"), None);
    }

    #[tokio::test]
    async fn save_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path().join("evidence"));

        let name = store.save("image/png", b"\x89PNG").await.unwrap();
        assert!(name.ends_with(".png"));
        assert!(store.exists(&name));

        store.remove(&name).await;
        assert!(!store.exists(&name));
        // Second removal is a no-op.
        store.remove(&name).await;
    }

    #[tokio::test]
    async fn rejects_bad_type_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path());
        let err = store.save("text/html", b"<p>").await.unwrap_err();
        assert!(matches!(err, EvidenceError::UnsupportedType(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path());
        assert!(matches!(
            store.save("application/pdf", b"").await,
            Err(EvidenceError::Empty)
        ));
    }
}
