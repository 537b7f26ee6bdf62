//! Object storage for diagnostic file bytes.
//!
//! The pipeline only needs put/get at a per-consult path; the returned
//! storage reference is persisted on the attachment row for audit and
//! later retrieval.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid storage reference: {0}")]
    InvalidRef(String),
}

/// Seam for the object store so the pipeline stays testable without a
/// filesystem or bucket behind it.
pub trait ObjectStore {
    /// Store file bytes under a per-consult path; returns the reference
    /// recorded on the attachment row.
    fn put(&self, consult_id: &Uuid, filename: &str, bytes: &[u8]) -> Result<String, StorageError>;

    fn get(&self, storage_ref: &str) -> Result<Vec<u8>, StorageError>;
}

/// Filesystem-backed store rooted at a base directory:
/// `<root>/consults/<consult_id>/<attachment_uuid>.<ext>`.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(&self, consult_id: &Uuid, filename: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let extension = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");

        let relative = format!("consults/{}/{}.{}", consult_id, Uuid::new_v4(), extension);
        let target = self.root.join(&relative);
        if let Some(dir) = target.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&target, bytes)?;

        tracing::debug!(
            consult_id = %consult_id,
            storage_ref = %relative,
            size = bytes.len(),
            "Diagnostic file stored"
        );
        Ok(relative)
    }

    fn get(&self, storage_ref: &str) -> Result<Vec<u8>, StorageError> {
        // Refs are always relative paths produced by put().
        if storage_ref.contains("..") || storage_ref.starts_with('/') {
            return Err(StorageError::InvalidRef(storage_ref.to_string()));
        }
        Ok(std::fs::read(self.root.join(storage_ref))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let consult_id = Uuid::new_v4();

        let storage_ref = store.put(&consult_id, "bloodwork.pdf", b"pdf bytes").unwrap();
        assert!(storage_ref.starts_with(&format!("consults/{consult_id}/")));
        assert!(storage_ref.ends_with(".pdf"));

        let bytes = store.get(&storage_ref).unwrap();
        assert_eq!(bytes, b"pdf bytes");
    }

    #[test]
    fn extension_defaults_to_bin() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let storage_ref = store.put(&Uuid::new_v4(), "no_extension", b"x").unwrap();
        assert!(storage_ref.ends_with(".bin"));
    }

    #[test]
    fn rejects_traversal_refs() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let result = store.get("../outside");
        assert!(matches!(result, Err(StorageError::InvalidRef(_))));
    }
}
