//! Local content store for document blobs.
//!
//! # Responsibility
//! - Write uploaded bytes under `<root>/<case_number>/<uuid>.<ext>`.
//! - Compute SHA-256 digests and verify them on read.
//!
//! # Invariants
//! - Stored paths are relative to the root and never escape it.
//! - A blob is never overwritten; every write gets a fresh file name.

use crate::model::document::file_extension;
use log::{error, info};
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    InvalidPath(String),
    /// Stored bytes no longer match the recorded digest.
    Integrity { path: String, expected: String, actual: String },
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "storage io error: {err}"),
            Self::InvalidPath(path) => write!(f, "invalid storage path `{path}`"),
            Self::Integrity {
                path,
                expected,
                actual,
            } => write!(
                f,
                "integrity check failed for `{path}`: expected {expected}, found {actual}"
            ),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Result of writing one blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Path relative to the store root, `/`-separated.
    pub relative_path: String,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Blob persistence used by the document service.
pub trait BlobStore {
    fn put(&self, case_number: &str, original_name: &str, bytes: &[u8])
        -> StorageResult<StoredBlob>;
    fn get(&self, relative_path: &str) -> StorageResult<Vec<u8>>;
    fn remove(&self, relative_path: &str) -> StorageResult<()>;

    /// Reads a blob and checks it against `expected_sha256`.
    fn get_verified(&self, relative_path: &str, expected_sha256: &str) -> StorageResult<Vec<u8>> {
        let bytes = self.get(relative_path)?;
        let actual = sha256_hex(&bytes);
        if !actual.eq_ignore_ascii_case(expected_sha256) {
            error!(
                "event=blob_verify module=storage status=error path={}",
                relative_path
            );
            return Err(StorageError::Integrity {
                path: relative_path.to_string(),
                expected: expected_sha256.to_string(),
                actual,
            });
        }
        Ok(bytes)
    }
}

/// Filesystem-backed blob store rooted at one directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, relative_path: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(relative_path);
        let is_plain = !relative_path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !is_plain {
            return Err(StorageError::InvalidPath(relative_path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for LocalBlobStore {
    fn put(
        &self,
        case_number: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> StorageResult<StoredBlob> {
        let folder = sanitize_segment(case_number);
        if folder.is_empty() {
            return Err(StorageError::InvalidPath(case_number.to_string()));
        }
        let file_name = match file_extension(original_name) {
            Some(extension) => format!("{}.{}", Uuid::new_v4(), extension.to_ascii_lowercase()),
            None => Uuid::new_v4().to_string(),
        };
        let relative_path = format!("{folder}/{file_name}");

        let directory = self.root.join(&folder);
        fs::create_dir_all(&directory)?;
        fs::write(directory.join(&file_name), bytes)?;

        info!(
            "event=blob_put module=storage status=ok path={} size_bytes={}",
            relative_path,
            bytes.len()
        );
        Ok(StoredBlob {
            relative_path,
            sha256: sha256_hex(bytes),
            size_bytes: bytes.len() as u64,
        })
    }

    fn get(&self, relative_path: &str) -> StorageResult<Vec<u8>> {
        Ok(fs::read(self.resolve(relative_path)?)?)
    }

    fn remove(&self, relative_path: &str) -> StorageResult<()> {
        match fs::remove_file(self.resolve(relative_path)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn sanitize_segment(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{sanitize_segment, sha256_hex, BlobStore, LocalBlobStore, StorageError};

    #[test]
    fn digest_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn put_then_verified_get_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path());
        let blob = store
            .put("EXP-2026-0001", "deed.PDF", b"%PDF-1.7 deed")
            .expect("put");

        assert!(blob.relative_path.starts_with("EXP-2026-0001/"));
        assert!(blob.relative_path.ends_with(".pdf"));
        assert_eq!(blob.size_bytes, 13);
        let bytes = store
            .get_verified(&blob.relative_path, &blob.sha256)
            .expect("verified read");
        assert_eq!(bytes, b"%PDF-1.7 deed");
    }

    #[test]
    fn tampered_blob_fails_integrity_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path());
        let blob = store.put("EXP-2026-0002", "plan.txt", b"v1").expect("put");
        std::fs::write(dir.path().join(&blob.relative_path), b"v2").expect("tamper");

        let err = store
            .get_verified(&blob.relative_path, &blob.sha256)
            .expect_err("must fail");
        assert!(matches!(err, StorageError::Integrity { .. }));
    }

    #[test]
    fn traversal_paths_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path());
        assert!(matches!(
            store.get("../etc/passwd"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(store.get("/abs"), Err(StorageError::InvalidPath(_))));
        assert_eq!(sanitize_segment("../EXP 1"), "EXP1");
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path());
        let blob = store.put("EXP-2026-0003", "a.txt", b"x").expect("put");
        store.remove(&blob.relative_path).expect("first remove");
        store.remove(&blob.relative_path).expect("second remove");
    }
}
