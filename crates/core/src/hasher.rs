//! Content digests for resolved files.
//!
//! Reads are hashed from disk through the [`FileLayer`] and compared with the digest the
//! manifest recorded. Writes are never verified: the bytes just written are the new
//! truth, so their digest is simply recorded.

use crate::catalog::CatalogEntry;
use crate::descriptor::Descriptor;
use crate::error::{ProvenanceError, ProvenanceResult};
use prov_files::{digest_bytes, digest_reader, FileLayer};
use prov_types::ContentHash;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Hasher {
    files: Arc<dyn FileLayer>,
}

impl Hasher {
    pub fn new(files: Arc<dyn FileLayer>) -> Self {
        Self { files }
    }

    /// Digest of an in-memory buffer.
    pub fn digest(bytes: &[u8]) -> ContentHash {
        digest_bytes(bytes)
    }

    /// Digest of the file at `path`, streamed through the file layer.
    ///
    /// # Errors
    ///
    /// Returns `ProvenanceError::Files` if the file cannot be opened and
    /// `ProvenanceError::FileRead` if reading fails part-way.
    pub fn digest_file(&self, path: &Path) -> ProvenanceResult<ContentHash> {
        let reader = self.files.open_read(path)?;
        digest_reader(reader).map_err(|source| ProvenanceError::FileRead {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Digests the entry's file and returns its descriptor with `calculated_hash` set.
    ///
    /// When the entry carries a recorded `verified_hash` that differs from the fresh
    /// digest, `verify` decides the outcome: `true` fails, `false` logs a warning and
    /// returns the descriptor with both hashes so the discrepancy stays auditable.
    ///
    /// # Errors
    ///
    /// Returns `ProvenanceError::HashMismatch` on a verified mismatch, plus any error
    /// from [`Self::digest_file`].
    pub fn add_hash(&self, entry: &CatalogEntry, verify: bool) -> ProvenanceResult<Descriptor> {
        let path = entry.normalised_filename();
        let calculated = self.digest_file(path)?;

        if let Some(recorded) = entry.descriptor().verified_hash.as_ref() {
            if *recorded != calculated {
                if verify {
                    return Err(ProvenanceError::HashMismatch {
                        path: path.to_path_buf(),
                        expected: recorded.clone(),
                        actual: calculated,
                    });
                }
                tracing::warn!(
                    path = %path.display(),
                    recorded = %recorded,
                    calculated = %calculated,
                    "hash mismatch tolerated"
                );
            }
        }

        let mut resolved = entry.descriptor().clone();
        resolved.calculated_hash = Some(calculated);
        Ok(resolved)
    }

    /// Records the digest of freshly written bytes on the write target.
    ///
    /// Any `verified_hash` carried over from the query is dropped; it described content
    /// that no longer exists at this path.
    pub fn record_written(target: &Descriptor, hash: ContentHash) -> Descriptor {
        let mut resolved = target.clone();
        resolved.verified_hash = None;
        resolved.calculated_hash = Some(hash);
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prov_files::LocalFiles;
    use std::fs;
    use tempfile::TempDir;

    fn hasher() -> Hasher {
        Hasher::new(Arc::new(LocalFiles::new()))
    }

    fn entry_with(dir: &Path, content: &[u8], recorded: Option<ContentHash>) -> CatalogEntry {
        fs::write(dir.join("data.csv"), content).unwrap();
        let mut descriptor = Descriptor::new().with_filename("data.csv");
        descriptor.verified_hash = recorded;
        CatalogEntry::new(dir, descriptor).unwrap()
    }

    #[test]
    fn test_add_hash_attaches_calculated_hash() {
        let temp = TempDir::new().unwrap();
        let entry = entry_with(temp.path(), b"a,b\n", None);

        let resolved = hasher().add_hash(&entry, true).unwrap();

        assert_eq!(resolved.calculated_hash, Some(Hasher::digest(b"a,b\n")));
        assert_eq!(resolved.filename.as_deref(), Some("data.csv"));
    }

    #[test]
    fn test_add_hash_accepts_matching_record() {
        let temp = TempDir::new().unwrap();
        let entry = entry_with(temp.path(), b"a,b\n", Some(Hasher::digest(b"a,b\n")));

        assert!(hasher().add_hash(&entry, true).is_ok());
    }

    #[test]
    fn test_add_hash_fails_on_mismatch_when_verifying() {
        let temp = TempDir::new().unwrap();
        let stale = Hasher::digest(b"old content");
        let entry = entry_with(temp.path(), b"new content", Some(stale.clone()));

        let err = hasher()
            .add_hash(&entry, true)
            .expect_err("mismatch should fail");

        match err {
            ProvenanceError::HashMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, stale);
                assert_eq!(actual, Hasher::digest(b"new content"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_add_hash_records_mismatch_when_not_verifying() {
        let temp = TempDir::new().unwrap();
        let stale = Hasher::digest(b"old content");
        let entry = entry_with(temp.path(), b"new content", Some(stale.clone()));

        let resolved = hasher().add_hash(&entry, false).unwrap();

        assert_eq!(resolved.verified_hash, Some(stale));
        assert_eq!(
            resolved.calculated_hash,
            Some(Hasher::digest(b"new content"))
        );
    }

    #[test]
    fn test_add_hash_missing_file() {
        let temp = TempDir::new().unwrap();
        let entry = CatalogEntry::new(temp.path(), Descriptor::new().with_filename("gone.csv"))
            .unwrap();

        let err = hasher().add_hash(&entry, false).expect_err("file is missing");
        assert!(matches!(err, ProvenanceError::Files(_)));
    }

    #[test]
    fn test_record_written_replaces_stale_hash() {
        let target = Descriptor::new()
            .with_data_product("out")
            .with_verified_hash(Hasher::digest(b"before"));

        let resolved = Hasher::record_written(&target, Hasher::digest(b"after"));

        assert!(resolved.verified_hash.is_none());
        assert_eq!(resolved.calculated_hash, Some(Hasher::digest(b"after")));
        assert_eq!(resolved.data_product.as_deref(), Some("out"));
    }
}
