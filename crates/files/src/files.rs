//! Filesystem-backed file layer.
//!
//! [`FileLayer`] is the seam between the provenance engine and storage. The engine
//! resolves descriptors to canonical paths and then only ever asks for byte streams;
//! data files are never opened behind the layer's back.
//!
//! [`LocalFiles`] is the production implementation. Tests in other crates may supply
//! their own layer (for example one that fails on demand) without touching the engine.
//!
//! # Path Safety
//!
//! Descriptors come from manifests and configuration, so their fields end up as path
//! components. [`safe_join`] is the only sanctioned way to turn such a relative path
//! into a location under a data directory: it rejects absolute paths, parent-directory
//! components, and empty input before anything is opened.

use crate::FilesError;
use std::fmt;
use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

/// Byte-stream provider addressed by canonical path.
pub trait FileLayer: fmt::Debug + Send + Sync {
    /// Opens an existing file for reading.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::Io` if the file does not exist or cannot be opened.
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, FilesError>;

    /// Opens a file for writing, replacing any existing content.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::Io` if the parent directory cannot be created or the file
    /// cannot be opened for writing.
    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, FilesError>;
}

/// [`FileLayer`] over the local filesystem.
///
/// Parent directories are created on demand for writes, since write targets are
/// derived from descriptors and need not pre-exist.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFiles;

impl LocalFiles {
    pub fn new() -> Self {
        Self
    }
}

impl FileLayer for LocalFiles {
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, FilesError> {
        tracing::debug!(path = %path.display(), "opening file for read");
        let file = fs::File::open(path).map_err(|e| {
            FilesError::Io(io::Error::new(
                e.kind(),
                format!("Failed to open file {}: {}", path.display(), e),
            ))
        })?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, FilesError> {
        tracing::debug!(path = %path.display(), "opening file for write");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                FilesError::Io(io::Error::new(
                    e.kind(),
                    format!("Failed to create directory {}: {}", parent.display(), e),
                ))
            })?;
        }

        let file = fs::File::create(path).map_err(|e| {
            FilesError::Io(io::Error::new(
                e.kind(),
                format!("Failed to create file {}: {}", path.display(), e),
            ))
        })?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Joins a relative path onto `root`, refusing anything that could escape it.
///
/// # Errors
///
/// Returns `FilesError::InvalidPath` if `relative` is empty, absolute, or contains
/// `..`, root, or prefix components.
pub fn safe_join(root: &Path, relative: &Path) -> Result<PathBuf, FilesError> {
    if relative.as_os_str().is_empty() {
        return Err(FilesError::InvalidPath("path is empty".into()));
    }

    let mut joined = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(FilesError::InvalidPath(format!(
                    "{} must be a relative path without '..'",
                    relative.display()
                )));
            }
        }
    }

    if joined == root {
        return Err(FilesError::InvalidPath(format!(
            "{} does not name a file",
            relative.display()
        )));
    }

    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest_reader;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parent_directories() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("census").join("v1").join("data.csv");

        let files = LocalFiles::new();
        let mut writer = files.open_write(&target).unwrap();
        writer.write_all(b"a,b\n1,2\n").unwrap();
        writer.flush().unwrap();
        drop(writer);

        assert_eq!(fs::read(&target).unwrap(), b"a,b\n1,2\n");
    }

    #[test]
    fn test_write_replaces_existing_content() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("data.txt");
        fs::write(&target, b"old content that is longer").unwrap();

        let files = LocalFiles::new();
        let mut writer = files.open_write(&target).unwrap();
        writer.write_all(b"new").unwrap();
        writer.flush().unwrap();
        drop(writer);

        assert_eq!(fs::read(&target).unwrap(), b"new");
    }

    #[test]
    fn test_read_streams_content() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("data.txt");
        fs::write(&target, b"Hello, World!").unwrap();

        let files = LocalFiles::new();
        let reader = files.open_read(&target).unwrap();
        let hash = digest_reader(reader).unwrap();

        assert_eq!(hash, crate::digest_bytes(b"Hello, World!"));
    }

    #[test]
    fn test_read_missing_file_keeps_error_kind() {
        let temp = TempDir::new().unwrap();
        let files = LocalFiles::new();

        let err = files
            .open_read(&temp.path().join("missing.txt"))
            .err()
            .expect("missing file should fail");

        match err {
            FilesError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_safe_join_accepts_nested_relative_path() {
        let root = Path::new("/data");
        let joined = safe_join(root, Path::new("ns/product/1.csv")).unwrap();
        assert_eq!(joined, PathBuf::from("/data/ns/product/1.csv"));
    }

    #[test]
    fn test_safe_join_skips_current_dir_components() {
        let root = Path::new("/data");
        let joined = safe_join(root, Path::new("./product/1.csv")).unwrap();
        assert_eq!(joined, PathBuf::from("/data/product/1.csv"));
    }

    #[test]
    fn test_safe_join_rejects_traversal() {
        let root = Path::new("/data");
        for bad in ["../etc/passwd", "product/../../x", "/etc/passwd", "", "."] {
            let result = safe_join(root, Path::new(bad));
            assert!(
                matches!(result, Err(FilesError::InvalidPath(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }
}
