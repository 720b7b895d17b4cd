//! Provenance File Layer
//!
//! This crate is the byte-level boundary underneath the provenance engine. The engine
//! never touches the filesystem directly: it asks a [`FileLayer`] for read or write
//! streams by canonical path, and hashes whatever flows through them.
//!
//! ## Design Principles
//!
//! - Paths handed to the layer are already resolved; the layer does no lookup
//! - Writes replace existing content (the last writer's bytes are the truth)
//! - Every relative component joined onto a data directory is validated first
//! - Digests are SHA-256, rendered as lowercase hex
//!
//! ## Example Usage
//!
//! ```no_run
//! use prov_files::{digest_reader, FileLayer, LocalFiles};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let files = LocalFiles::new();
//! let reader = files.open_read(Path::new("data/census/1.csv"))?;
//! let hash = digest_reader(reader)?;
//! println!("{hash}");
//! # Ok(())
//! # }
//! ```

mod files;
mod hash;

pub use files::{safe_join, FileLayer, LocalFiles};
pub use hash::{digest_bytes, digest_reader, HashingReader, HashingWriter};
pub use prov_types::ContentHash;

/// Errors that can occur during file operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Path validation failed (potential directory traversal or unsafe path)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
