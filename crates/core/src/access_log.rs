//! Append-only record of every file a run touched.
//!
//! Records accumulate in memory in request order and are written out exactly once, as
//! a single YAML document, when the session closes:
//!
//! ```yaml
//! run_id: 6f1c...
//! open_timestamp: 2024-01-01T00:00:00Z
//! close_timestamp: 2024-01-01T00:05:00Z
//! data_directory: /data
//! io:
//!   - kind: read
//!     timestamp: 2024-01-01T00:00:01Z
//!     path: /data/census/2.csv
//!     query: {data_product: census}
//!     resolved: {data_product: census, version: '2', calculated_hash: 5e8a...}
//! run_metadata:
//!   git_sha: abc123
//! ```
//!
//! Flushing is one-shot: the log is marked flushed *before* the write is attempted, so a
//! failed flush is reported once and never retried or duplicated.

use crate::clock::TimeSource;
use crate::descriptor::Descriptor;
use crate::error::{ProvenanceError, ProvenanceResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Read,
    Write,
}

/// One read or write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub kind: AccessKind,
    pub timestamp: DateTime<Utc>,
    /// Canonical path that was opened.
    pub path: PathBuf,
    /// Descriptor exactly as the caller supplied it.
    pub query: Descriptor,
    /// Descriptor after overrides and hashing.
    pub resolved: Descriptor,
}

/// Free-form run annotations, merged into the flushed log.
///
/// Keys are kept sorted so the flushed document is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunMetadata(BTreeMap<String, String>);

impl RunMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins per key.
    pub fn merge<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in entries {
            self.0.insert(key.into(), value.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The persisted form of a flushed log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogDocument {
    pub run_id: String,
    pub open_timestamp: DateTime<Utc>,
    pub close_timestamp: DateTime<Utc>,
    pub data_directory: PathBuf,
    pub io: Vec<AccessRecord>,
    pub run_metadata: RunMetadata,
}

impl AccessLogDocument {
    pub fn load(path: &Path) -> ProvenanceResult<Self> {
        let contents = fs::read_to_string(path).map_err(|source| ProvenanceError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(ProvenanceError::YamlDeserialization)
    }
}

#[derive(Debug)]
pub struct AccessLog {
    destination: Option<PathBuf>,
    run_id: String,
    data_directory: PathBuf,
    clock: Arc<dyn TimeSource>,
    opened_at: DateTime<Utc>,
    records: Vec<AccessRecord>,
    run_metadata: RunMetadata,
    flushed: bool,
}

impl AccessLog {
    /// Starts an empty log. `destination: None` disables persistence; flushing then
    /// only marks the log as flushed.
    pub fn new(
        destination: Option<PathBuf>,
        run_id: impl Into<String>,
        data_directory: impl Into<PathBuf>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let opened_at = clock.now();
        Self {
            destination,
            run_id: run_id.into(),
            data_directory: data_directory.into(),
            clock,
            opened_at,
            records: Vec::new(),
            run_metadata: RunMetadata::new(),
            flushed: false,
        }
    }

    pub fn log_read(&mut self, query: Descriptor, resolved: Descriptor, path: PathBuf) {
        self.push(AccessKind::Read, query, resolved, path);
    }

    pub fn log_write(&mut self, query: Descriptor, resolved: Descriptor, path: PathBuf) {
        self.push(AccessKind::Write, query, resolved, path);
    }

    fn push(&mut self, kind: AccessKind, query: Descriptor, resolved: Descriptor, path: PathBuf) {
        self.records.push(AccessRecord {
            kind,
            timestamp: self.clock.now(),
            path,
            query,
            resolved,
        });
    }

    pub fn run_metadata_mut(&mut self) -> &mut RunMetadata {
        &mut self.run_metadata
    }

    pub fn run_metadata(&self) -> &RunMetadata {
        &self.run_metadata
    }

    pub fn records(&self) -> &[AccessRecord] {
        &self.records
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Snapshot of the log as it would be written at `closed_at`.
    pub fn to_document(&self, closed_at: DateTime<Utc>) -> AccessLogDocument {
        AccessLogDocument {
            run_id: self.run_id.clone(),
            open_timestamp: self.opened_at,
            close_timestamp: closed_at,
            data_directory: self.data_directory.clone(),
            io: self.records.clone(),
            run_metadata: self.run_metadata.clone(),
        }
    }

    /// Writes the log to its destination, once.
    ///
    /// Returns the path written, or `None` when persistence is disabled or the log was
    /// already flushed.
    ///
    /// # Errors
    ///
    /// Returns `ProvenanceError::YamlSerialization` or `ProvenanceError::AccessLogWrite`.
    /// The log counts as flushed either way.
    pub fn flush(&mut self) -> ProvenanceResult<Option<PathBuf>> {
        if self.flushed {
            return Ok(None);
        }
        self.flushed = true;

        let Some(destination) = self.destination.clone() else {
            tracing::debug!(run_id = %self.run_id, "access log disabled; nothing written");
            return Ok(None);
        };

        let document = self.to_document(self.clock.now());
        let yaml = serde_yaml::to_string(&document).map_err(ProvenanceError::YamlSerialization)?;

        let write_err = |source| ProvenanceError::AccessLogWrite {
            path: destination.clone(),
            source,
        };
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&destination, yaml).map_err(write_err)?;

        tracing::info!(
            run_id = %self.run_id,
            path = %destination.display(),
            records = self.records.len(),
            "flushed access log"
        );
        Ok(Some(destination))
    }
}
