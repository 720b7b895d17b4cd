//! # Session
//!
//! A [`Session`] is one pipeline run. It resolves descriptors, opens files through the file
//! layer, hashes what it reads and writes, and records every access in its [`AccessLog`].
//!
//! ## Lifecycle
//!
//! A session starts `Open`. [`Session::close`] flushes the access log and moves it to
//! `Closed`; after that every operation fails with `ProvenanceError::SessionClosed` and
//! further `close` calls return `Ok(None)`. A session dropped while still open flushes its
//! log from `Drop`, reporting any failure through `tracing` instead of the caller.
//!
//! ## Reads
//!
//! `open_for_read(query)` applies read overrides, resolves the result against the catalog,
//! hashes the file (failing on a recorded-hash mismatch when `fail_on_hash_mismatch` is set),
//! opens it, and logs a read record. The returned [`ReadHandle`] re-digests the bytes it
//! serves, so a file replaced after hashing is detectable.
//!
//! ## Writes
//!
//! `open_for_write(query)` applies write overrides and derives the target path from the
//! descriptor itself; the catalog is not consulted. A descriptor without `filename` or
//! `version` is versioned with the run id. The returned [`WriteHandle`] hashes bytes as
//! they are written and logs a write record when it is finished or dropped, exactly once.
//!
//! A write handle borrows the session, so the session cannot be closed while a write is in
//! progress. Sessions hold their log in a `RefCell` and are therefore not `Sync`.

use crate::access_log::{AccessLog, AccessRecord};
use crate::catalog::{Catalog, CatalogEntry};
use crate::clock::{SystemClock, TimeSource};
use crate::config::CoreConfig;
use crate::descriptor::Descriptor;
use crate::hasher::Hasher;
use crate::selector::Selector;
use crate::{ProvenanceError, ProvenanceResult};
use prov_files::{FileLayer, HashingReader, HashingWriter, LocalFiles};
use prov_types::ContentHash;
use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
enum SessionState {
    Open(AccessLog),
    Closed,
}

/// A descriptor resolved against the catalog, with its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub path: PathBuf,
    pub resolved: Descriptor,
}

#[derive(Debug)]
pub struct Session {
    cfg: Arc<CoreConfig>,
    selector: Selector,
    hasher: Hasher,
    files: Arc<dyn FileLayer>,
    state: RefCell<SessionState>,
}

impl Session {
    pub fn new(
        cfg: Arc<CoreConfig>,
        catalog: Arc<Catalog>,
        files: Arc<dyn FileLayer>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let log = AccessLog::new(
            cfg.access_log_path(),
            cfg.run_id(),
            cfg.data_directory(),
            clock,
        );
        tracing::info!(
            run_id = cfg.run_id(),
            entries = catalog.len(),
            access_log = ?log.destination(),
            "opened session"
        );

        Self {
            selector: Selector::new(catalog),
            hasher: Hasher::new(Arc::clone(&files)),
            files,
            state: RefCell::new(SessionState::Open(log)),
            cfg,
        }
    }

    /// Opens a session on the local filesystem, loading the catalog from the configured
    /// manifest.
    pub fn open(cfg: Arc<CoreConfig>) -> ProvenanceResult<Self> {
        let catalog = Catalog::load(cfg.metadata_path(), cfg.data_directory())?;
        Ok(Self::new(
            cfg,
            Arc::new(catalog),
            Arc::new(LocalFiles::new()),
            Arc::new(SystemClock),
        ))
    }

    pub fn run_id(&self) -> &str {
        self.cfg.run_id()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn catalog(&self) -> &Catalog {
        self.selector.catalog()
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Closed)
    }

    fn with_log<T>(&self, f: impl FnOnce(&mut AccessLog) -> T) -> ProvenanceResult<T> {
        match &mut *self.state.borrow_mut() {
            SessionState::Open(log) => Ok(f(log)),
            SessionState::Closed => Err(ProvenanceError::SessionClosed),
        }
    }

    fn ensure_open(&self) -> ProvenanceResult<()> {
        self.with_log(|_| ())
    }

    /// Resolves and hashes `query` as a read would, without opening or logging anything.
    ///
    /// # Errors
    ///
    /// - `ProvenanceError::SessionClosed` after [`Self::close`]
    /// - `ProvenanceError::NotFound` / `ProvenanceError::AmbiguousMatch` from the catalog
    /// - `ProvenanceError::HashMismatch` when verification is enabled and fails
    pub fn resolve(&self, query: &Descriptor) -> ProvenanceResult<Resolution> {
        self.ensure_open()?;
        let rewritten = self.cfg.overrides().apply_read_overrides(query);
        let entry = self.selector.find(&rewritten)?;
        let resolved = self
            .hasher
            .add_hash(entry, self.cfg.fail_on_hash_mismatch())?;

        Ok(Resolution {
            path: entry.normalised_filename().to_path_buf(),
            resolved,
        })
    }

    /// Opens the file `query` resolves to and logs the read. The returned handle digests
    /// the bytes it serves; see [`ReadHandle::served_hash`].
    pub fn open_for_read(&self, query: &Descriptor) -> ProvenanceResult<ReadHandle> {
        let Resolution { path, resolved } = self.resolve(query)?;
        let reader = self.files.open_read(&path)?;

        self.with_log(|log| log.log_read(query.clone(), resolved.clone(), path.clone()))?;
        tracing::debug!(query = %query, path = %path.display(), "opened for read");

        Ok(ReadHandle {
            reader: HashingReader::new(reader),
            path,
            resolved,
            served: None,
        })
    }

    /// Opens the write target for `query`. The write is logged when the handle is
    /// finished or dropped.
    pub fn open_for_write(&self, query: &Descriptor) -> ProvenanceResult<WriteHandle<'_>> {
        self.ensure_open()?;
        let mut target = self.cfg.overrides().apply_write_overrides(query);
        if target.filename.is_none() && target.version.is_none() {
            target.version = Some(self.cfg.run_id().to_string());
        }

        let entry = CatalogEntry::new(self.cfg.data_directory(), target)?;
        let writer = self.files.open_write(entry.normalised_filename())?;
        tracing::debug!(
            query = %query,
            path = %entry.normalised_filename().display(),
            "opened for write"
        );

        Ok(WriteHandle {
            session: self,
            query: query.clone(),
            path: entry.normalised_filename().to_path_buf(),
            target: entry.descriptor().clone(),
            writer: Some(HashingWriter::new(writer)),
        })
    }

    /// Merges `entries` into the run metadata; later values win per key.
    pub fn set_run_metadata<I, K, V>(&self, entries: I) -> ProvenanceResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.with_log(|log| log.run_metadata_mut().merge(entries))
    }

    /// Snapshot of the records logged so far.
    pub fn records(&self) -> ProvenanceResult<Vec<AccessRecord>> {
        self.with_log(|log| log.records().to_vec())
    }

    /// Flushes the access log and closes the session.
    ///
    /// Returns the path the log was written to, or `None` if logging is disabled or the
    /// session was already closed.
    ///
    /// # Errors
    ///
    /// Returns the flush error, if any. The session is closed regardless.
    pub fn close(&mut self) -> ProvenanceResult<Option<PathBuf>> {
        match mem::replace(self.state.get_mut(), SessionState::Closed) {
            SessionState::Open(mut log) => {
                tracing::info!(
                    run_id = self.cfg.run_id(),
                    records = log.records().len(),
                    "closing session"
                );
                log.flush()
            }
            SessionState::Closed => Ok(None),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let SessionState::Open(mut log) = mem::replace(self.state.get_mut(), SessionState::Closed)
        {
            tracing::warn!(run_id = self.cfg.run_id(), "session dropped without close");
            if let Err(err) = log.flush() {
                tracing::error!(run_id = self.cfg.run_id(), error = %err, "failed to flush access log");
            }
        }
    }
}

/// A file opened for reading. The read has already been logged.
///
/// The logged `calculated_hash` was taken from a separate pass over the file before it
/// was opened here. Bytes served through the handle are digested again, and
/// [`ReadHandle::served_hash`] reports that digest once the file has been read to the
/// end; a file that changed in between is logged at warn level.
pub struct ReadHandle {
    reader: HashingReader<Box<dyn Read + Send>>,
    path: PathBuf,
    resolved: Descriptor,
    served: Option<ContentHash>,
}

impl ReadHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn resolved(&self) -> &Descriptor {
        &self.resolved
    }

    /// Digest of every byte served, available once the reader has reached end of file.
    pub fn served_hash(&self) -> Option<&ContentHash> {
        self.served.as_ref()
    }
}

impl Read for ReadHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        if n == 0 && !buf.is_empty() && self.served.is_none() {
            let served = self.reader.digest();
            if self.resolved.calculated_hash.as_ref() != Some(&served) {
                tracing::warn!(
                    path = %self.path.display(),
                    served = %served,
                    "file changed between hashing and reading"
                );
            }
            self.served = Some(served);
        }
        Ok(n)
    }
}

impl std::fmt::Debug for ReadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadHandle")
            .field("path", &self.path)
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}

/// A file opened for writing.
///
/// Call [`WriteHandle::finish`] to flush, hash and log the write and get the resolved
/// descriptor back. A handle that is dropped instead does the same work from `Drop` and
/// reports failures through `tracing`.
pub struct WriteHandle<'s> {
    session: &'s Session,
    query: Descriptor,
    target: Descriptor,
    path: PathBuf,
    writer: Option<HashingWriter<Box<dyn Write + Send>>>,
}

impl WriteHandle<'_> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The descriptor the write is recorded under, before hashing.
    pub fn target(&self) -> &Descriptor {
        &self.target
    }

    /// Flushes the file and logs the write.
    ///
    /// # Errors
    ///
    /// Returns `ProvenanceError::FileWrite` if the final flush fails. The write is logged
    /// with the digest of the bytes accepted so far in that case too.
    pub fn finish(mut self) -> ProvenanceResult<Descriptor> {
        self.complete()
            .unwrap_or_else(|| Err(ProvenanceError::SessionClosed))
    }

    /// Runs the close sequence once; later calls return `None`.
    fn complete(&mut self) -> Option<ProvenanceResult<Descriptor>> {
        let mut writer = self.writer.take()?;
        let flushed = writer.flush();
        let (inner, hash, bytes) = writer.into_parts();
        drop(inner);

        let resolved = Hasher::record_written(&self.target, hash);
        let logged = self.session.with_log(|log| {
            log.log_write(self.query.clone(), resolved.clone(), self.path.clone())
        });
        tracing::debug!(path = %self.path.display(), bytes, "finished write");

        Some(match (flushed, logged) {
            (Err(source), _) => Err(ProvenanceError::FileWrite {
                path: self.path.clone(),
                source,
            }),
            (Ok(()), Err(err)) => Err(err),
            (Ok(()), Ok(())) => Ok(resolved),
        })
    }
}

impl Write for WriteHandle<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(buf),
            None => Err(io::Error::other("write handle already finished")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for WriteHandle<'_> {
    fn drop(&mut self) {
        if let Some(result) = self.complete() {
            tracing::warn!(path = %self.path.display(), "write handle dropped without finish");
            if let Err(err) = result {
                tracing::error!(path = %self.path.display(), error = %err, "failed to finish write");
            }
        }
    }
}

impl std::fmt::Debug for WriteHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteHandle")
            .field("path", &self.path)
            .field("target", &self.target)
            .field("finished", &self.writer.is_none())
            .finish_non_exhaustive()
    }
}
