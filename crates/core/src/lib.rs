//! # Provenance Core
//!
//! Core logic for provenance-tracked file access.
//!
//! Callers ask for files by logical [`Descriptor`] rather than by path. A [`Session`]:
//! - rewrites the request with configured overrides
//! - resolves it against the [`Catalog`] (reads) or the naming convention (writes)
//! - hashes the bytes read or written and, on reads, checks the recorded hash
//! - appends a record to the run's [`AccessLog`], written once when the session closes
//!
//! **No byte-level I/O**: opening files is delegated to a [`prov_files::FileLayer`].
//!
//! ```no_run
//! use prov_core::{CoreConfig, Descriptor, Session};
//! use std::io::Read;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = Arc::new(CoreConfig::load("prov.yaml".as_ref())?);
//! let mut session = Session::open(cfg)?;
//!
//! let mut census = String::new();
//! session
//!     .open_for_read(&Descriptor::new().with_data_product("census").with_version("2"))?
//!     .read_to_string(&mut census)?;
//!
//! session.close()?;
//! # Ok(())
//! # }
//! ```

pub mod access_log;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod constants;
pub mod descriptor;
pub mod error;
pub mod hasher;
pub mod overrides;
pub mod selector;
pub mod session;

pub use access_log::{AccessKind, AccessLog, AccessLogDocument, AccessRecord, RunMetadata};
pub use catalog::{Catalog, CatalogEntry, Manifest};
pub use clock::{FixedClock, SystemClock, TimeSource};
pub use config::CoreConfig;
pub use descriptor::{Descriptor, IssueItem};
pub use error::{ProvenanceError, ProvenanceResult};
pub use hasher::Hasher;
pub use overrides::{OverrideEngine, OverrideRule};
pub use prov_types::ContentHash;
pub use selector::Selector;
pub use session::{ReadHandle, Resolution, Session, WriteHandle};
